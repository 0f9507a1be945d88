// src/search/index.rs
//
// In-memory ranked index over materials.
//
// The index is a derived projection of the store. A rebuild produces a
// complete `IndexSnapshot` off to the side and publishes it with one atomic
// pointer swap, so a concurrent query sees either the old or the new
// snapshot, never a partial one.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;

use super::tokenizer::{normalize, tokenize};
use crate::domain::Material;

const EXACT_WEIGHT: f64 = 1.0;
const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;
const MAX_FUZZY_DISTANCE: usize = 6;

const BM25_K: f64 = 1.2;
const BM25_B: f64 = 0.7;
const BM25_D: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Nombre = 0,
    Matricula = 1,
}

const FIELDS: [Field; 2] = [Field::Nombre, Field::Matricula];

impl Field {
    fn boost(self) -> f64 {
        match self {
            Field::Nombre => 1.0,
            Field::Matricula => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchOptions {
    /// Allowed edit distance as a fraction of the query term length
    pub fuzzy: f64,
    pub prefix: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { fuzzy: 0.2, prefix: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub material: Material,
    pub score: f64,
}

struct IndexedDoc {
    material: Material,
    lengths: [usize; 2],
}

#[derive(Default)]
struct Postings {
    /// (doc, term frequency) per field
    by_field: [Vec<(usize, u32)>; 2],
}

/// One immutable generation of the index.
pub struct IndexSnapshot {
    docs: Vec<IndexedDoc>,
    terms: BTreeMap<String, Postings>,
    by_matricula: HashMap<String, Vec<usize>>,
    avg_lengths: [f64; 2],
}

impl IndexSnapshot {
    pub fn build(materials: Vec<Material>) -> Self {
        let mut docs = Vec::with_capacity(materials.len());
        let mut terms: BTreeMap<String, Postings> = BTreeMap::new();
        let mut by_matricula: HashMap<String, Vec<usize>> = HashMap::new();
        let mut totals = [0usize; 2];

        for (doc, material) in materials.into_iter().enumerate() {
            let mut lengths = [0usize; 2];
            for field in FIELDS {
                let text = match field {
                    Field::Nombre => &material.nombre,
                    Field::Matricula => &material.matricula,
                };
                let tokens = tokenize(text);
                lengths[field as usize] = tokens.len();
                totals[field as usize] += tokens.len();

                let mut counts: HashMap<String, u32> = HashMap::new();
                for token in tokens {
                    *counts.entry(token).or_insert(0) += 1;
                }
                for (term, tf) in counts {
                    terms.entry(term).or_default().by_field[field as usize].push((doc, tf));
                }
            }

            let code = normalize(material.matricula.trim());
            if !code.is_empty() {
                by_matricula.entry(code).or_default().push(doc);
            }
            docs.push(IndexedDoc { material, lengths });
        }

        // Postings were filled from a HashMap; keep them in document order.
        for postings in terms.values_mut() {
            for list in postings.by_field.iter_mut() {
                list.sort_unstable_by_key(|&(doc, _)| doc);
            }
        }

        let n = docs.len().max(1) as f64;
        Self {
            docs,
            terms,
            by_matricula,
            avg_lengths: [totals[0] as f64 / n, totals[1] as f64 / n],
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Index terms matching one query term, with the best weight for each.
    fn expand(&self, term: &str, options: &SearchOptions) -> HashMap<&str, f64> {
        let mut matches: HashMap<&str, f64> = HashMap::new();
        let term_len = term.chars().count();

        if let Some((key, _)) = self.terms.get_key_value(term) {
            matches.insert(key.as_str(), EXACT_WEIGHT);
        }

        if options.prefix {
            let from = (Bound::Included(term), Bound::Unbounded);
            for (key, _) in self.terms.range::<str, _>(from) {
                if !key.starts_with(term) {
                    break;
                }
                let extra = key.chars().count() - term_len;
                if extra == 0 {
                    continue;
                }
                let weight =
                    PREFIX_WEIGHT * term_len as f64 / (term_len as f64 + 0.3 * extra as f64);
                keep_best(&mut matches, key.as_str(), weight);
            }
        }

        let max_distance = ((options.fuzzy.clamp(0.0, 1.0) * term_len as f64).round() as usize)
            .min(MAX_FUZZY_DISTANCE);
        if max_distance > 0 {
            for key in self.terms.keys() {
                let key_len = key.chars().count();
                if key_len.abs_diff(term_len) > max_distance {
                    continue;
                }
                let distance = strsim::levenshtein(term, key);
                if distance == 0 || distance > max_distance {
                    continue;
                }
                let weight = FUZZY_WEIGHT * term_len as f64 / (term_len + distance) as f64;
                keep_best(&mut matches, key.as_str(), weight);
            }
        }

        matches
    }

    fn bm25(&self, tf: u32, df: usize, field: Field, doc: usize) -> f64 {
        let n = self.docs.len() as f64;
        let df = df as f64;
        let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
        let len = self.docs[doc].lengths[field as usize] as f64;
        let avg = self.avg_lengths[field as usize].max(f64::EPSILON);
        let tf = tf as f64;
        idf * (BM25_D + tf * (BM25_K + 1.0) / (tf + BM25_K * (1.0 - BM25_B + BM25_B * len / avg)))
    }

    /// Rank every document matching any query term.
    pub fn query(&self, text: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let query_terms = tokenize(text);
        let mut scores: HashMap<usize, f64> = HashMap::new();

        for term in &query_terms {
            for (key, weight) in self.expand(term, options) {
                let Some(postings) = self.terms.get(key) else { continue };
                for field in FIELDS {
                    let list = &postings.by_field[field as usize];
                    for &(doc, tf) in list {
                        let score = weight * field.boost() * self.bm25(tf, list.len(), field, doc);
                        *scores.entry(doc).or_insert(0.0) += score;
                    }
                }
            }
        }

        let whole_code = normalize(text.trim());
        let pinned: &[usize] = self
            .by_matricula
            .get(&whole_code)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for &doc in pinned {
            scores.entry(doc).or_insert(0.0);
        }

        let mut ranked: Vec<(bool, f64, usize)> = scores
            .into_iter()
            .map(|(doc, score)| (pinned.contains(&doc), score, doc))
            .collect();
        ranked.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.total_cmp(&a.1))
                .then_with(|| a.2.cmp(&b.2))
        });

        ranked
            .into_iter()
            .map(|(_, score, doc)| SearchHit {
                material: self.docs[doc].material.clone(),
                score,
            })
            .collect()
    }
}

fn keep_best<'a>(matches: &mut HashMap<&'a str, f64>, key: &'a str, weight: f64) {
    let slot = matches.entry(key).or_insert(weight);
    if weight > *slot {
        *slot = weight;
    }
}

/// Shared handle to the current index snapshot.
#[derive(Default)]
pub struct SearchIndex {
    current: ArcSwapOption<IndexSnapshot>,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.current.load().is_some()
    }

    /// Mark the index stale; the next query rebuilds it.
    pub fn invalidate(&self) {
        self.current.store(None);
    }

    /// Build a new snapshot and publish it.
    pub fn rebuild(&self, materials: Vec<Material>) -> Arc<IndexSnapshot> {
        let snapshot = Arc::new(IndexSnapshot::build(materials));
        self.current.store(Some(Arc::clone(&snapshot)));
        snapshot
    }

    pub fn snapshot(&self) -> Option<Arc<IndexSnapshot>> {
        self.current.load_full()
    }

    /// Query the current snapshot. Returns `None` when the index is stale.
    pub fn query(&self, text: &str, options: &SearchOptions) -> Option<Vec<SearchHit>> {
        self.snapshot().map(|snapshot| snapshot.query(text, options))
    }
}
