// src/services/catalog_service.rs
//
// Catalog queries over the search index and the material store.
//
// RULES:
// - The store is authoritative; the index is rebuilt from it, never patched
// - A stale index is rebuilt lazily on the next non-empty query
// - Stock filtering happens after ranking and never changes scores

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Material;
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, SearchIndexRebuilt};
use crate::repositories::MaterialRepository;
use crate::search::{IndexSnapshot, SearchHit, SearchIndex, SearchOptions};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockFilter {
    #[default]
    All,
    /// stock > 0
    InStock,
    /// stock = 0
    OutOfStock,
}

impl StockFilter {
    pub fn matches(&self, material: &Material) -> bool {
        match self {
            StockFilter::All => true,
            StockFilter::InStock => material.stock > 0,
            StockFilter::OutOfStock => material.stock == 0,
        }
    }
}

impl fmt::Display for StockFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StockFilter::All => "all",
            StockFilter::InStock => ">0",
            StockFilter::OutOfStock => "=0",
        };
        f.write_str(s)
    }
}

impl FromStr for StockFilter {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" | "" => Ok(StockFilter::All),
            ">0" | "in-stock" => Ok(StockFilter::InStock),
            "=0" | "0" | "out-of-stock" => Ok(StockFilter::OutOfStock),
            other => Err(AppError::Validation(format!(
                "Unknown stock filter '{}' (expected all, >0 or =0)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogSettings {
    pub options: SearchOptions,
    /// Rows listed straight from the store when the query is empty
    pub page_size: usize,
    pub result_limit: usize,
    pub suggestion_limit: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            options: SearchOptions::default(),
            page_size: 200,
            result_limit: 200,
            suggestion_limit: 8,
        }
    }
}

pub struct CatalogService {
    material_repo: Arc<dyn MaterialRepository>,
    index: SearchIndex,
    event_bus: Arc<EventBus>,
    settings: CatalogSettings,
}

impl CatalogService {
    pub fn new(
        material_repo: Arc<dyn MaterialRepository>,
        event_bus: Arc<EventBus>,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            material_repo,
            index: SearchIndex::new(),
            event_bus,
            settings,
        }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    pub fn is_index_built(&self) -> bool {
        self.index.is_built()
    }

    /// Mark the index stale; the next query rebuilds it.
    pub fn invalidate_index(&self) {
        log::debug!("Search index invalidated");
        self.index.invalidate();
    }

    /// Rebuild the index from the full material list.
    pub fn rebuild_index(&self) -> AppResult<usize> {
        Ok(self.rebuild_snapshot()?.len())
    }

    fn rebuild_snapshot(&self) -> AppResult<Arc<IndexSnapshot>> {
        let materials = self.material_repo.list_all()?;
        let snapshot = self.index.rebuild(materials);
        log::info!("Search index rebuilt with {} entries", snapshot.len());
        self.event_bus.emit(SearchIndexRebuilt::new(snapshot.len()));
        Ok(snapshot)
    }

    fn current_snapshot(&self) -> AppResult<Arc<IndexSnapshot>> {
        match self.index.snapshot() {
            Some(snapshot) => Ok(snapshot),
            None => self.rebuild_snapshot(),
        }
    }

    /// Search with the configured options.
    pub fn search(&self, text: &str, stock: StockFilter) -> AppResult<Vec<SearchHit>> {
        self.search_with(text, &self.settings.options, stock)
    }

    /// Ranked search; an empty query lists the first page of the store.
    pub fn search_with(
        &self,
        text: &str,
        options: &SearchOptions,
        stock: StockFilter,
    ) -> AppResult<Vec<SearchHit>> {
        let hits = if text.trim().is_empty() {
            self.material_repo
                .list(self.settings.page_size, 0)?
                .into_iter()
                .map(|material| SearchHit { material, score: 1.0 })
                .collect()
        } else {
            self.current_snapshot()?.query(text, options)
        };

        Ok(hits
            .into_iter()
            .filter(|hit| stock.matches(&hit.material))
            .take(self.settings.result_limit)
            .collect())
    }

    /// Short prefix-enabled result list for type-ahead.
    pub fn suggest(&self, text: &str) -> AppResult<Vec<SearchHit>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let options = SearchOptions {
            prefix: true,
            ..self.settings.options
        };
        let mut hits = self.current_snapshot()?.query(text, &options);
        hits.truncate(self.settings.suggestion_limit);
        Ok(hits)
    }

    pub fn get_material(&self, id: Uuid) -> AppResult<Material> {
        self.material_repo.get_by_id(id)?.ok_or(AppError::NotFound)
    }

    pub fn find_by_matricula(&self, matricula: &str) -> AppResult<Option<Material>> {
        self.material_repo.find_by_matricula(matricula)
    }

    pub fn material_count(&self) -> AppResult<u64> {
        self.material_repo.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, initialize_database};
    use crate::domain::MaterialDraft;
    use crate::repositories::SqliteMaterialRepository;

    fn service_with(drafts: &[MaterialDraft], settings: CatalogSettings) -> (CatalogService, Arc<EventBus>) {
        let pool = create_memory_pool().unwrap();
        initialize_database(&pool.get().unwrap()).unwrap();
        let repo = Arc::new(SqliteMaterialRepository::new(Arc::new(pool)));
        repo.upsert_by_matricula(drafts).unwrap();
        let bus = Arc::new(EventBus::new());
        (CatalogService::new(repo, bus.clone(), settings), bus)
    }

    fn catalog() -> Vec<MaterialDraft> {
        vec![
            MaterialDraft::new("A1", "Tornillo", 10, 0.5),
            MaterialDraft::new("A2", "Tuerca", 0, 0.3),
            MaterialDraft::new("A3", "Tornillo largo", 0, 0.8),
        ]
    }

    #[test]
    fn test_stock_filter_parsing() {
        assert_eq!("all".parse::<StockFilter>().unwrap(), StockFilter::All);
        assert_eq!(">0".parse::<StockFilter>().unwrap(), StockFilter::InStock);
        assert_eq!("=0".parse::<StockFilter>().unwrap(), StockFilter::OutOfStock);
        assert!("<5".parse::<StockFilter>().is_err());
        assert_eq!(StockFilter::OutOfStock.to_string(), "=0");
    }

    #[test]
    fn test_first_query_builds_index_lazily() {
        let (service, bus) = service_with(&catalog(), CatalogSettings::default());
        assert!(!service.is_index_built());

        let hits = service.search("tuerca", StockFilter::All).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(service.is_index_built());
        assert_eq!(bus.get_event_log()[0].event_type, "SearchIndexRebuilt");
    }

    #[test]
    fn test_empty_query_lists_store_with_unit_score() {
        let settings = CatalogSettings {
            page_size: 2,
            ..Default::default()
        };
        let (service, _) = service_with(&catalog(), settings);

        let hits = service.search("   ", StockFilter::All).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.score == 1.0));
        assert_eq!(hits[0].material.matricula, "A1");
        assert!(!service.is_index_built());
    }

    #[test]
    fn test_stock_filter_applies_after_ranking() {
        let (service, _) = service_with(&catalog(), CatalogSettings::default());

        let all = service.search("tornillo", StockFilter::All).unwrap();
        let out = service.search("tornillo", StockFilter::OutOfStock).unwrap();
        let in_stock = service.search("tornillo", StockFilter::InStock).unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(out.len(), 1);
        assert_eq!(in_stock.len(), 1);
        let same = all.iter().find(|h| h.material.matricula == "A3").unwrap();
        assert_eq!(same.score, out[0].score);
    }

    #[test]
    fn test_invalidate_then_query_rebuilds() {
        let (service, _) = service_with(&catalog(), CatalogSettings::default());
        assert_eq!(service.rebuild_index().unwrap(), 3);
        service.invalidate_index();
        assert!(!service.is_index_built());

        assert_eq!(service.search("a2", StockFilter::All).unwrap()[0].material.nombre, "Tuerca");
        assert!(service.is_index_built());
    }

    #[test]
    fn test_suggestions_are_bounded() {
        let drafts: Vec<_> = (0..20)
            .map(|i| MaterialDraft::new(format!("C{}", i), format!("Cable {}", i), 1, 1.0))
            .collect();
        let (service, _) = service_with(&drafts, CatalogSettings::default());

        assert_eq!(service.suggest("cab").unwrap().len(), 8);
        assert!(service.suggest("").unwrap().is_empty());
    }

    #[test]
    fn test_get_material_not_found() {
        let (service, _) = service_with(&[], CatalogSettings::default());
        assert!(matches!(service.get_material(Uuid::new_v4()), Err(AppError::NotFound)));
    }
}
