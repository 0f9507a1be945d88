// src/services/import_service.rs
//
// Bulk Loader
//
// Streams a delimited file into the material store:
// read chunk -> map rows -> flush batches -> yield -> repeat.
//
// RULES:
// - Cancellation is observed before every chunk read and every flush
// - Flushed batches stay committed whatever happens afterwards
// - Progress counters never decrease
// - The loader never touches the search index; it emits events instead

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::MaterialDraft;
use crate::error::{AppError, AppResult};
use crate::events::{EventBus, ImportCancelled, ImportCompleted, ImportFailed, ImportStarted};
use crate::infrastructure::tabular::{self, TabularReader, DEFAULT_CHUNK_BYTES};
use crate::repositories::{MaterialRepository, UpsertSummary};

// ============================================================================
// COLUMN MAPPING
// ============================================================================

const MATRICULA_HEADERS: &[&str] = &[
    "matricula",
    "matrícula",
    "codigo",
    "código",
    "sku",
    "material",
    "id material",
];
const NOMBRE_HEADERS: &[&str] = &[
    "nombre",
    "descripcion",
    "descripción",
    "detalle",
    "texto breve de material",
    "texto",
];
const STOCK_HEADERS: &[&str] = &["stock", "cantidad", "disponible"];
const PRECIO_HEADERS: &[&str] = &["precio", "importe", "valor"];

/// Which source column feeds each material field, by header name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub matricula: Option<String>,
    pub nombre: Option<String>,
    pub stock: Option<String>,
    pub precio: Option<String>,
}

impl ColumnMapping {
    /// Guess a mapping from header names.
    ///
    /// For each field the first header (in header order) whose trimmed,
    /// lowercased text is one of the field's known names wins.
    pub fn suggest(columns: &[String]) -> Self {
        let pick = |candidates: &[&str]| {
            columns
                .iter()
                .find(|c| {
                    let key = c.trim().to_lowercase();
                    candidates.contains(&key.as_str())
                })
                .cloned()
        };

        Self {
            matricula: pick(MATRICULA_HEADERS),
            nombre: pick(NOMBRE_HEADERS),
            stock: pick(STOCK_HEADERS),
            precio: pick(PRECIO_HEADERS),
        }
    }

    /// Resolve header names to column positions.
    fn resolve(&self, columns: &[String]) -> AppResult<ResolvedMapping> {
        if self.matricula.is_none() && self.nombre.is_none() {
            return Err(AppError::Validation(
                "Column mapping must assign matricula or nombre".to_string(),
            ));
        }

        let locate = |field: &str, name: &Option<String>| -> AppResult<Option<usize>> {
            match name {
                None => Ok(None),
                Some(name) => columns
                    .iter()
                    .position(|c| c == name)
                    .map(Some)
                    .ok_or_else(|| {
                        AppError::Validation(format!(
                            "Column '{}' mapped to {} is not in the file",
                            name, field
                        ))
                    }),
            }
        };

        Ok(ResolvedMapping {
            matricula: locate("matricula", &self.matricula)?,
            nombre: locate("nombre", &self.nombre)?,
            stock: locate("stock", &self.stock)?,
            precio: locate("precio", &self.precio)?,
        })
    }
}

struct ResolvedMapping {
    matricula: Option<usize>,
    nombre: Option<usize>,
    stock: Option<usize>,
    precio: Option<usize>,
}

impl ResolvedMapping {
    fn draft(&self, row: &[String]) -> MaterialDraft {
        let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("");

        MaterialDraft::new(
            cell(self.matricula),
            cell(self.nombre),
            coerce_stock(cell(self.stock)),
            coerce_number(cell(self.precio)),
        )
    }
}

/// Parse a numeric cell. A decimal comma is accepted when there is no dot.
/// Anything unparsable, non-finite or negative becomes 0.
pub fn coerce_number(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };

    match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => 0.0,
    }
}

/// Stock is a whole number of units; fractions are truncated.
pub fn coerce_stock(raw: &str) -> u64 {
    coerce_number(raw).trunc() as u64
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub delimiter: char,
    pub columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub suggested_mapping: ColumnMapping,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportProgress {
    /// Data rows parsed from the source so far
    pub rows_parsed: u64,
    /// Rows written to the store so far
    pub rows_committed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub import_id: Uuid,
    /// Rows written to the store (inserted + updated)
    pub total_rows: u64,
    /// Rows carried by committed batches, blank rows included
    pub rows_read: u64,
    /// Rows parsed from the source, committed or not
    pub rows_parsed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    pub chunk_bytes: usize,
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            batch_size: 1000,
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct ImportService {
    material_repo: Arc<dyn MaterialRepository>,
    event_bus: Arc<EventBus>,
    options: ImportOptions,
}

impl ImportService {
    pub fn new(
        material_repo: Arc<dyn MaterialRepository>,
        event_bus: Arc<EventBus>,
        options: ImportOptions,
    ) -> Self {
        Self {
            material_repo,
            event_bus,
            options: ImportOptions {
                chunk_bytes: options.chunk_bytes.max(1),
                batch_size: options.batch_size.max(1),
            },
        }
    }

    pub fn options(&self) -> ImportOptions {
        self.options
    }

    /// Header, first rows and a suggested mapping for a file.
    pub fn preview(&self, path: &Path, max_rows: usize) -> AppResult<ImportPreview> {
        let preview = tabular::preview(path, max_rows)?;
        let suggested_mapping = ColumnMapping::suggest(&preview.columns);
        Ok(ImportPreview {
            delimiter: preview.delimiter,
            columns: preview.columns,
            sample_rows: preview.sample_rows,
            suggested_mapping,
        })
    }

    pub async fn import_file<F>(
        &self,
        path: &Path,
        mapping: &ColumnMapping,
        on_progress: F,
        cancel: &CancellationToken,
    ) -> AppResult<ImportOutcome>
    where
        F: FnMut(ImportProgress) + Send,
    {
        let file = File::open(path)?;
        let label = path.display().to_string();
        self.import_reader(&label, file, mapping, on_progress, cancel).await
    }

    /// Stream rows from `source` into the store.
    ///
    /// Cancellation is reported as `cancelled = true` in the outcome. Parse
    /// and storage failures are returned as errors; batches flushed before
    /// the failure remain committed.
    pub async fn import_reader<R, F>(
        &self,
        label: &str,
        source: R,
        mapping: &ColumnMapping,
        mut on_progress: F,
        cancel: &CancellationToken,
    ) -> AppResult<ImportOutcome>
    where
        R: Read + Send,
        F: FnMut(ImportProgress) + Send,
    {
        let mut reader = TabularReader::from_reader(source, self.options.chunk_bytes)?;
        let resolved = mapping.resolve(reader.columns())?;

        let import_id = Uuid::new_v4();
        self.event_bus.emit(ImportStarted::new(import_id, label.to_string()));
        log::info!("Import {} started from {}", import_id, label);

        let mut run = ImportRun::default();
        let result = self
            .run_loop(&mut reader, &resolved, &mut run, &mut on_progress, cancel)
            .await;

        if let Err(err) = result {
            log::error!(
                "Import {} failed after {} committed rows: {}",
                import_id,
                run.summary.written(),
                err
            );
            self.event_bus.emit(ImportFailed::new(
                import_id,
                run.summary.written(),
                err.to_string(),
            ));
            return Err(err);
        }

        let outcome = ImportOutcome {
            import_id,
            total_rows: run.summary.written(),
            rows_read: run.rows_flushed,
            rows_parsed: run.rows_parsed,
            inserted: run.summary.inserted,
            updated: run.summary.updated,
            skipped: run.summary.skipped,
            cancelled: run.cancelled,
        };

        if outcome.cancelled {
            log::warn!(
                "Import {} cancelled: {} rows committed, {} parsed",
                import_id,
                outcome.total_rows,
                outcome.rows_parsed
            );
            self.event_bus.emit(ImportCancelled::new(
                import_id,
                outcome.rows_read,
                outcome.total_rows,
            ));
        } else {
            log::info!(
                "Import {} completed: {} rows ({} new, {} updated, {} skipped)",
                import_id,
                outcome.total_rows,
                outcome.inserted,
                outcome.updated,
                outcome.skipped
            );
            self.event_bus.emit(ImportCompleted::new(
                import_id,
                outcome.rows_read,
                outcome.total_rows,
                outcome.inserted,
                outcome.updated,
            ));
        }

        Ok(outcome)
    }

    async fn run_loop<R, F>(
        &self,
        reader: &mut TabularReader<R>,
        mapping: &ResolvedMapping,
        run: &mut ImportRun,
        on_progress: &mut F,
        cancel: &CancellationToken,
    ) -> AppResult<()>
    where
        R: Read + Send,
        F: FnMut(ImportProgress) + Send,
    {
        let batch_size = self.options.batch_size;
        let mut pending: Vec<MaterialDraft> = Vec::with_capacity(batch_size);

        loop {
            if cancel.is_cancelled() {
                run.cancelled = true;
                return Ok(());
            }

            let Some(rows) = reader.next_chunk()? else { break };
            run.rows_parsed += rows.len() as u64;
            pending.extend(rows.iter().map(|row| mapping.draft(row)));
            on_progress(run.progress());

            while pending.len() >= batch_size {
                if cancel.is_cancelled() {
                    run.cancelled = true;
                    return Ok(());
                }
                let batch: Vec<MaterialDraft> = pending.drain(..batch_size).collect();
                self.flush(&batch, run, on_progress).await?;
            }
        }

        if !pending.is_empty() {
            if cancel.is_cancelled() {
                run.cancelled = true;
                return Ok(());
            }
            self.flush(&pending, run, on_progress).await?;
        }

        Ok(())
    }

    async fn flush<F>(&self, batch: &[MaterialDraft], run: &mut ImportRun, on_progress: &mut F) -> AppResult<()>
    where
        F: FnMut(ImportProgress) + Send,
    {
        let summary = self.material_repo.upsert_by_matricula(batch)?;
        run.summary.absorb(summary);
        run.rows_flushed += batch.len() as u64;
        log::debug!(
            "Flushed batch of {} rows ({} committed so far)",
            batch.len(),
            run.summary.written()
        );
        on_progress(run.progress());
        tokio::task::yield_now().await;
        Ok(())
    }
}

#[derive(Default)]
struct ImportRun {
    rows_parsed: u64,
    rows_flushed: u64,
    summary: UpsertSummary,
    cancelled: bool,
}

impl ImportRun {
    fn progress(&self) -> ImportProgress {
        ImportProgress {
            rows_parsed: self.rows_parsed,
            rows_committed: self.summary.written(),
        }
    }
}
