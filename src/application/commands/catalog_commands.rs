// src/application/commands/catalog_commands.rs
//
// Import & Search Command Handlers
//
// RULES:
// - Accept plain arguments
// - Call services
// - Return DTOs
// - Never contain business logic

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::application::{dto::*, state::AppState};
use crate::error::AppResult;
use crate::services::{ColumnMapping, ImportProgress, StockFilter};

/// Header, sample rows and suggested mapping for a file
pub fn preview_file(state: &AppState, path: &Path, rows: Option<usize>) -> AppResult<ImportPreviewDto> {
    let rows = rows.unwrap_or(state.config.import.preview_rows);
    let preview = state.import_service.preview(path, rows)?;
    Ok(ImportPreviewDto::from(preview))
}

/// Import a file; columns not named in `overrides` come from the suggested mapping.
pub async fn import_file<F>(
    state: &AppState,
    path: &Path,
    overrides: ColumnMapping,
    on_progress: F,
    cancel: &CancellationToken,
) -> AppResult<ImportResultDto>
where
    F: FnMut(ImportProgress) + Send,
{
    let suggested = state.import_service.preview(path, 0)?.suggested_mapping;
    let mapping = ColumnMapping {
        matricula: overrides.matricula.or(suggested.matricula),
        nombre: overrides.nombre.or(suggested.nombre),
        stock: overrides.stock.or(suggested.stock),
        precio: overrides.precio.or(suggested.precio),
    };
    log::debug!("Import mapping: {:?}", mapping);

    let outcome = state
        .import_service
        .import_file(path, &mapping, on_progress, cancel)
        .await?;
    Ok(ImportResultDto::from(outcome))
}

pub fn search_materials(state: &AppState, query: &str, stock: StockFilter) -> AppResult<SearchResultsDto> {
    let hits = state.catalog_service.search(query, stock)?;
    Ok(SearchResultsDto {
        query: query.to_string(),
        stock: stock.to_string(),
        hits: hits.into_iter().map(SearchHitDto::from).collect(),
    })
}

/// Typeahead suggestions
pub fn suggest_materials(state: &AppState, query: &str) -> AppResult<SearchResultsDto> {
    let hits = state.catalog_service.suggest(query)?;
    Ok(SearchResultsDto {
        query: query.to_string(),
        stock: StockFilter::All.to_string(),
        hits: hits.into_iter().map(SearchHitDto::from).collect(),
    })
}
