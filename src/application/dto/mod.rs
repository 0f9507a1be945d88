// src/application/dto/mod.rs
//
// Data Transfer Objects
//
// CRITICAL PRINCIPLES:
// - DTOs are UI-friendly representations
// - DTOs NEVER leak domain invariants
// - DTOs are simple, serializable structs
// - Conversion FROM domain entities only (never TO)

use serde::Serialize;

use crate::db::DatabaseStats;
use crate::domain::{CartLine, Material, Snapshot};
use crate::search::SearchHit;
use crate::services::{
    CacheStatus, CheckoutReceipt, ColumnMapping, ImportOutcome, ImportPreview, InstallOutcome,
};
use crate::application::state::UpdateRequest;

/// Plain-text rendering for the terminal; JSON output uses `Serialize`.
pub trait Render {
    fn render(&self) -> String;
}

// ============================================================================
// MATERIAL DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MaterialDto {
    pub id: String,
    pub matricula: String,
    pub nombre: String,
    pub stock: u64,
    pub precio: f64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHitDto {
    pub material: MaterialDto,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResultsDto {
    pub query: String,
    pub stock: String,
    pub hits: Vec<SearchHitDto>,
}

// ============================================================================
// IMPORT DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreviewDto {
    pub delimiter: String,
    pub columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    pub suggested_mapping: ColumnMapping,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResultDto {
    pub import_id: String,
    pub total_rows: u64,
    pub rows_read: u64,
    pub rows_parsed: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    pub cancelled: bool,
}

// ============================================================================
// CART DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CartLineDto {
    pub material_id: String,
    pub matricula: String,
    pub nombre: String,
    pub qty: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartDto {
    pub lines: Vec<CartLineDto>,
    pub total_units: u64,
    pub export_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutDto {
    pub snapshot_id: String,
    pub line_count: usize,
    pub export_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDto {
    pub id: String,
    pub created_at: String,
    pub line_count: usize,
    pub items: Vec<CartLineDto>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotListDto {
    pub snapshots: Vec<SnapshotDto>,
}

/// Export text of a cart or snapshot
#[derive(Debug, Clone, Serialize)]
pub struct ExportDto {
    pub text: String,
}

// ============================================================================
// ASSET DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FetchResultDto {
    pub url: String,
    /// `pass_through` when the request was not handled by the cache
    pub source: String,
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateDto {
    pub result: UpdateRequest,
}

// ============================================================================
// DATABASE DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseReportDto {
    pub integrity_ok: bool,
    pub stats: DatabaseStats,
}

// ============================================================================
// CONVERSION HELPERS (Domain → DTO)
// ============================================================================

impl From<Material> for MaterialDto {
    fn from(material: Material) -> Self {
        Self {
            id: material.id.to_string(),
            matricula: material.matricula,
            nombre: material.nombre,
            stock: material.stock,
            precio: material.precio,
            updated_at: material.updated_at.to_rfc3339(),
        }
    }
}

impl From<SearchHit> for SearchHitDto {
    fn from(hit: SearchHit) -> Self {
        Self {
            material: MaterialDto::from(hit.material),
            score: hit.score,
        }
    }
}

impl From<ImportPreview> for ImportPreviewDto {
    fn from(preview: ImportPreview) -> Self {
        Self {
            delimiter: preview.delimiter.to_string(),
            columns: preview.columns,
            sample_rows: preview.sample_rows,
            suggested_mapping: preview.suggested_mapping,
        }
    }
}

impl From<ImportOutcome> for ImportResultDto {
    fn from(outcome: ImportOutcome) -> Self {
        Self {
            import_id: outcome.import_id.to_string(),
            total_rows: outcome.total_rows,
            rows_read: outcome.rows_read,
            rows_parsed: outcome.rows_parsed,
            inserted: outcome.inserted,
            updated: outcome.updated,
            skipped: outcome.skipped,
            cancelled: outcome.cancelled,
        }
    }
}

impl From<CartLine> for CartLineDto {
    fn from(line: CartLine) -> Self {
        Self {
            material_id: line.material_id.to_string(),
            matricula: line.matricula,
            nombre: line.nombre,
            qty: line.qty,
        }
    }
}

impl From<CheckoutReceipt> for CheckoutDto {
    fn from(receipt: CheckoutReceipt) -> Self {
        Self {
            snapshot_id: receipt.snapshot_id.to_string(),
            line_count: receipt.line_count,
            export_text: receipt.export_text,
        }
    }
}

impl From<Snapshot> for SnapshotDto {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            id: snapshot.id.to_string(),
            created_at: snapshot.created_at.to_rfc3339(),
            line_count: snapshot.line_count(),
            items: snapshot.items.into_iter().map(CartLineDto::from).collect(),
        }
    }
}

// ============================================================================
// TEXT RENDERING
// ============================================================================

fn material_line(material: &MaterialDto) -> String {
    format!(
        "{:<14} {:<40} {:>8} {:>10.2}",
        material.matricula, material.nombre, material.stock, material.precio
    )
}

impl Render for SearchResultsDto {
    fn render(&self) -> String {
        if self.hits.is_empty() {
            return format!("No materials match '{}' (stock {})", self.query, self.stock);
        }
        self.hits
            .iter()
            .map(|hit| material_line(&hit.material))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Render for MaterialDto {
    fn render(&self) -> String {
        material_line(self)
    }
}

impl Render for ImportPreviewDto {
    fn render(&self) -> String {
        let mapping = &self.suggested_mapping;
        let mut out = format!(
            "Delimiter: {:?}\nColumns: {}\nSuggested mapping: matricula={} nombre={} stock={} precio={}",
            self.delimiter,
            self.columns.join(" | "),
            mapping.matricula.as_deref().unwrap_or("-"),
            mapping.nombre.as_deref().unwrap_or("-"),
            mapping.stock.as_deref().unwrap_or("-"),
            mapping.precio.as_deref().unwrap_or("-"),
        );
        for row in &self.sample_rows {
            out.push('\n');
            out.push_str(&row.join(" | "));
        }
        out
    }
}

impl Render for ImportResultDto {
    fn render(&self) -> String {
        let verb = if self.cancelled { "Cancelled" } else { "Imported" };
        format!(
            "{}: {} rows committed ({} new, {} updated, {} blank skipped) of {} read",
            verb, self.total_rows, self.inserted, self.updated, self.skipped, self.rows_read
        )
    }
}

impl Render for CartLineDto {
    fn render(&self) -> String {
        format!("{:<14} {:<40} x{}", self.matricula, self.nombre, self.qty)
    }
}

impl Render for CartDto {
    fn render(&self) -> String {
        if self.lines.is_empty() {
            return "Cart is empty".to_string();
        }
        let mut out: Vec<String> = self.lines.iter().map(Render::render).collect();
        out.push(format!("{} units in {} lines", self.total_units, self.lines.len()));
        out.join("\n")
    }
}

impl Render for CheckoutDto {
    fn render(&self) -> String {
        format!(
            "Snapshot {} ({} lines)\n{}",
            self.snapshot_id, self.line_count, self.export_text
        )
    }
}

impl Render for SnapshotListDto {
    fn render(&self) -> String {
        if self.snapshots.is_empty() {
            return "No snapshots".to_string();
        }
        self.snapshots
            .iter()
            .map(|s| format!("{}  {}  {} lines", s.id, s.created_at, s.line_count))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Render for ExportDto {
    fn render(&self) -> String {
        self.text.clone()
    }
}

impl Render for InstallOutcome {
    fn render(&self) -> String {
        match self {
            InstallOutcome::UpToDate { generation } => format!("Up to date ({})", generation),
            InstallOutcome::Installed {
                generation,
                entry_count,
                activated: true,
            } => format!("{} installed with {} entries and activated", generation, entry_count),
            InstallOutcome::Installed {
                generation,
                entry_count,
                activated: false,
            } => format!(
                "{} installed with {} entries; waiting for clients to close",
                generation, entry_count
            ),
        }
    }
}

impl Render for CacheStatus {
    fn render(&self) -> String {
        let active = self
            .active
            .as_ref()
            .map(|g| format!("{} ({} entries)", g.id, self.active_entry_count))
            .unwrap_or_else(|| "none".to_string());
        let waiting = self
            .waiting
            .as_ref()
            .map(|g| g.id.to_string())
            .unwrap_or_else(|| "none".to_string());
        let mut out = format!(
            "Active: {}\nWaiting: {}\nClients: {}\nManifest: {}",
            active, waiting, self.attached_clients, self.manifest_digest
        );
        for generation in &self.generations {
            out.push_str(&format!("\n  {} {}", generation.id, generation.state));
        }
        out
    }
}

impl Render for FetchResultDto {
    fn render(&self) -> String {
        match self.status {
            Some(status) => format!(
                "{} {} from {} ({} bytes, {})",
                status,
                self.url,
                self.source,
                self.bytes,
                self.content_type.as_deref().unwrap_or("unknown type")
            ),
            None => format!("{} passed through", self.url),
        }
    }
}

impl Render for UpdateDto {
    fn render(&self) -> String {
        match self.result {
            UpdateRequest::Sent => "Update requested".to_string(),
            UpdateRequest::Deferred => "Update deferred until the running import ends".to_string(),
        }
    }
}

impl Render for DatabaseReportDto {
    fn render(&self) -> String {
        format!(
            "Integrity: {}\nSize: {} bytes ({} pages of {})\nMaterials: {}\nSnapshots: {}\nCache entries: {}",
            if self.integrity_ok { "ok" } else { "FAILED" },
            self.stats.size_bytes,
            self.stats.page_count,
            self.stats.page_size,
            self.stats.material_count,
            self.stats.snapshot_count,
            self.stats.cache_entry_count,
        )
    }
}
