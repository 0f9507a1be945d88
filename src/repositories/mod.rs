// src/repositories/mod.rs
//
// Repository layer
//
// RULES:
// - Repositories are data mappers over the local SQLite store
// - NO event emission
// - NO cross-repository calls
// - Explicit SQL only
// - Multi-statement writes run inside one transaction

pub mod material_repository;
pub mod snapshot_repository;
pub mod slot_repository;
pub mod asset_cache_repository;

pub use material_repository::{MaterialRepository, SqliteMaterialRepository, UpsertSummary};
pub use snapshot_repository::{SnapshotRepository, SqliteSnapshotRepository};
pub use slot_repository::{SlotRepository, SqliteSlotRepository};
pub use asset_cache_repository::{AssetCacheRepository, CachedEntry, SqliteAssetCacheRepository};

use chrono::{DateTime, Utc};
use uuid::Uuid;

fn parse_uuid(column: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}
