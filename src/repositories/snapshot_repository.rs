// src/repositories/snapshot_repository.rs

use std::sync::Arc;
use chrono::SecondsFormat;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::db::ConnectionPool;
use crate::domain::{CartLine, Snapshot};
use crate::error::AppResult;

/// Append-only history of sent orders.
pub trait SnapshotRepository: Send + Sync {
    fn add(&self, snapshot: &Snapshot) -> AppResult<()>;
    /// Newest first
    fn list_recent(&self, limit: usize) -> AppResult<Vec<Snapshot>>;
    fn get_by_id(&self, id: Uuid) -> AppResult<Option<Snapshot>>;
}

pub struct SqliteSnapshotRepository {
    pool: Arc<ConnectionPool>,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    fn row_to_snapshot(row: &Row) -> Result<Snapshot, rusqlite::Error> {
        let id_str: String = row.get("id")?;
        let created_at_str: String = row.get("created_at")?;
        let items_json: String = row.get("items")?;

        let items: Vec<CartLine> = serde_json::from_str(&items_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Snapshot {
            id: parse_uuid(0, &id_str)?,
            created_at: parse_timestamp(1, &created_at_str)?,
            items,
        })
    }
}

impl SnapshotRepository for SqliteSnapshotRepository {
    fn add(&self, snapshot: &Snapshot) -> AppResult<()> {
        let items_json = serde_json::to_string(&snapshot.items)?;
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO snapshots (id, created_at, items) VALUES (?1, ?2, ?3)",
            params![
                snapshot.id.to_string(),
                snapshot.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                items_json,
            ],
        )?;
        Ok(())
    }

    fn list_recent(&self, limit: usize) -> AppResult<Vec<Snapshot>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, created_at, items FROM snapshots
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1",
        )?;
        let snapshots = stmt
            .query_map(params![limit as i64], Self::row_to_snapshot)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    fn get_by_id(&self, id: Uuid) -> AppResult<Option<Snapshot>> {
        let conn = self.pool.get()?;
        let snapshot = conn
            .query_row(
                "SELECT id, created_at, items FROM snapshots WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_snapshot,
            )
            .optional()?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, initialize_database};
    use chrono::{Duration, Utc};

    fn repo() -> SqliteSnapshotRepository {
        let pool = create_memory_pool().unwrap();
        initialize_database(&pool.get().unwrap()).unwrap();
        SqliteSnapshotRepository::new(Arc::new(pool))
    }

    fn line(code: &str, qty: u32) -> CartLine {
        CartLine {
            material_id: Uuid::new_v4(),
            matricula: code.to_string(),
            nombre: format!("Material {}", code),
            qty,
        }
    }

    #[test]
    fn test_add_and_get_roundtrip() {
        let repo = repo();
        let snapshot = Snapshot::new(vec![line("A1", 2), line("B2", 1)]);
        repo.add(&snapshot).unwrap();

        let loaded = repo.get_by_id(snapshot.id).unwrap().unwrap();
        assert_eq!(loaded.items, snapshot.items);
        assert_eq!(loaded.export_text(), "A1, 2\nB2, 1");
    }

    #[test]
    fn test_list_recent_newest_first_and_limited() {
        let repo = repo();
        let base = Utc::now();
        for i in 0..25 {
            let mut snapshot = Snapshot::new(vec![line(&format!("M{}", i), 1)]);
            snapshot.created_at = base + Duration::seconds(i);
            repo.add(&snapshot).unwrap();
        }

        let recent = repo.list_recent(20).unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].items[0].matricula, "M24");
        assert_eq!(recent[19].items[0].matricula, "M5");
    }

    #[test]
    fn test_unknown_id_is_none() {
        let repo = repo();
        assert!(repo.get_by_id(Uuid::new_v4()).unwrap().is_none());
    }
}
