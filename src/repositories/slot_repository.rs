// src/repositories/slot_repository.rs
//
// Named single-value slots. The cart is stored under `CART_SLOT`.

use std::sync::Arc;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::ConnectionPool;
use crate::error::AppResult;

pub const CART_SLOT: &str = "cart";

pub trait SlotRepository: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    /// Replace the slot value atomically
    fn put(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<bool>;
}

pub struct SqliteSlotRepository {
    pool: Arc<ConnectionPool>,
}

impl SqliteSlotRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }
}

impl SlotRepository for SqliteSlotRepository {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_slots WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO kv_slots (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let affected = conn.execute("DELETE FROM kv_slots WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, initialize_database};

    fn repo() -> SqliteSlotRepository {
        let pool = create_memory_pool().unwrap();
        initialize_database(&pool.get().unwrap()).unwrap();
        SqliteSlotRepository::new(Arc::new(pool))
    }

    #[test]
    fn test_put_overwrites() {
        let repo = repo();
        assert!(repo.get(CART_SLOT).unwrap().is_none());

        repo.put(CART_SLOT, "[]").unwrap();
        repo.put(CART_SLOT, "[1]").unwrap();

        assert_eq!(repo.get(CART_SLOT).unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_remove() {
        let repo = repo();
        repo.put("other", "x").unwrap();
        assert!(repo.remove("other").unwrap());
        assert!(!repo.remove("other").unwrap());
        assert!(repo.get("other").unwrap().is_none());
    }
}
