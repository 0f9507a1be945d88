// src/repositories/material_repository.rs
//
// Material persistence and the merge-by-matricula rule.

use std::sync::Arc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{parse_timestamp, parse_uuid};
use crate::db::ConnectionPool;
use crate::domain::material::{validate_draft, Material, MaterialDraft};
use crate::error::AppResult;

/// What one merge call did to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct UpsertSummary {
    pub inserted: u64,
    pub updated: u64,
    /// Blank rows dropped without touching the store
    pub skipped: u64,
}

impl UpsertSummary {
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn absorb(&mut self, other: UpsertSummary) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
    }
}

pub trait MaterialRepository: Send + Sync {
    /// Merge a batch of import rows.
    ///
    /// Rows with a matricula overwrite the existing row carrying the same
    /// code (all fields except `id`), or are inserted. Rows without a
    /// matricula are always inserted. Blank rows are skipped. Each row is
    /// written in its own transaction; a failure aborts the rest of the batch
    /// and leaves earlier rows committed.
    fn upsert_by_matricula(&self, batch: &[MaterialDraft]) -> AppResult<UpsertSummary>;
    fn find_by_matricula(&self, matricula: &str) -> AppResult<Option<Material>>;
    fn get_by_id(&self, id: Uuid) -> AppResult<Option<Material>>;
    /// Page through materials in insertion order
    fn list(&self, limit: usize, offset: usize) -> AppResult<Vec<Material>>;
    fn list_all(&self) -> AppResult<Vec<Material>>;
    fn count(&self) -> AppResult<u64>;
    fn delete(&self, id: Uuid) -> AppResult<bool>;
}

pub struct SqliteMaterialRepository {
    pool: Arc<ConnectionPool>,
}

const COLUMNS: &str = "id, matricula, nombre, stock, precio, updated_at";

impl SqliteMaterialRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    fn row_to_material(row: &Row) -> rusqlite::Result<Material> {
        let id_str: String = row.get("id")?;
        let updated_at_str: String = row.get("updated_at")?;
        let stock: i64 = row.get("stock")?;

        Ok(Material {
            id: parse_uuid(0, &id_str)?,
            matricula: row.get("matricula")?,
            nombre: row.get("nombre")?,
            stock: u64::try_from(stock).unwrap_or(0),
            precio: row.get("precio")?,
            updated_at: parse_timestamp(5, &updated_at_str)?,
        })
    }

    fn find_in(conn: &Connection, matricula: &str) -> rusqlite::Result<Option<Material>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM materials WHERE matricula = ?1 ORDER BY seq LIMIT 1",
                COLUMNS
            ),
            params![matricula],
            Self::row_to_material,
        )
        .optional()
    }

    fn insert_in(conn: &Connection, material: &Material) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO materials (id, matricula, nombre, stock, precio, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                material.id.to_string(),
                material.matricula,
                material.nombre,
                stock_to_sql(material.stock),
                material.precio,
                material.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_in(conn: &Connection, material: &Material) -> rusqlite::Result<()> {
        conn.execute(
            "UPDATE materials
             SET matricula = ?1, nombre = ?2, stock = ?3, precio = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                material.matricula,
                material.nombre,
                stock_to_sql(material.stock),
                material.precio,
                material.updated_at.to_rfc3339(),
                material.id.to_string(),
            ],
        )?;
        Ok(())
    }
}

fn stock_to_sql(stock: u64) -> i64 {
    i64::try_from(stock).unwrap_or(i64::MAX)
}

impl MaterialRepository for SqliteMaterialRepository {
    fn upsert_by_matricula(&self, batch: &[MaterialDraft]) -> AppResult<UpsertSummary> {
        let mut conn = self.pool.get()?;
        let mut summary = UpsertSummary::default();

        for draft in batch {
            if draft.is_blank() {
                summary.skipped += 1;
                continue;
            }
            validate_draft(draft)?;

            // One transaction per row: the lookup and the write for a given
            // matricula cannot interleave with another writer.
            let tx = conn.transaction()?;
            let existing = if draft.has_matricula() {
                Self::find_in(&tx, &draft.matricula)?
            } else {
                None
            };

            match existing {
                Some(mut material) => {
                    material.overwrite_with(draft);
                    Self::update_in(&tx, &material)?;
                    summary.updated += 1;
                }
                None => {
                    Self::insert_in(&tx, &Material::from_draft(draft))?;
                    summary.inserted += 1;
                }
            }
            tx.commit()?;
        }

        Ok(summary)
    }

    fn find_by_matricula(&self, matricula: &str) -> AppResult<Option<Material>> {
        let matricula = matricula.trim();
        if matricula.is_empty() {
            return Ok(None);
        }
        let conn = self.pool.get()?;
        Ok(Self::find_in(&conn, matricula)?)
    }

    fn get_by_id(&self, id: Uuid) -> AppResult<Option<Material>> {
        let conn = self.pool.get()?;
        let material = conn
            .query_row(
                &format!("SELECT {} FROM materials WHERE id = ?1", COLUMNS),
                params![id.to_string()],
                Self::row_to_material,
            )
            .optional()?;
        Ok(material)
    }

    fn list(&self, limit: usize, offset: usize) -> AppResult<Vec<Material>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM materials ORDER BY seq LIMIT ?1 OFFSET ?2",
            COLUMNS
        ))?;
        let materials = stmt
            .query_map(params![limit as i64, offset as i64], Self::row_to_material)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(materials)
    }

    fn list_all(&self) -> AppResult<Vec<Material>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM materials ORDER BY seq", COLUMNS))?;
        let materials = stmt
            .query_map([], Self::row_to_material)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(materials)
    }

    fn count(&self) -> AppResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM materials", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn delete(&self, id: Uuid) -> AppResult<bool> {
        let conn = self.pool.get()?;
        let affected = conn.execute("DELETE FROM materials WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_memory_pool, initialize_database};

    fn repo() -> SqliteMaterialRepository {
        let pool = create_memory_pool().unwrap();
        initialize_database(&pool.get().unwrap()).unwrap();
        SqliteMaterialRepository::new(Arc::new(pool))
    }

    fn draft(code: &str, name: &str, stock: u64, precio: f64) -> MaterialDraft {
        MaterialDraft::new(code, name, stock, precio)
    }

    #[test]
    fn test_insert_then_find() {
        let repo = repo();
        let summary = repo
            .upsert_by_matricula(&[draft("A1", "Tornillo", 10, 0.5)])
            .unwrap();

        assert_eq!(summary, UpsertSummary { inserted: 1, updated: 0, skipped: 0 });
        let found = repo.find_by_matricula("A1").unwrap().unwrap();
        assert_eq!(found.nombre, "Tornillo");
        assert_eq!(found.stock, 10);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let repo = repo();
        let batch = vec![
            draft("A1", "Tornillo", 10, 0.5),
            draft("A2", "Tuerca", 0, 0.3),
        ];

        repo.upsert_by_matricula(&batch).unwrap();
        let before = repo.list_all().unwrap();

        let summary = repo.upsert_by_matricula(&batch).unwrap();
        let after = repo.list_all().unwrap();

        assert_eq!(summary.updated, 2);
        assert_eq!(summary.inserted, 0);
        assert_eq!(after.len(), before.len());
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.matricula, b.matricula);
            assert_eq!(a.nombre, b.nombre);
            assert_eq!(a.stock, b.stock);
            assert_eq!(a.precio, b.precio);
        }
    }

    #[test]
    fn test_last_write_wins_within_batch() {
        let repo = repo();
        repo.upsert_by_matricula(&[
            draft("A1", "Tornillo", 10, 0.5),
            draft("A1", "Tornillo M6", 4, 0.7),
        ])
        .unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let found = repo.find_by_matricula("A1").unwrap().unwrap();
        assert_eq!(found.nombre, "Tornillo M6");
        assert_eq!(found.stock, 4);
    }

    #[test]
    fn test_full_overwrite_replaces_zeroes() {
        let repo = repo();
        repo.upsert_by_matricula(&[draft("A1", "Tornillo", 10, 0.5)]).unwrap();
        repo.upsert_by_matricula(&[draft("A1", "Tornillo", 0, 0.0)]).unwrap();

        let found = repo.find_by_matricula("A1").unwrap().unwrap();
        assert_eq!(found.stock, 0);
        assert_eq!(found.precio, 0.0);
    }

    #[test]
    fn test_blank_rows_are_dropped() {
        let repo = repo();
        let summary = repo
            .upsert_by_matricula(&[
                draft("A1", "Tornillo", 1, 1.0),
                draft("", "", 3, 2.0),
                draft("", "Sin codigo", 1, 1.0),
            ])
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.inserted, 2);
        assert_eq!(repo.count().unwrap(), 2);
    }

    #[test]
    fn test_rows_without_matricula_never_merge() {
        let repo = repo();
        repo.upsert_by_matricula(&[draft("", "Arandela", 1, 1.0)]).unwrap();
        repo.upsert_by_matricula(&[draft("", "Arandela", 1, 1.0)]).unwrap();

        assert_eq!(repo.count().unwrap(), 2);
        assert!(repo.find_by_matricula("").unwrap().is_none());
    }

    #[test]
    fn test_invalid_row_aborts_rest_of_batch() {
        let repo = repo();
        let result = repo.upsert_by_matricula(&[
            draft("A1", "Tornillo", 1, 1.0),
            draft("A2", "Tuerca", 1, f64::NAN),
            draft("A3", "Clavo", 1, 1.0),
        ]);

        assert!(result.is_err());
        assert!(repo.find_by_matricula("A1").unwrap().is_some());
        assert!(repo.find_by_matricula("A3").unwrap().is_none());
    }

    #[test]
    fn test_list_pages_in_insertion_order() {
        let repo = repo();
        let batch: Vec<_> = (0..5)
            .map(|i| draft(&format!("M{}", i), &format!("Material {}", i), i, 1.0))
            .collect();
        repo.upsert_by_matricula(&batch).unwrap();

        let page = repo.list(2, 2).unwrap();
        let codes: Vec<_> = page.iter().map(|m| m.matricula.as_str()).collect();
        assert_eq!(codes, vec!["M2", "M3"]);
    }

    #[test]
    fn test_get_and_delete() {
        let repo = repo();
        repo.upsert_by_matricula(&[draft("A1", "Tornillo", 1, 1.0)]).unwrap();
        let material = repo.find_by_matricula("A1").unwrap().unwrap();

        assert!(repo.get_by_id(material.id).unwrap().is_some());
        assert!(repo.delete(material.id).unwrap());
        assert!(repo.get_by_id(material.id).unwrap().is_none());
        assert!(!repo.delete(material.id).unwrap());
    }
}
