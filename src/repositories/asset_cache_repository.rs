// src/repositories/asset_cache_repository.rs
//
// Cache generations and their entries.
//
// State transitions are decided by the domain (`Generation::transition`);
// this repository only persists the outcome. Every write that touches more
// than one row runs in a single transaction so a generation is never
// half-installed or half-activated on disk.

use std::sync::Arc;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::parse_timestamp;
use crate::db::ConnectionPool;
use crate::domain::asset::{match_key, request_key};
use crate::domain::{AssetResponse, Generation, GenerationId, GenerationState, ResponseSource};
use crate::error::AppResult;

/// A stored response, keyed by request URL within one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
    pub generation: GenerationId,
    pub request_key: String,
    /// Request key without the query string
    pub match_key: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    pub fn from_response(generation: GenerationId, url: &Url, response: &AssetResponse) -> Self {
        Self {
            generation,
            request_key: request_key(url),
            match_key: match_key(url),
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            stored_at: Utc::now(),
        }
    }

    pub fn into_response(self) -> AssetResponse {
        AssetResponse {
            url: self.request_key,
            status: self.status,
            headers: self.headers,
            body: self.body,
            source: ResponseSource::Cache,
        }
    }
}

pub trait AssetCacheRepository: Send + Sync {
    fn next_generation_id(&self) -> AppResult<GenerationId>;
    fn insert_generation(&self, generation: &Generation) -> AppResult<()>;
    fn get_generation(&self, id: GenerationId) -> AppResult<Option<Generation>>;
    /// Oldest first
    fn list_generations(&self) -> AppResult<Vec<Generation>>;
    fn list_by_state(&self, state: GenerationState) -> AppResult<Vec<Generation>>;

    /// Store every fetched entry and persist the generation's new state.
    fn commit_install(&self, generation: &Generation, entries: &[CachedEntry]) -> AppResult<()>;

    /// Persist an activation: the new active generation plus every retired
    /// generation, whose entries are dropped.
    fn commit_activation(&self, activated: &Generation, retired: &[Generation]) -> AppResult<()>;

    /// Drop a generation's entries and persist its (deleted) state.
    fn discard_generation(&self, generation: &Generation) -> AppResult<()>;

    /// Insert or overwrite one entry
    fn put_entry(&self, entry: &CachedEntry) -> AppResult<()>;
    fn find_entry(&self, generation: GenerationId, request_key: &str) -> AppResult<Option<CachedEntry>>;
    /// Most recently stored entry whose URL matches ignoring the query string
    fn match_entry(&self, generation: GenerationId, match_key: &str) -> AppResult<Option<CachedEntry>>;
    fn entry_count(&self, generation: GenerationId) -> AppResult<u64>;
}

pub struct SqliteAssetCacheRepository {
    pool: Arc<ConnectionPool>,
}

const GENERATION_COLUMNS: &str = "id, manifest_digest, state, created_at, activated_at";
const ENTRY_COLUMNS: &str = "generation, request_key, match_key, status, headers, body, stored_at";

fn timestamp_to_sql(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteAssetCacheRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    fn row_to_generation(row: &Row) -> Result<Generation, rusqlite::Error> {
        let id: i64 = row.get("id")?;
        let state_str: String = row.get("state")?;
        let created_at_str: String = row.get("created_at")?;
        let activated_at_str: Option<String> = row.get("activated_at")?;

        let state = state_str.parse::<GenerationState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let activated_at = match activated_at_str {
            Some(raw) => Some(parse_timestamp(4, &raw)?),
            None => None,
        };

        Ok(Generation {
            id: GenerationId(id as u32),
            manifest_digest: row.get("manifest_digest")?,
            state,
            created_at: parse_timestamp(3, &created_at_str)?,
            activated_at,
        })
    }

    fn row_to_entry(row: &Row) -> Result<CachedEntry, rusqlite::Error> {
        let generation: i64 = row.get("generation")?;
        let status: i64 = row.get("status")?;
        let headers_json: String = row.get("headers")?;
        let stored_at_str: String = row.get("stored_at")?;

        let headers: Vec<(String, String)> = serde_json::from_str(&headers_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(CachedEntry {
            generation: GenerationId(generation as u32),
            request_key: row.get("request_key")?,
            match_key: row.get("match_key")?,
            status: status as u16,
            headers,
            body: row.get("body")?,
            stored_at: parse_timestamp(6, &stored_at_str)?,
        })
    }

    fn write_state(conn: &Connection, generation: &Generation) -> AppResult<()> {
        conn.execute(
            "UPDATE cache_generations SET state = ?1, activated_at = ?2 WHERE id = ?3",
            params![
                generation.state.as_str(),
                generation.activated_at.as_ref().map(timestamp_to_sql),
                generation.id.0,
            ],
        )?;
        Ok(())
    }

    fn write_entry(conn: &Connection, entry: &CachedEntry) -> AppResult<()> {
        let headers_json = serde_json::to_string(&entry.headers)?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries
                (generation, request_key, match_key, status, headers, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.generation.0,
                entry.request_key,
                entry.match_key,
                entry.status,
                headers_json,
                entry.body,
                timestamp_to_sql(&entry.stored_at),
            ],
        )?;
        Ok(())
    }

    fn drop_entries(conn: &Connection, generation: GenerationId) -> AppResult<()> {
        conn.execute(
            "DELETE FROM cache_entries WHERE generation = ?1",
            params![generation.0],
        )?;
        Ok(())
    }
}

impl AssetCacheRepository for SqliteAssetCacheRepository {
    fn next_generation_id(&self) -> AppResult<GenerationId> {
        let conn = self.pool.get()?;
        let max: Option<i64> =
            conn.query_row("SELECT MAX(id) FROM cache_generations", [], |row| row.get(0))?;
        Ok(GenerationId(max.unwrap_or(0) as u32).next())
    }

    fn insert_generation(&self, generation: &Generation) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO cache_generations (id, manifest_digest, state, created_at, activated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                generation.id.0,
                generation.manifest_digest,
                generation.state.as_str(),
                timestamp_to_sql(&generation.created_at),
                generation.activated_at.as_ref().map(timestamp_to_sql),
            ],
        )?;
        Ok(())
    }

    fn get_generation(&self, id: GenerationId) -> AppResult<Option<Generation>> {
        let conn = self.pool.get()?;
        let generation = conn
            .query_row(
                &format!("SELECT {} FROM cache_generations WHERE id = ?1", GENERATION_COLUMNS),
                params![id.0],
                Self::row_to_generation,
            )
            .optional()?;
        Ok(generation)
    }

    fn list_generations(&self) -> AppResult<Vec<Generation>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cache_generations ORDER BY id",
            GENERATION_COLUMNS
        ))?;
        let generations = stmt
            .query_map([], Self::row_to_generation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(generations)
    }

    fn list_by_state(&self, state: GenerationState) -> AppResult<Vec<Generation>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cache_generations WHERE state = ?1 ORDER BY id",
            GENERATION_COLUMNS
        ))?;
        let generations = stmt
            .query_map(params![state.as_str()], Self::row_to_generation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(generations)
    }

    fn commit_install(&self, generation: &Generation, entries: &[CachedEntry]) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for entry in entries {
            Self::write_entry(&tx, entry)?;
        }
        Self::write_state(&tx, generation)?;
        tx.commit()?;
        Ok(())
    }

    fn commit_activation(&self, activated: &Generation, retired: &[Generation]) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for generation in retired {
            Self::drop_entries(&tx, generation.id)?;
            Self::write_state(&tx, generation)?;
        }
        Self::write_state(&tx, activated)?;
        tx.commit()?;
        Ok(())
    }

    fn discard_generation(&self, generation: &Generation) -> AppResult<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        Self::drop_entries(&tx, generation.id)?;
        Self::write_state(&tx, generation)?;
        tx.commit()?;
        Ok(())
    }

    fn put_entry(&self, entry: &CachedEntry) -> AppResult<()> {
        let conn = self.pool.get()?;
        Self::write_entry(&conn, entry)
    }

    fn find_entry(&self, generation: GenerationId, request_key: &str) -> AppResult<Option<CachedEntry>> {
        let conn = self.pool.get()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM cache_entries WHERE generation = ?1 AND request_key = ?2",
                    ENTRY_COLUMNS
                ),
                params![generation.0, request_key],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn match_entry(&self, generation: GenerationId, match_key: &str) -> AppResult<Option<CachedEntry>> {
        let conn = self.pool.get()?;
        let entry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM cache_entries
                     WHERE generation = ?1 AND match_key = ?2
                     ORDER BY stored_at DESC, rowid DESC
                     LIMIT 1",
                    ENTRY_COLUMNS
                ),
                params![generation.0, match_key],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn entry_count(&self, generation: GenerationId) -> AppResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE generation = ?1",
            params![generation.0],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
