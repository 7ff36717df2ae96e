//! Saved request storage and persistence.

use super::models::*;
use super::schema::REQUESTS_VERSIONED_SCHEMAS;
use crate::content_source::SearchQuery;
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for saved request storage operations.
pub trait RequestStore: Send + Sync {
    /// Insert a new active request and return it with its assigned id.
    fn create(&self, query: &SearchQuery, created_at: i64) -> Result<SavedRequest>;

    fn get(&self, id: i64) -> Result<Option<SavedRequest>>;

    /// All requests in creation order.
    fn list_all(&self) -> Result<Vec<SavedRequest>>;

    /// Active requests in creation order.
    fn list_active(&self) -> Result<Vec<SavedRequest>>;

    /// Id of an active request with exactly these query parameters, if any.
    fn find_active_by_query(&self, query: &SearchQuery) -> Result<Option<i64>>;

    /// Write back every mutable field of `request`. Returns false if the row is gone.
    fn update(&self, request: &SavedRequest) -> Result<bool>;

    /// Touch `last_checked_at` only. Returns false if the row is gone.
    fn set_last_checked(&self, id: i64, checked_at: i64) -> Result<bool>;

    fn delete(&self, id: i64) -> Result<bool>;

    fn count_by_status(&self) -> Result<RequestCounts>;
}

/// SQLite-backed saved request store.
pub struct SqliteRequestStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRequestStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, REQUESTS_VERSIONED_SCHEMAS, "requests")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(REQUESTS_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("requests database mutex poisoned"))
    }

    fn row_to_request(row: &rusqlite::Row) -> rusqlite::Result<SavedRequest> {
        let query_json: String = row.get("query_params")?;
        let query_params = serde_json::from_str(&query_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let status: String = row.get("status")?;
        Ok(SavedRequest {
            id: row.get("id")?,
            query_params,
            status: RequestStatus::from_str(&status).unwrap_or(RequestStatus::Cancelled),
            created_at: row.get("created_at")?,
            last_checked_at: row.get("last_checked_at")?,
            fulfilled_book_fingerprint: row.get("fulfilled_book_fingerprint")?,
            fulfilled_at: row.get("fulfilled_at")?,
        })
    }

    fn query_requests(&self, sql: &str) -> Result<Vec<SavedRequest>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let requests = stmt
            .query_map([], Self::row_to_request)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(requests)
    }
}

impl RequestStore for SqliteRequestStore {
    fn create(&self, query: &SearchQuery, created_at: i64) -> Result<SavedRequest> {
        let query_json = serde_json::to_string(query).context("Failed to encode query")?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO saved_requests (query_params, status, created_at) VALUES (?1, ?2, ?3)",
            params![query_json, RequestStatus::Active.as_str(), created_at],
        )?;
        Ok(SavedRequest {
            id: conn.last_insert_rowid(),
            query_params: query.clone(),
            status: RequestStatus::Active,
            created_at,
            last_checked_at: None,
            fulfilled_book_fingerprint: None,
            fulfilled_at: None,
        })
    }

    fn get(&self, id: i64) -> Result<Option<SavedRequest>> {
        let conn = self.conn()?;
        let request = conn
            .query_row(
                "SELECT * FROM saved_requests WHERE id = ?1",
                [id],
                Self::row_to_request,
            )
            .optional()?;
        Ok(request)
    }

    fn list_all(&self) -> Result<Vec<SavedRequest>> {
        self.query_requests("SELECT * FROM saved_requests ORDER BY id ASC")
    }

    fn list_active(&self) -> Result<Vec<SavedRequest>> {
        self.query_requests("SELECT * FROM saved_requests WHERE status = 'active' ORDER BY id ASC")
    }

    fn find_active_by_query(&self, query: &SearchQuery) -> Result<Option<i64>> {
        let query_json = serde_json::to_string(query)?;
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM saved_requests WHERE status = 'active' AND query_params = ?1 LIMIT 1",
                [query_json],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn update(&self, request: &SavedRequest) -> Result<bool> {
        let query_json = serde_json::to_string(&request.query_params)?;
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"UPDATE saved_requests SET
                query_params = ?2,
                status = ?3,
                last_checked_at = ?4,
                fulfilled_book_fingerprint = ?5,
                fulfilled_at = ?6
            WHERE id = ?1"#,
            params![
                request.id,
                query_json,
                request.status.as_str(),
                request.last_checked_at,
                request.fulfilled_book_fingerprint,
                request.fulfilled_at,
            ],
        )?;
        Ok(updated > 0)
    }

    fn set_last_checked(&self, id: i64, checked_at: i64) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE saved_requests SET last_checked_at = ?2 WHERE id = ?1",
            params![id, checked_at],
        )?;
        Ok(updated > 0)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM saved_requests WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    fn count_by_status(&self) -> Result<RequestCounts> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM saved_requests GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = RequestCounts::default();
        for (status, count) in rows {
            if let Some(status) = RequestStatus::from_str(&status) {
                counts.add(status, count as usize);
            }
        }
        Ok(counts)
    }
}
