//! Download record storage and persistence.
//!
//! Provides SQLite-backed storage for download records. The store applies no
//! business policy: the queue engine decides every transition and writes the
//! whole record back.

use super::models::*;
use super::schema::DOWNLOADS_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{open_in_memory_db, open_versioned_db};
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for download record storage operations.
pub trait DownloadRecordStore: Send + Sync {
    /// Get a record by fingerprint.
    fn get(&self, fingerprint: &str) -> Result<Option<DownloadRecord>>;

    /// Insert or fully replace a record.
    fn upsert(&self, record: &DownloadRecord) -> Result<()>;

    /// Remove a record. Returns false if it did not exist.
    fn delete(&self, fingerprint: &str) -> Result<bool>;

    /// All records, oldest queued first.
    fn list_all(&self) -> Result<Vec<DownloadRecord>>;

    /// 1-based rank among queued and downloading records ordered by `queued_at`.
    ///
    /// Returns None if the record is absent or not in the queue.
    fn queue_position(&self, fingerprint: &str) -> Result<Option<usize>>;

    /// Oldest queued record that is eligible to run at `now`.
    fn next_queued(&self, now: i64) -> Result<Option<DownloadRecord>>;

    /// Move every `downloading` record back to `queued`. Returns the number moved.
    fn requeue_downloading(&self) -> Result<usize>;

    /// Number of records per status.
    fn count_by_status(&self) -> Result<DownloadCounts>;
}

/// SQLite-backed download record store.
pub struct SqliteDownloadRecordStore {
    conn: Arc<Mutex<Connection>>,
}

const IN_QUEUE_STATUSES: &str = "('queued', 'downloading')";

impl SqliteDownloadRecordStore {
    /// Open an existing database or create a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned_db(db_path, DOWNLOADS_VERSIONED_SCHEMAS, "downloads")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        let conn = open_in_memory_db(DOWNLOADS_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("downloads database mutex poisoned"))
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<DownloadRecord> {
        let status: String = row.get("status")?;
        let authors: String = row.get("authors")?;
        Ok(DownloadRecord {
            fingerprint: row.get("fingerprint")?,
            status: DownloadStatus::from_str(&status).unwrap_or(DownloadStatus::Error),
            metadata: BookMetadata {
                title: row.get("title")?,
                authors: serde_json::from_str(&authors).unwrap_or_default(),
                year: row.get("year")?,
                format: row.get("format")?,
            },
            queued_at: row.get("queued_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            next_attempt_at: row.get("next_attempt_at")?,
            temp_path: row.get("temp_path")?,
            final_path: row.get("final_path")?,
            retry_count: row.get("retry_count")?,
            last_error: row.get("last_error")?,
        })
    }
}

impl DownloadRecordStore for SqliteDownloadRecordStore {
    fn get(&self, fingerprint: &str) -> Result<Option<DownloadRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                "SELECT * FROM downloads WHERE fingerprint = ?1",
                [fingerprint],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn upsert(&self, record: &DownloadRecord) -> Result<()> {
        let authors = serde_json::to_string(&record.metadata.authors)?;
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO downloads (
                fingerprint, status, title, authors, year, format,
                queued_at, started_at, completed_at, temp_path, final_path,
                retry_count, last_error, next_attempt_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(fingerprint) DO UPDATE SET
                status = excluded.status,
                title = excluded.title,
                authors = excluded.authors,
                year = excluded.year,
                format = excluded.format,
                queued_at = excluded.queued_at,
                started_at = excluded.started_at,
                completed_at = excluded.completed_at,
                temp_path = excluded.temp_path,
                final_path = excluded.final_path,
                retry_count = excluded.retry_count,
                last_error = excluded.last_error,
                next_attempt_at = excluded.next_attempt_at"#,
            params![
                record.fingerprint,
                record.status.as_str(),
                record.metadata.title,
                authors,
                record.metadata.year,
                record.metadata.format,
                record.queued_at,
                record.started_at,
                record.completed_at,
                record.temp_path,
                record.final_path,
                record.retry_count,
                record.last_error,
                record.next_attempt_at,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, fingerprint: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM downloads WHERE fingerprint = ?1", [fingerprint])?;
        Ok(deleted > 0)
    }

    fn list_all(&self) -> Result<Vec<DownloadRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM downloads ORDER BY queued_at ASC, fingerprint ASC")?;
        let records = stmt
            .query_map([], Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn queue_position(&self, fingerprint: &str) -> Result<Option<usize>> {
        let conn = self.conn()?;
        // Ties on queued_at are broken by fingerprint so the order is total
        let position: i64 = conn.query_row(
            &format!(
                r#"SELECT COUNT(*) FROM downloads d,
                    (SELECT queued_at, fingerprint FROM downloads
                     WHERE fingerprint = ?1 AND status IN {statuses}) me
                WHERE d.status IN {statuses}
                  AND (d.queued_at < me.queued_at
                       OR (d.queued_at = me.queued_at AND d.fingerprint <= me.fingerprint))"#,
                statuses = IN_QUEUE_STATUSES
            ),
            [fingerprint],
            |row| row.get(0),
        )?;
        Ok((position > 0).then_some(position as usize))
    }

    fn next_queued(&self, now: i64) -> Result<Option<DownloadRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                r#"SELECT * FROM downloads
                   WHERE status = 'queued'
                     AND (next_attempt_at IS NULL OR next_attempt_at <= ?1)
                   ORDER BY queued_at ASC, fingerprint ASC
                   LIMIT 1"#,
                [now],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn requeue_downloading(&self) -> Result<usize> {
        let conn = self.conn()?;
        let moved = conn.execute(
            "UPDATE downloads SET status = 'queued', started_at = NULL WHERE status = 'downloading'",
            [],
        )?;
        Ok(moved)
    }

    fn count_by_status(&self) -> Result<DownloadCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM downloads GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = DownloadCounts::default();
        for (status, count) in rows {
            if let Some(status) = DownloadStatus::from_str(&status) {
                counts.add(status, count as usize);
            }
        }
        Ok(counts)
    }
}
