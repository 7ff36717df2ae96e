//! Database schema for downloads.db.

use anyhow::Result;
use rusqlite::Connection;

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 0
// =============================================================================

const DOWNLOADS_TABLE_V0: Table = Table {
    name: "downloads",
    columns: &[
        sqlite_column!("fingerprint", &SqlType::Text, is_primary_key = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        // JSON array of author names
        sqlite_column!("authors", &SqlType::Text, non_null = true, default_value = Some("'[]'")),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("format", &SqlType::Text),
        sqlite_column!("queued_at", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer),
        sqlite_column!("completed_at", &SqlType::Integer),
        sqlite_column!("temp_path", &SqlType::Text),
        sqlite_column!("final_path", &SqlType::Text),
        sqlite_column!("retry_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("last_error", &SqlType::Text),
    ],
    indices: &[("idx_downloads_status_queued_at", "status, queued_at")],
};

// =============================================================================
// Version 1 - backoff for automatic re-queue
// =============================================================================

const DOWNLOADS_TABLE_V1: Table = Table {
    name: "downloads",
    columns: &[
        sqlite_column!("fingerprint", &SqlType::Text, is_primary_key = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("title", &SqlType::Text),
        sqlite_column!("authors", &SqlType::Text, non_null = true, default_value = Some("'[]'")),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("format", &SqlType::Text),
        sqlite_column!("queued_at", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer),
        sqlite_column!("completed_at", &SqlType::Integer),
        sqlite_column!("temp_path", &SqlType::Text),
        sqlite_column!("final_path", &SqlType::Text),
        sqlite_column!("retry_count", &SqlType::Integer, non_null = true, default_value = Some("0")),
        sqlite_column!("last_error", &SqlType::Text),
        sqlite_column!("next_attempt_at", &SqlType::Integer),
    ],
    indices: &[("idx_downloads_status_queued_at", "status, queued_at")],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE downloads ADD COLUMN next_attempt_at INTEGER", [])?;
    Ok(())
}

pub const DOWNLOADS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[DOWNLOADS_TABLE_V0],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[DOWNLOADS_TABLE_V1],
        migration: Some(migrate_v0_to_v1),
    },
];
