//! Database schema for requests.db.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const SAVED_REQUESTS_TABLE_V0: Table = Table {
    name: "saved_requests",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        // JSON-encoded SearchQuery
        sqlite_column!("query_params", &SqlType::Text, non_null = true),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("last_checked_at", &SqlType::Integer),
        sqlite_column!("fulfilled_book_fingerprint", &SqlType::Text),
        sqlite_column!("fulfilled_at", &SqlType::Integer),
    ],
    indices: &[("idx_saved_requests_status", "status")],
};

pub const REQUESTS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[SAVED_REQUESTS_TABLE_V0],
    migration: None,
}];
