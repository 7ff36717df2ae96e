//! Shelfwatch Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod content_source;
pub mod download_queue;
pub mod error;
pub mod notifications;
pub mod requests;
pub mod server;
pub mod sqlite_persistence;
pub mod updates;

// Re-export commonly used types for convenience
pub use error::{ServiceError, ServiceResult};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerState};

/// Current time as Unix milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
