//! Download queue.
//!
//! Admits book fingerprints into a persistent FIFO queue and drives each
//! record through `queued -> downloading -> available | error`, with client
//! cancel, retry and delete on top.

mod engine;
mod models;
mod record_store;
mod retry_policy;
mod schema;
mod worker;

pub use engine::QueueEngine;
pub use models::*;
pub use record_store::{DownloadRecordStore, SqliteDownloadRecordStore};
pub use retry_policy::RetryPolicy;
pub use schema::DOWNLOADS_VERSIONED_SCHEMAS;
pub use worker::QueueWorker;
