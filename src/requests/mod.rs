//! Saved search requests and the checker that keeps re-running them.

mod checker;
mod manager;
mod models;
mod schema;
mod store;

pub use checker::{CheckOutcome, CheckerStatus, CycleOutcome, CycleSummary, RequestChecker};
pub use manager::RequestManager;
pub use models::*;
pub use schema::REQUESTS_VERSIONED_SCHEMAS;
pub use store::{RequestStore, SqliteRequestStore};
