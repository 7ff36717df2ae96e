//! External content source: search for saved queries and fetch files.
//!
//! The queue engine and the request checker only see the [`ContentSearch`]
//! and [`ContentFetcher`] traits; [`HttpContentSource`] is the production
//! implementation talking to the upstream HTTP API.

mod client;
mod models;

pub use client::HttpContentSource;
pub use models::{FetchRequest, FetchedFile, SearchQuery, SearchResult};

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upstream responded with status {0}")]
    Status(u16),

    #[error("Not found upstream: {0}")]
    NotFound(String),

    #[error("Fingerprint {0:?} cannot be used as a file name")]
    InvalidFingerprint(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl SourceError {
    /// Returns true if this error should trigger an automatic retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SourceError::NotFound(_) | SourceError::InvalidFingerprint(_) | SourceError::Cancelled
        )
    }
}

#[async_trait]
pub trait ContentSearch: Send + Sync {
    /// Run a search. Results are in upstream relevance order.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SourceError>;
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Transfer one file.
    ///
    /// Implementations check `cancel` between chunks and return
    /// [`SourceError::Cancelled`] once it fires, leaving any partial file behind.
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<FetchedFile, SourceError>;
}
