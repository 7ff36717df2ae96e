//! HTTP client for the upstream content source.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::models::{FetchRequest, FetchedFile, SearchQuery, SearchResponse, SearchResult};
use super::{ContentFetcher, ContentSearch, SourceError};
use crate::download_queue::{is_valid_fingerprint, is_valid_format};

/// Client for the upstream search and download endpoints.
///
/// - `GET {base_url}/search?q=...` returns `{"results": [...]}`
/// - `GET {base_url}/download/{fingerprint}` streams the file body
#[derive(Clone)]
pub struct HttpContentSource {
    client: Client,
    base_url: String,
    temp_dir: PathBuf,
    library_dir: PathBuf,
}

impl HttpContentSource {
    /// # Arguments
    /// * `base_url` - Base URL of the content source (e.g., "http://localhost:8080")
    /// * `timeout_secs` - Request timeout in seconds
    /// * `temp_dir` - Directory for in-progress transfers
    /// * `library_dir` - Directory completed files are moved into
    pub fn new(
        base_url: String,
        timeout_secs: u64,
        temp_dir: PathBuf,
        library_dir: PathBuf,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            temp_dir,
            library_dir,
        })
    }

    /// Library path for a validated fingerprint. Unusable formats fall back to "bin".
    fn final_path_for(&self, request: &FetchRequest) -> PathBuf {
        let extension = request
            .format
            .as_deref()
            .filter(|format| is_valid_format(format))
            .unwrap_or("bin");
        self.library_dir
            .join(format!("{}.{}", request.fingerprint, extension))
    }
}

#[async_trait]
impl ContentSearch for HttpContentSource {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, SourceError> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&query.to_params())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::Status(response.status().as_u16()));
        }

        let search_response: SearchResponse = response.json().await?;
        debug!(
            "Search '{}' returned {} results",
            query.query,
            search_response.results.len()
        );
        Ok(search_response.results)
    }
}

#[async_trait]
impl ContentFetcher for HttpContentSource {
    async fn fetch(
        &self,
        request: &FetchRequest,
        cancel: CancellationToken,
    ) -> Result<FetchedFile, SourceError> {
        if !is_valid_fingerprint(&request.fingerprint) {
            return Err(SourceError::InvalidFingerprint(request.fingerprint.clone()));
        }
        let url = format!("{}/download/{}", self.base_url, request.fingerprint);
        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(SourceError::NotFound(request.fingerprint.clone())),
            status if !status.is_success() => return Err(SourceError::Status(status.as_u16())),
            _ => {}
        }

        fs::create_dir_all(&self.temp_dir).await?;
        let temp_path = self.temp_dir.join(format!("{}.part", request.fingerprint));
        let mut file = fs::File::create(&temp_path).await?;

        let mut bytes = 0u64;
        let mut body = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Transfer of {} cancelled after {} bytes", request.fingerprint, bytes);
                    return Err(SourceError::Cancelled);
                }
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    file.write_all(&chunk).await?;
                    bytes += chunk.len() as u64;
                }
                None => break,
            }
        }
        file.flush().await?;
        drop(file);

        let final_path = self.final_path_for(request);
        move_into_library(&temp_path, &final_path).await?;
        info!(
            "Fetched {} ({} bytes) into {:?}",
            request.fingerprint, bytes, final_path
        );

        Ok(FetchedFile {
            temp_path,
            final_path,
            bytes,
        })
    }
}

async fn move_into_library(temp_path: &Path, final_path: &Path) -> std::io::Result<()> {
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::rename(temp_path, final_path).await
}
