//! Types exchanged with the external content source.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::download_queue::BookMetadata;

/// A saved search, as sent to the content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            author: None,
            format: None,
            language: None,
        }
    }

    /// Query parameters for the upstream search endpoint.
    pub fn to_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("q", self.query.as_str())];
        if let Some(author) = &self.author {
            params.push(("author", author));
        }
        if let Some(format) = &self.format {
            params.push(("format", format));
        }
        if let Some(language) = &self.language {
            params.push(("lang", language));
        }
        params
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub fingerprint: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub format: Option<String>,
}

impl SearchResult {
    pub fn metadata(&self) -> BookMetadata {
        BookMetadata {
            title: self.title.clone(),
            authors: self.authors.clone(),
            year: self.year,
            format: self.format.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// What the worker asks the fetcher for.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub fingerprint: String,
    pub format: Option<String>,
}

/// Where a completed transfer landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
    pub bytes: u64,
}
