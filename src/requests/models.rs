//! Data models for saved requests.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content_source::SearchQuery;

/// Lifecycle status of a saved request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Active,
    Fulfilled, // terminal
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Active => "active",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RequestStatus::Active),
            "fulfilled" => Some(RequestStatus::Fulfilled),
            "cancelled" => Some(RequestStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search the user asked us to keep re-running until it matches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedRequest {
    pub id: i64,
    pub query_params: SearchQuery,
    pub status: RequestStatus,
    pub created_at: i64,
    pub last_checked_at: Option<i64>,
    pub fulfilled_book_fingerprint: Option<String>,
    pub fulfilled_at: Option<i64>,
}

/// Number of saved requests per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestCounts {
    pub active: usize,
    pub fulfilled: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl RequestCounts {
    pub fn add(&mut self, status: RequestStatus, count: usize) {
        match status {
            RequestStatus::Active => self.active += count,
            RequestStatus::Fulfilled => self.fulfilled += count,
            RequestStatus::Cancelled => self.cancelled += count,
        }
        self.total += count;
    }
}
