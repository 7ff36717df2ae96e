//! Data models for the download queue.
//!
//! Defines download records, their statuses and the outcomes returned by
//! queue operations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a download record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Available,
    Done,
    Error,
    Cancelled,
}

impl DownloadStatus {
    pub const ALL: [DownloadStatus; 6] = [
        DownloadStatus::Queued,
        DownloadStatus::Downloading,
        DownloadStatus::Available,
        DownloadStatus::Done,
        DownloadStatus::Error,
        DownloadStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Available => "available",
            DownloadStatus::Done => "done",
            DownloadStatus::Error => "error",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(DownloadStatus::Queued),
            "downloading" => Some(DownloadStatus::Downloading),
            "available" => Some(DownloadStatus::Available),
            "done" => Some(DownloadStatus::Done),
            "error" => Some(DownloadStatus::Error),
            "cancelled" => Some(DownloadStatus::Cancelled),
            _ => None,
        }
    }

    /// Queued or downloading: the record holds a queue position.
    pub fn is_in_queue(&self) -> bool {
        matches!(self, DownloadStatus::Queued | DownloadStatus::Downloading)
    }

    /// The file has been fetched at least once.
    pub fn is_downloaded(&self) -> bool {
        matches!(self, DownloadStatus::Available | DownloadStatus::Done)
    }

    /// States from which a manual retry is allowed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DownloadStatus::Error | DownloadStatus::Cancelled)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive metadata copied into a record at enqueue time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// File format, e.g. "epub"
    #[serde(default)]
    pub format: Option<String>,
}

/// Longest accepted file format, e.g. "epub" or "djvu".
pub const MAX_FORMAT_LEN: usize = 10;

/// Fingerprints name files on disk, so only ASCII letters and digits are accepted.
pub fn is_valid_fingerprint(fingerprint: &str) -> bool {
    !fingerprint.is_empty() && fingerprint.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Formats become file extensions.
pub fn is_valid_format(format: &str) -> bool {
    (1..=MAX_FORMAT_LEN).contains(&format.len())
        && format.chars().all(|c| c.is_ascii_alphanumeric())
}

/// A single download, keyed by content fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadRecord {
    pub fingerprint: String,
    pub status: DownloadStatus,
    #[serde(flatten)]
    pub metadata: BookMetadata,
    /// When the record (re-)entered the queue, Unix millis
    pub queued_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Earliest time the worker may pick this record after an automatic re-queue
    pub next_attempt_at: Option<i64>,
    pub temp_path: Option<String>,
    pub final_path: Option<String>,
    pub retry_count: i32,
    pub last_error: Option<String>,
}

impl DownloadRecord {
    /// A fresh queued record.
    pub fn new_queued(fingerprint: String, metadata: BookMetadata, queued_at: i64) -> Self {
        Self {
            fingerprint,
            status: DownloadStatus::Queued,
            metadata,
            queued_at,
            started_at: None,
            completed_at: None,
            next_attempt_at: None,
            temp_path: None,
            final_path: None,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Short human readable label for logs.
    pub fn display_name(&self) -> &str {
        self.metadata.title.as_deref().unwrap_or(&self.fingerprint)
    }
}

/// Result of an enqueue attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AddToQueueOutcome {
    Queued { position: usize },
    AlreadyInQueue { position: usize },
    AlreadyDownloaded { final_path: Option<String> },
}

impl AddToQueueOutcome {
    pub fn position(&self) -> Option<usize> {
        match self {
            AddToQueueOutcome::Queued { position }
            | AddToQueueOutcome::AlreadyInQueue { position } => Some(*position),
            AddToQueueOutcome::AlreadyDownloaded { .. } => None,
        }
    }
}

/// Result of a successful manual retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryOutcome {
    pub status: DownloadStatus,
    pub position: usize,
}

/// Number of records per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadCounts {
    pub queued: usize,
    pub downloading: usize,
    pub available: usize,
    pub done: usize,
    pub error: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl DownloadCounts {
    pub fn add(&mut self, status: DownloadStatus, count: usize) {
        let slot = match status {
            DownloadStatus::Queued => &mut self.queued,
            DownloadStatus::Downloading => &mut self.downloading,
            DownloadStatus::Available => &mut self.available,
            DownloadStatus::Done => &mut self.done,
            DownloadStatus::Error => &mut self.error,
            DownloadStatus::Cancelled => &mut self.cancelled,
        };
        *slot += count;
        self.total += count;
    }
}
