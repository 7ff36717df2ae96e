use serde::Serialize;

use crate::download_queue::{DownloadCounts, DownloadRecord};
use crate::requests::{RequestCounts, SavedRequest};

/// Full state pushed to subscribers after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub downloads: Vec<DownloadRecord>,
    pub requests: Vec<SavedRequest>,
    pub download_counts: DownloadCounts,
    pub request_counts: RequestCounts,
    pub generated_at: i64,
}

/// Message carried on the update channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMessage {
    Snapshot(StateSnapshot),
    Heartbeat { timestamp: i64 },
}

impl UpdateMessage {
    /// SSE event name for this message.
    pub fn event_name(&self) -> &'static str {
        match self {
            UpdateMessage::Snapshot(_) => "snapshot",
            UpdateMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}
