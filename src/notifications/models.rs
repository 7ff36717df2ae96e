//! Notification data models

use serde::{Deserialize, Serialize};

/// Notification type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A saved request matched and its result was queued
    RequestFulfilled,
    DownloadCompleted,
    /// A transfer failed and will not be retried automatically
    DownloadFailed,
}

/// A notification handed to the external notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_type: NotificationType,
    pub title: String,
    pub data: serde_json::Value,
    pub created_at: i64,
}

/// Data payload for RequestFulfilled notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFulfilledData {
    pub request_id: i64,
    pub query: String,
    pub fingerprint: String,
    pub title: Option<String>,
    /// Queue position at fulfilment, absent if the book was already downloaded
    pub queue_position: Option<usize>,
}

/// Data payload for DownloadCompleted and DownloadFailed notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadFinishedData {
    pub fingerprint: String,
    pub title: Option<String>,
    pub final_path: Option<String>,
    pub error: Option<String>,
    pub retry_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_serialization() {
        let serialized = serde_json::to_string(&NotificationType::RequestFulfilled).unwrap();
        assert_eq!(serialized, "\"request_fulfilled\"");

        let deserialized: NotificationType = serde_json::from_str("\"download_failed\"").unwrap();
        assert_eq!(deserialized, NotificationType::DownloadFailed);
    }

    #[test]
    fn test_notification_serialization() {
        let notification = Notification {
            notification_type: NotificationType::DownloadCompleted,
            title: "Book ready".to_string(),
            data: serde_json::json!({ "fingerprint": "abc" }),
            created_at: 1_700_000_000_000,
        };

        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["notification_type"], "download_completed");
        assert_eq!(json["data"]["fingerprint"], "abc");
    }
}
