//! Notification service for building and dispatching notifications

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::models::{Notification, NotificationType};
use super::Notifier;

/// Builds notifications and hands them to the configured transport.
///
/// Each delivery runs on its own task, so a slow or hanging receiver never
/// holds up the caller.
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    deliveries: TaskTracker,
}

impl NotificationService {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            deliveries: TaskTracker::new(),
        }
    }

    /// Queue a notification for delivery and return immediately.
    ///
    /// Never fails: serialization and transport errors are logged and dropped.
    /// Must be called from within a tokio runtime.
    pub fn notify<D: Serialize>(
        &self,
        notification_type: NotificationType,
        title: impl Into<String>,
        data: &D,
    ) {
        let data = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to serialize {:?} notification: {}", notification_type, err);
                return;
            }
        };

        let notification = Notification {
            notification_type,
            title: title.into(),
            data,
            created_at: crate::now_millis(),
        };

        let notifier = self.notifier.clone();
        self.deliveries.spawn(async move {
            match notifier.notify(&notification).await {
                Ok(()) => debug!("Sent {:?} notification", notification_type),
                Err(err) => warn!(
                    "Failed to send {:?} notification '{}': {}",
                    notification_type, notification.title, err
                ),
            }
        });
    }

    /// Number of deliveries still running.
    pub fn pending(&self) -> usize {
        self.deliveries.len()
    }

    /// Wait up to `timeout` for running deliveries to finish.
    ///
    /// Returns false if some were still running when the timeout expired.
    /// New notifications can be sent again once this returns.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.deliveries.close();
        let finished = tokio::time::timeout(timeout, self.deliveries.wait())
            .await
            .is_ok();
        self.deliveries.reopen();
        finished
    }
}
