//! Best-effort notifications to an external party.
//!
//! Delivery failures are logged and swallowed by [`NotificationService`];
//! they never affect queue or request state.

mod models;
mod service;
mod webhook;

pub use models::{
    DownloadFinishedData, Notification, NotificationType, RequestFulfilledData,
};
pub use service::NotificationService;
pub use webhook::WebhookNotifier;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("Receiver responded with status {0}")]
    Rejected(u16),
}

/// Transport for notifications (webhook, push, email...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Notifier used when no transport is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotificationError> {
        Ok(())
    }
}
