//! Snapshot broadcaster.
//!
//! Every mutating queue or request operation calls [`UpdateBroadcaster::publish`]
//! once it has written to the store. The broadcaster re-reads both stores and
//! sends the whole state to every subscriber. Subscribers never receive diffs,
//! so a lagging receiver only needs the next message to be up to date again.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::snapshot::{StateSnapshot, UpdateMessage};
use crate::download_queue::DownloadRecordStore;
use crate::requests::RequestStore;

/// Capacity of the broadcast channel.
///
/// Snapshots are self-contained, so a receiver that lags past this many
/// messages just skips ahead.
const CHANNEL_CAPACITY: usize = 64;

/// A new subscription: the state at subscribe time plus the live channel.
pub struct Subscription {
    pub initial: StateSnapshot,
    pub receiver: broadcast::Receiver<UpdateMessage>,
}

pub struct UpdateBroadcaster {
    downloads: Arc<dyn DownloadRecordStore>,
    requests: Arc<dyn RequestStore>,
    sender: broadcast::Sender<UpdateMessage>,
}

impl UpdateBroadcaster {
    pub fn new(downloads: Arc<dyn DownloadRecordStore>, requests: Arc<dyn RequestStore>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            downloads,
            requests,
            sender,
        }
    }

    /// Read the current full state from both stores.
    pub fn snapshot(&self) -> Result<StateSnapshot> {
        Ok(StateSnapshot {
            downloads: self.downloads.list_all()?,
            requests: self.requests.list_all()?,
            download_counts: self.downloads.count_by_status()?,
            request_counts: self.requests.count_by_status()?,
            generated_at: crate::now_millis(),
        })
    }

    /// Publish the current state to all subscribers.
    ///
    /// Never fails: a snapshot that cannot be built is logged and skipped.
    pub fn publish(&self) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        match self.snapshot() {
            Ok(snapshot) => {
                let receivers = self.sender.send(UpdateMessage::Snapshot(snapshot)).unwrap_or(0);
                debug!("Published snapshot to {} subscribers", receivers);
            }
            Err(err) => warn!("Failed to build state snapshot: {}", err),
        }
    }

    /// Subscribe to updates.
    ///
    /// The receiver is registered before the initial snapshot is read, so
    /// no mutation can fall between the two.
    pub fn subscribe(&self) -> Result<Subscription> {
        let receiver = self.sender.subscribe();
        let initial = self.snapshot()?;
        Ok(Subscription { initial, receiver })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Send one heartbeat.
    pub fn heartbeat(&self) {
        let _ = self.sender.send(UpdateMessage::Heartbeat {
            timestamp: crate::now_millis(),
        });
    }

    /// Send a heartbeat every `interval` until `shutdown` fires.
    pub async fn run_heartbeat(&self, interval: Duration, shutdown: CancellationToken) {
        info!("Heartbeat starting (interval={}s)", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.heartbeat(),
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Heartbeat stopped");
    }
}
