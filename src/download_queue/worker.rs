//! Background worker that drains the download queue.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::engine::QueueEngine;

/// Processes one queued record at a time, oldest first.
///
/// Runs in a loop:
/// 1. Process records until none is eligible
/// 2. Sleep until woken by an enqueue, the poll interval elapses, or shutdown
///
/// The poll interval picks up records whose retry backoff has expired.
pub struct QueueWorker {
    engine: Arc<QueueEngine>,
    poll_interval: Duration,
}

impl QueueWorker {
    pub fn new(engine: Arc<QueueEngine>, poll_interval_secs: u64) -> Self {
        Self {
            engine,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    /// Main processing loop - call from a spawned task.
    ///
    /// A transfer still running at shutdown is dropped; its record stays
    /// `downloading` and is recovered on the next start.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Queue worker starting (poll_interval={}s)",
            self.poll_interval.as_secs()
        );

        loop {
            let processed = tokio::select! {
                result = self.engine.process_next() => match result {
                    Ok(processed) => processed,
                    Err(e) => {
                        error!("Queue worker failed to process next record: {}", e);
                        false
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Queue worker shutting down");
                    break;
                }
            };

            if processed {
                continue;
            }

            tokio::select! {
                _ = self.engine.work_available() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.cancelled() => {
                    info!("Queue worker shutting down while idle");
                    break;
                }
            }
        }

        info!("Queue worker stopped");
    }
}
