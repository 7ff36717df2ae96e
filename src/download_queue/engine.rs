//! Queue engine: admission control, ordering and the transfer state machine.
//!
//! All decisions read the record store fresh. Read-modify-write sections are
//! serialized by `mutations`, which is never held across an await, so a
//! cancel arriving while the worker is mid-transfer is seen when the worker
//! re-reads the record afterwards.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::models::*;
use super::record_store::DownloadRecordStore;
use super::retry_policy::RetryPolicy;
use crate::content_source::{ContentFetcher, FetchRequest, FetchedFile, SourceError};
use crate::error::{ServiceError, ServiceResult};
use crate::notifications::{DownloadFinishedData, NotificationService, NotificationType};
use crate::updates::UpdateBroadcaster;

/// The transfer currently owned by the worker.
struct InFlight {
    fingerprint: String,
    cancel: CancellationToken,
}

/// What happened to a record after its transfer returned.
enum TransferOutcome {
    Completed(DownloadRecord),
    Failed { record: DownloadRecord, error: SourceError },
    Abandoned,
}

pub struct QueueEngine {
    store: Arc<dyn DownloadRecordStore>,
    fetcher: Arc<dyn ContentFetcher>,
    updates: Arc<UpdateBroadcaster>,
    notifications: Arc<NotificationService>,
    retry_policy: RetryPolicy,
    mutations: Mutex<()>,
    in_flight: Mutex<Option<InFlight>>,
    work_available: Notify,
}

impl QueueEngine {
    pub fn new(
        store: Arc<dyn DownloadRecordStore>,
        fetcher: Arc<dyn ContentFetcher>,
        updates: Arc<UpdateBroadcaster>,
        notifications: Arc<NotificationService>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            fetcher,
            updates,
            notifications,
            retry_policy,
            mutations: Mutex::new(()),
            in_flight: Mutex::new(None),
            work_available: Notify::new(),
        }
    }

    fn lock_mutations(&self) -> ServiceResult<MutexGuard<'_, ()>> {
        self.mutations
            .lock()
            .map_err(|_| anyhow!("queue mutation lock poisoned").into())
    }

    fn position_of(&self, fingerprint: &str) -> ServiceResult<usize> {
        let position = self
            .store
            .queue_position(fingerprint)?
            .with_context(|| format!("{} is not in the queue", fingerprint))?;
        Ok(position)
    }

    // =========================================================================
    // Client operations
    // =========================================================================

    /// Admit a fingerprint into the queue.
    pub fn add_to_queue(
        &self,
        fingerprint: &str,
        metadata: BookMetadata,
    ) -> ServiceResult<AddToQueueOutcome> {
        let fingerprint = fingerprint.trim();
        if fingerprint.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "fingerprint must not be empty".to_string(),
            ));
        }
        if !is_valid_fingerprint(fingerprint) {
            return Err(ServiceError::InvalidRequest(format!(
                "fingerprint {:?} must contain only ASCII letters and digits",
                fingerprint
            )));
        }
        if let Some(format) = metadata.format.as_deref() {
            if !is_valid_format(format) {
                return Err(ServiceError::InvalidRequest(format!(
                    "format {:?} must be 1 to {} ASCII letters or digits",
                    format, MAX_FORMAT_LEN
                )));
            }
        }

        let position = {
            let _guard = self.lock_mutations()?;
            if let Some(existing) = self.store.get(fingerprint)? {
                if existing.status.is_downloaded() {
                    debug!("{} already downloaded", fingerprint);
                    return Ok(AddToQueueOutcome::AlreadyDownloaded {
                        final_path: existing.final_path,
                    });
                }
                if existing.status.is_in_queue() {
                    let position = self.position_of(fingerprint)?;
                    debug!("{} already in queue at position {}", fingerprint, position);
                    return Ok(AddToQueueOutcome::AlreadyInQueue { position });
                }
            }

            let record =
                DownloadRecord::new_queued(fingerprint.to_string(), metadata, crate::now_millis());
            self.store.upsert(&record)?;
            let position = self.position_of(fingerprint)?;
            info!(
                "Queued download: {} ({}) at position {}",
                record.display_name(),
                fingerprint,
                position
            );
            position
        };

        self.work_available.notify_one();
        self.updates.publish();
        Ok(AddToQueueOutcome::Queued { position })
    }

    /// Cancel a queued or in-flight download. Returns false if there was nothing to cancel.
    pub fn cancel_download(&self, fingerprint: &str) -> ServiceResult<bool> {
        {
            let _guard = self.lock_mutations()?;
            let Some(mut record) = self.store.get(fingerprint)? else {
                return Ok(false);
            };
            if !record.status.is_in_queue() {
                debug!("Not cancelling {}: status is {}", fingerprint, record.status);
                return Ok(false);
            }
            let previous = record.status;
            record.status = DownloadStatus::Cancelled;
            record.next_attempt_at = None;
            self.store.upsert(&record)?;
            info!("Cancelled download {} (was {})", fingerprint, previous);
        }

        self.signal_in_flight(fingerprint);
        self.updates.publish();
        Ok(true)
    }

    /// Put a failed or cancelled download back at the end of the queue.
    pub fn retry_download(&self, fingerprint: &str) -> ServiceResult<RetryOutcome> {
        let position = {
            let _guard = self.lock_mutations()?;
            let mut record = self
                .store
                .get(fingerprint)?
                .ok_or_else(|| ServiceError::NotFound(format!("download {}", fingerprint)))?;
            if !record.status.is_retryable() {
                return Err(ServiceError::invalid_transition(
                    record.status,
                    "error or cancelled",
                ));
            }

            record.status = DownloadStatus::Queued;
            record.queued_at = crate::now_millis();
            record.retry_count = 0;
            record.started_at = None;
            record.next_attempt_at = None;
            record.last_error = None;
            self.store.upsert(&record)?;
            let position = self.position_of(fingerprint)?;
            info!("Retrying download {} at position {}", fingerprint, position);
            position
        };

        self.work_available.notify_one();
        self.updates.publish();
        Ok(RetryOutcome {
            status: DownloadStatus::Queued,
            position,
        })
    }

    /// Permanently remove a record in any status. Files on disk are left alone.
    pub fn delete_download(&self, fingerprint: &str) -> ServiceResult<bool> {
        let deleted = {
            let _guard = self.lock_mutations()?;
            self.store.delete(fingerprint)?
        };
        if !deleted {
            return Ok(false);
        }

        info!("Deleted download record {}", fingerprint);
        self.signal_in_flight(fingerprint);
        self.updates.publish();
        Ok(true)
    }

    pub fn get_download(&self, fingerprint: &str) -> ServiceResult<DownloadRecord> {
        self.store
            .get(fingerprint)?
            .ok_or_else(|| ServiceError::NotFound(format!("download {}", fingerprint)))
    }

    pub fn list_downloads(&self) -> ServiceResult<Vec<DownloadRecord>> {
        Ok(self.store.list_all()?)
    }

    /// Return records left `downloading` by a previous process to the queue.
    pub fn recover_interrupted(&self) -> ServiceResult<usize> {
        let moved = {
            let _guard = self.lock_mutations()?;
            self.store.requeue_downloading()?
        };
        if moved > 0 {
            warn!("Re-queued {} downloads interrupted by a restart", moved);
            self.work_available.notify_one();
            self.updates.publish();
        }
        Ok(moved)
    }

    // =========================================================================
    // Worker side
    // =========================================================================

    /// Wait until something may have become eligible for processing.
    pub async fn work_available(&self) {
        self.work_available.notified().await
    }

    /// Run the oldest eligible queued record through one transfer.
    ///
    /// Returns false if nothing was eligible.
    pub async fn process_next(&self) -> ServiceResult<bool> {
        let (record, cancel) = {
            let _guard = self.lock_mutations()?;
            let now = crate::now_millis();
            let Some(mut record) = self.store.next_queued(now)? else {
                return Ok(false);
            };
            record.status = DownloadStatus::Downloading;
            record.started_at = Some(now);
            record.next_attempt_at = None;
            self.store.upsert(&record)?;

            let cancel = CancellationToken::new();
            self.set_in_flight(Some(InFlight {
                fingerprint: record.fingerprint.clone(),
                cancel: cancel.clone(),
            }));
            (record, cancel)
        };
        self.updates.publish();
        info!(
            "Starting download of {} ({}), attempt {}",
            record.display_name(),
            record.fingerprint,
            record.retry_count + 1
        );

        let request = FetchRequest {
            fingerprint: record.fingerprint.clone(),
            format: record.metadata.format.clone(),
        };
        let result = self.fetcher.fetch(&request, cancel).await;
        self.set_in_flight(None);

        let outcome = match self.settle_transfer(&record.fingerprint, result) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.release_unsettled(&record.fingerprint);
                return Err(err);
            }
        };
        match outcome {
            TransferOutcome::Completed(record) => {
                self.updates.publish();
                self.notify_finished(NotificationType::DownloadCompleted, &record);
            }
            TransferOutcome::Failed { record, error } => {
                self.updates.publish();
                self.handle_failure(record, error)?;
            }
            TransferOutcome::Abandoned => {}
        }
        Ok(true)
    }

    /// Put a record whose transfer result could not be stored back in the
    /// queue, so it is not left `downloading` until the next restart.
    fn release_unsettled(&self, fingerprint: &str) {
        let released = self.lock_mutations().and_then(|_guard| {
            let Some(mut record) = self.store.get(fingerprint)? else {
                return Ok(false);
            };
            if record.status != DownloadStatus::Downloading {
                return Ok(false);
            }
            record.status = DownloadStatus::Queued;
            record.started_at = None;
            record.next_attempt_at = Some(
                self.retry_policy
                    .next_attempt_at(crate::now_millis(), record.retry_count + 1),
            );
            self.store.upsert(&record)?;
            Ok(true)
        });
        match released {
            Ok(true) => {
                warn!("Could not settle transfer of {}, re-queued it", fingerprint);
                self.updates.publish();
            }
            Ok(false) => {}
            Err(err) => warn!(
                "Could not settle transfer of {} nor re-queue it: {}",
                fingerprint, err
            ),
        }
    }

    /// Record the result of a transfer, unless the record was cancelled or
    /// deleted while it was running.
    fn settle_transfer(
        &self,
        fingerprint: &str,
        result: Result<FetchedFile, SourceError>,
    ) -> ServiceResult<TransferOutcome> {
        let _guard = self.lock_mutations()?;
        let mut record = match self.store.get(fingerprint)? {
            None => {
                info!("Record {} disappeared during transfer, abandoning", fingerprint);
                return Ok(TransferOutcome::Abandoned);
            }
            Some(record) if record.status != DownloadStatus::Downloading => {
                info!(
                    "Download {} became {} during transfer, abandoning",
                    fingerprint, record.status
                );
                return Ok(TransferOutcome::Abandoned);
            }
            Some(record) => record,
        };

        match result {
            Ok(file) => {
                record.status = DownloadStatus::Available;
                record.temp_path = Some(file.temp_path.to_string_lossy().into_owned());
                record.final_path = Some(file.final_path.to_string_lossy().into_owned());
                record.completed_at = Some(crate::now_millis());
                record.last_error = None;
                self.store.upsert(&record)?;
                info!(
                    "Download of {} available at {:?} ({} bytes)",
                    fingerprint, file.final_path, file.bytes
                );
                Ok(TransferOutcome::Completed(record))
            }
            Err(error) => {
                record.status = DownloadStatus::Error;
                record.retry_count += 1;
                record.last_error = Some(error.to_string());
                self.store.upsert(&record)?;
                warn!(
                    "Download of {} failed (attempt {}): {}",
                    fingerprint, record.retry_count, error
                );
                Ok(TransferOutcome::Failed { record, error })
            }
        }
    }

    /// Re-queue a failed record with backoff while under the retry ceiling.
    fn handle_failure(&self, record: DownloadRecord, error: SourceError) -> ServiceResult<()> {
        if !self.retry_policy.should_retry(&error, record.retry_count) {
            info!(
                "Download of {} stays in error after {} attempts",
                record.fingerprint, record.retry_count
            );
            self.notify_finished(NotificationType::DownloadFailed, &record);
            return Ok(());
        }

        let requeued = {
            let _guard = self.lock_mutations()?;
            match self.store.get(&record.fingerprint)? {
                Some(mut current) if current.status == DownloadStatus::Error => {
                    let now = crate::now_millis();
                    current.status = DownloadStatus::Queued;
                    current.next_attempt_at =
                        Some(self.retry_policy.next_attempt_at(now, current.retry_count));
                    self.store.upsert(&current)?;
                    info!(
                        "Re-queued {} for retry {} in {}s",
                        current.fingerprint,
                        current.retry_count,
                        self.retry_policy.backoff_secs(current.retry_count)
                    );
                    true
                }
                _ => false,
            }
        };
        if requeued {
            self.updates.publish();
        }
        Ok(())
    }

    fn notify_finished(&self, notification_type: NotificationType, record: &DownloadRecord) {
        let title = match notification_type {
            NotificationType::DownloadCompleted => format!("{} is ready", record.display_name()),
            _ => format!("Download of {} failed", record.display_name()),
        };
        let data = DownloadFinishedData {
            fingerprint: record.fingerprint.clone(),
            title: record.metadata.title.clone(),
            final_path: record.final_path.clone(),
            error: record.last_error.clone(),
            retry_count: record.retry_count,
        };
        self.notifications.notify(notification_type, title, &data);
    }

    fn set_in_flight(&self, value: Option<InFlight>) {
        match self.in_flight.lock() {
            Ok(mut in_flight) => *in_flight = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    /// Fire the cancellation token of the running transfer if it is `fingerprint`.
    fn signal_in_flight(&self, fingerprint: &str) {
        let in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(current) = in_flight.as_ref() {
            if current.fingerprint == fingerprint {
                debug!("Signalling in-flight transfer of {} to stop", fingerprint);
                current.cancel.cancel();
            }
        }
    }
}
