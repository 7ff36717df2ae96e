//! Periodic re-run of saved requests against the content source.
//!
//! A cycle walks the active requests one at a time, with a fixed delay
//! between them. The first search result is admitted into the download
//! queue and only then is the request marked fulfilled, so a failed
//! admission leaves the request active for the next cycle.
//!
//! Cycles are single-flight: a cycle that starts while another is running is
//! skipped, not deferred. A cycle longer than the schedule interval therefore
//! starves the following ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::manager::RequestManager;
use super::models::{RequestStatus, SavedRequest};
use crate::content_source::ContentSearch;
use crate::download_queue::{AddToQueueOutcome, QueueEngine};
use crate::error::{ServiceError, ServiceResult};
use crate::notifications::{NotificationService, NotificationType, RequestFulfilledData};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckerStatus {
    pub is_running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub checked: usize,
    pub found: usize,
    pub errors: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(CycleSummary),
    /// Another cycle was already running.
    Skipped,
}

/// Result of checking one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CheckOutcome {
    NoMatch,
    Fulfilled {
        fingerprint: String,
        title: Option<String>,
        queue: AddToQueueOutcome,
    },
}

/// Holds the running flag for the lifetime of a cycle.
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct RequestChecker {
    requests: Arc<RequestManager>,
    queue: Arc<QueueEngine>,
    search: Arc<dyn ContentSearch>,
    notifications: Arc<NotificationService>,
    delay_between_requests: Duration,
    is_running: AtomicBool,
}

impl RequestChecker {
    pub fn new(
        requests: Arc<RequestManager>,
        queue: Arc<QueueEngine>,
        search: Arc<dyn ContentSearch>,
        notifications: Arc<NotificationService>,
        delay_between_requests: Duration,
    ) -> Self {
        Self {
            requests,
            queue,
            search,
            notifications,
            delay_between_requests,
            is_running: AtomicBool::new(false),
        }
    }

    pub fn status(&self) -> CheckerStatus {
        CheckerStatus {
            is_running: self.is_running.load(Ordering::Acquire),
        }
    }

    /// Run one full cycle over the active requests.
    ///
    /// Only a failure to list the active requests fails the cycle; per-request
    /// failures are counted in the summary.
    pub async fn check_all_requests(&self) -> ServiceResult<CycleOutcome> {
        let Some(_running) = RunningGuard::acquire(&self.is_running) else {
            info!("Request check already in progress, skipping this cycle");
            return Ok(CycleOutcome::Skipped);
        };

        let started = Instant::now();
        let active = self.requests.list_active()?;
        info!("Checking {} active requests", active.len());

        let mut summary = CycleSummary::default();
        for (index, listed) in active.iter().enumerate() {
            if index > 0 && !self.delay_between_requests.is_zero() {
                tokio::time::sleep(self.delay_between_requests).await;
            }

            // Re-read: the request may have been cancelled or deleted during the delay
            let request = match self.requests.get_request(listed.id) {
                Ok(request) if request.status == RequestStatus::Active => request,
                Ok(request) => {
                    debug!("Request {} is now {}, skipping", request.id, request.status);
                    continue;
                }
                Err(ServiceError::NotFound(_)) => {
                    debug!("Request {} was deleted, skipping", listed.id);
                    continue;
                }
                Err(err) => {
                    warn!("Failed to load request {}: {}", listed.id, err);
                    summary.errors += 1;
                    continue;
                }
            };

            summary.checked += 1;
            match self.check_request(&request).await {
                Ok(CheckOutcome::Fulfilled { .. }) => summary.found += 1,
                Ok(CheckOutcome::NoMatch) => {}
                Err(err) => {
                    warn!("Check of request {} failed: {}", request.id, err);
                    summary.errors += 1;
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Request check finished: {} checked, {} found, {} errors in {}ms",
            summary.checked, summary.found, summary.errors, summary.duration_ms
        );
        Ok(CycleOutcome::Completed(summary))
    }

    /// Check one request on demand. Not subject to the single-flight guard.
    pub async fn check_single_request(&self, id: i64) -> ServiceResult<CheckOutcome> {
        let request = self.requests.get_request(id)?;
        if request.status != RequestStatus::Active {
            return Err(ServiceError::invalid_transition(request.status, "active"));
        }
        self.check_request(&request).await
    }

    async fn check_request(&self, request: &SavedRequest) -> ServiceResult<CheckOutcome> {
        self.requests.touch_last_checked(request.id)?;

        let results = self
            .search
            .search(&request.query_params)
            .await
            .map_err(|err| ServiceError::Upstream(err.to_string()))?;

        let Some(first) = results.into_iter().next() else {
            debug!("No results for request {}", request.id);
            return Ok(CheckOutcome::NoMatch);
        };

        let queued = self.queue.add_to_queue(&first.fingerprint, first.metadata())?;
        self.requests.mark_fulfilled(request.id, &first.fingerprint)?;
        info!(
            "Request {} ('{}') matched {}",
            request.id, request.query_params.query, first.fingerprint
        );

        let title = first.title.clone();
        let data = RequestFulfilledData {
            request_id: request.id,
            query: request.query_params.query.clone(),
            fingerprint: first.fingerprint.clone(),
            title: title.clone(),
            queue_position: queued.position(),
        };
        self.notifications.notify(
            NotificationType::RequestFulfilled,
            format!(
                "Found {}",
                title.as_deref().unwrap_or(&request.query_params.query)
            ),
            &data,
        );

        Ok(CheckOutcome::Fulfilled {
            fingerprint: first.fingerprint,
            title,
            queue: queued,
        })
    }

    /// Start a cycle in the background.
    pub fn spawn_cycle(self: &Arc<Self>) -> JoinHandle<()> {
        let checker = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = checker.check_all_requests().await {
                error!("Request check cycle failed: {}", err);
            }
        })
    }

    /// Scheduler loop - call from a spawned task.
    ///
    /// Each tick spawns its cycle, so a tick landing while a cycle still runs
    /// hits the single-flight guard instead of waiting for it.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        run_on_startup: bool,
        shutdown: CancellationToken,
    ) {
        info!(
            "Request checker starting (interval={}s, run_on_startup={})",
            interval.as_secs(),
            run_on_startup
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !run_on_startup {
            // The first tick completes immediately
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.spawn_cycle();
                }
                _ = shutdown.cancelled() => {
                    info!("Request checker shutting down");
                    break;
                }
            }
        }
        info!("Request checker stopped");
    }
}
