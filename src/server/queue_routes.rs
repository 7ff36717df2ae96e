//! Download queue HTTP routes.
//!
//! Provides endpoints for:
//! - Enqueueing a fingerprint and listing the queue
//! - Cancel, retry and permanent delete of a single download

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::download_queue::{AddToQueueOutcome, BookMetadata, DownloadCounts, DownloadRecord};
use crate::server::state::{GuardedQueueEngine, ServerState};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct EnqueueBody {
    pub fingerprint: String,
    #[serde(flatten)]
    pub metadata: BookMetadata,
}

#[derive(Debug, Serialize)]
pub struct QueueListResponse {
    pub downloads: Vec<DownloadRecord>,
    pub counts: DownloadCounts,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /queue - All download records plus per-status counts
async fn list_queue(State(queue): State<GuardedQueueEngine>) -> impl IntoResponse {
    let downloads = match queue.list_downloads() {
        Ok(downloads) => downloads,
        Err(e) => return e.into_response(),
    };
    let mut counts = DownloadCounts::default();
    for record in &downloads {
        counts.add(record.status, 1);
    }
    Json(QueueListResponse { downloads, counts }).into_response()
}

/// POST /queue - Admit a fingerprint into the queue
async fn enqueue(
    State(queue): State<GuardedQueueEngine>,
    Json(body): Json<EnqueueBody>,
) -> impl IntoResponse {
    debug!("Enqueue requested for {}", body.fingerprint);
    match queue.add_to_queue(&body.fingerprint, body.metadata) {
        Ok(outcome @ AddToQueueOutcome::Queued { .. }) => {
            (StatusCode::CREATED, Json(outcome)).into_response()
        }
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /queue/{fingerprint}
async fn get_download(
    State(queue): State<GuardedQueueEngine>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match queue.get_download(&fingerprint) {
        Ok(record) => Json(record).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /queue/{fingerprint}/cancel
async fn cancel_download(
    State(queue): State<GuardedQueueEngine>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match queue.cancel_download(&fingerprint) {
        Ok(cancelled) => Json(CancelResponse { cancelled }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /queue/{fingerprint}/retry
async fn retry_download(
    State(queue): State<GuardedQueueEngine>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match queue.retry_download(&fingerprint) {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /queue/{fingerprint}
async fn delete_download(
    State(queue): State<GuardedQueueEngine>,
    Path(fingerprint): Path<String>,
) -> impl IntoResponse {
    match queue.delete_download(&fingerprint) {
        Ok(deleted) => Json(DeleteResponse { deleted }).into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// Router
// =============================================================================

pub fn queue_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_queue).post(enqueue))
        .route("/{fingerprint}", get(get_download).delete(delete_download))
        .route("/{fingerprint}/cancel", post(cancel_download))
        .route("/{fingerprint}/retry", post(retry_download))
}
