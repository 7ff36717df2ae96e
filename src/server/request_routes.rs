//! Saved request HTTP routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;

use crate::content_source::SearchQuery;
use crate::requests::{CheckerStatus, RequestCounts, SavedRequest};
use crate::server::queue_routes::DeleteResponse;
use crate::server::state::{GuardedRequestChecker, GuardedRequestManager, ServerState};

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<SavedRequest>,
    pub counts: RequestCounts,
}

#[derive(Debug, Serialize)]
pub struct CheckTriggeredResponse {
    /// False if a cycle was already running, in which case this one is skipped
    pub started: bool,
}

/// GET /requests
async fn list_requests(State(requests): State<GuardedRequestManager>) -> impl IntoResponse {
    let all = match requests.list_requests() {
        Ok(all) => all,
        Err(e) => return e.into_response(),
    };
    let mut counts = RequestCounts::default();
    for request in &all {
        counts.add(request.status, 1);
    }
    Json(RequestListResponse {
        requests: all,
        counts,
    })
    .into_response()
}

/// POST /requests - Save a new search
async fn create_request(
    State(requests): State<GuardedRequestManager>,
    Json(query): Json<SearchQuery>,
) -> impl IntoResponse {
    match requests.create_request(query) {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /requests/{id}
async fn get_request(
    State(requests): State<GuardedRequestManager>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match requests.get_request(id) {
        Ok(request) => Json(request).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /requests/{id}/cancel
async fn cancel_request(
    State(requests): State<GuardedRequestManager>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match requests.cancel_request(id) {
        Ok(request) => Json(request).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /requests/{id}/reactivate
async fn reactivate_request(
    State(requests): State<GuardedRequestManager>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match requests.reactivate_request(id) {
        Ok(request) => Json(request).into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /requests/{id}
async fn delete_request(
    State(requests): State<GuardedRequestManager>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match requests.delete_request(id) {
        Ok(deleted) => Json(DeleteResponse { deleted }).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /requests/{id}/check - Check one request right now
async fn check_request(
    State(checker): State<GuardedRequestChecker>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match checker.check_single_request(id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /requests/check - Start a full cycle in the background
async fn check_all_requests(State(checker): State<GuardedRequestChecker>) -> impl IntoResponse {
    let started = !checker.status().is_running;
    info!("Manual request check cycle triggered");
    checker.spawn_cycle();
    (StatusCode::ACCEPTED, Json(CheckTriggeredResponse { started }))
}

/// GET /requests/checker/status
async fn checker_status(State(checker): State<GuardedRequestChecker>) -> Json<CheckerStatus> {
    Json(checker.status())
}

pub fn request_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_requests).post(create_request))
        .route("/check", post(check_all_requests))
        .route("/checker/status", get(checker_status))
        .route("/{id}", get(get_request).delete(delete_request))
        .route("/{id}/cancel", post(cancel_request))
        .route("/{id}/reactivate", post(reactivate_request))
        .route("/{id}/check", post(check_request))
}
