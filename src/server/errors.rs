//! Mapping of service errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::ServiceError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::InvalidTransition { .. } | ServiceError::DuplicateRequest(_) => {
            StatusCode::CONFLICT
        }
        ServiceError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if self.is_client_error() {
            debug!("Request rejected: {}", self);
        } else {
            error!("Request failed: {:#}", self);
        }
        let message = match &self {
            // Don't leak storage internals to clients
            ServiceError::Storage(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
