//! Error taxonomy for queue and request operations.

use thiserror::Error;

/// Failure of a client-facing queue or request operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: current status is {current}, required {required}")]
    InvalidTransition {
        current: String,
        required: &'static str,
    },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("An active request with the same query already exists (id {0})")]
    DuplicateRequest(i64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn invalid_transition(current: impl ToString, required: &'static str) -> Self {
        ServiceError::InvalidTransition {
            current: current.to_string(),
            required,
        }
    }

    /// True for errors caused by the caller rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_)
                | ServiceError::InvalidTransition { .. }
                | ServiceError::DuplicateRequest(_)
                | ServiceError::InvalidRequest(_)
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
