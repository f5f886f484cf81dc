//! Error types shared by services and HTTP handlers.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::session_machine::{ActivityNotPermitted, InvalidTransition},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Session, player, question or choice does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Caller may not perform a host-only operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Operation is not legal in the current session status.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// The player already answered this question in this session.
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// Payload is malformed or referentially inconsistent.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Storage backend failed.
    #[error("storage unavailable")]
    Persistence(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
}

impl ServiceError {
    /// Stable machine-readable code sent to clients alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::Duplicate(_) => "duplicate",
            ServiceError::Validation(_) => "validation",
            ServiceError::Persistence(_) | ServiceError::Degraded => "persistence",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Persistence(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ActivityNotPermitted> for ServiceError {
    fn from(err: ActivityNotPermitted) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Caller identity is missing or malformed.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is identified but not allowed to act.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidState(message) | ServiceError::Duplicate(message) => {
                AppError::Conflict(message)
            }
            ServiceError::Validation(message) => AppError::BadRequest(message),
            ServiceError::Persistence(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_reports_persistence_code() {
        assert_eq!(ServiceError::Degraded.code(), "persistence");
        let storage = StorageError::conflict("player answer", "x");
        assert_eq!(ServiceError::from(storage).code(), "persistence");
    }

    #[test]
    fn duplicate_maps_to_conflict_status() {
        let response = AppError::from(ServiceError::Duplicate("again".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let response = AppError::from(ServiceError::Forbidden("host only".into())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
