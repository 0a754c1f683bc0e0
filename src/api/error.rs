//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::container::ContainerError;
use crate::models::ErrorResponse;
use crate::router::ForwardError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Runtime failure: {0}")]
    Runtime(String),

    #[error("Upstream failure: {0}")]
    Transport(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            // Duplicate names are a caller error; the contract reports them as 400
            ApiError::Conflict(msg) => (StatusCode::BAD_REQUEST, "ALREADY_EXISTS", msg),
            ApiError::Runtime(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "RUNTIME_FAILURE",
                msg,
            ),
            ApiError::Transport(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "TRANSPORT_FAILURE",
                msg,
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
        };

        let body = Json(ErrorResponse::new(error_code, message));
        (status, body).into_response()
    }
}

impl From<ContainerError> for ApiError {
    fn from(err: ContainerError) -> Self {
        match err {
            ContainerError::Validation(msg) => ApiError::BadRequest(msg),
            ContainerError::NotFound(msg) => ApiError::NotFound(msg),
            ContainerError::AlreadyExists(msg) => ApiError::Conflict(msg),
            ContainerError::Runtime(msg) => ApiError::Runtime(msg),
        }
    }
}

impl From<ForwardError> for ApiError {
    fn from(err: ForwardError) -> Self {
        ApiError::Transport(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "Internal error");
        ApiError::Internal(err.to_string())
    }
}
