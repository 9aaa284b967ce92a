use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use tradesync_core::StoreError;
use tradesync_sync::QueueError;

/// Every handler error, rendered as `{"status": "error", "error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    /// Detail is logged, never returned to the client.
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MappingNotFound(_) | StoreError::LogEntryNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            StoreError::Invalid(msg) => Self::BadRequest(msg),
            StoreError::LogAlreadyCompleted(_) | StoreError::MappingBusy(_) => {
                Self::Conflict(err.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::JobNotFound(_) => Self::NotFound(err.to_string()),
            QueueError::AlreadyRunning(_)
            | QueueError::AlreadyFinished(_)
            | QueueError::NotRunning(_) => Self::Conflict(err.to_string()),
            QueueError::Closed => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "status": "error", "error": message });
        (status, Json(body)).into_response()
    }
}
