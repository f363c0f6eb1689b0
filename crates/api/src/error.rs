//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{AllocationError, ErrorKind};
use notifications::NotificationError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// The caller did not identify themselves.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Allocation or catalog error.
    Allocation(AllocationError),
    /// Confirmation delivery error.
    Notification(NotificationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            ApiError::Allocation(err) => allocation_error_to_response(err),
            ApiError::Notification(err) => notification_error_to_response(err),
        };

        metrics::counter!("api_errors_total", "kind" => kind).increment(1);
        let body = serde_json::json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn allocation_error_to_response(err: AllocationError) -> (StatusCode, &'static str, String) {
    let kind = err.kind();
    let status = match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::QuotaExceeded | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotificationFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => {
            tracing::error!(error = %err, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, kind.as_str(), err.to_string())
}

fn notification_error_to_response(err: NotificationError) -> (StatusCode, &'static str, String) {
    match err {
        NotificationError::Directory(inner) => allocation_error_to_response(inner),
        other => {
            tracing::error!(error = %other, "confirmation delivery failed");
            (
                StatusCode::BAD_GATEWAY,
                ErrorKind::NotificationFailure.as_str(),
                other.to_string(),
            )
        }
    }
}

impl From<AllocationError> for ApiError {
    fn from(err: AllocationError) -> Self {
        ApiError::Allocation(err)
    }
}

impl From<NotificationError> for ApiError {
    fn from(err: NotificationError) -> Self {
        ApiError::Notification(err)
    }
}
