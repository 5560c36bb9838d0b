//! Error handling for ScanDesk

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (empty ledger, missing selection, unknown roster value)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict (camera busy, submission already in flight)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No camera devices available
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Frame capture / decoder pipeline error
    #[error("Capture error: {0}")]
    Capture(String),

    /// Webhook request timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error (malformed webhook response)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            Error::CameraUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "CAMERA_UNAVAILABLE",
                msg.clone(),
            ),
            Error::Capture(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CAPTURE_ERROR",
                msg.clone(),
            ),
            Error::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", msg.clone()),
            Error::Http(e) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR", e.to_string()),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR", e.to_string()),
            Error::Parse(msg) => (StatusCode::BAD_GATEWAY, "PARSE_ERROR", msg.clone()),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
