//! Error types for msgbridge.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::proxy::validate::ValidationError;

/// Result type alias for msgbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for msgbridge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Request body too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: usize },

    /// Same message for every auth failure.
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Not found")]
    NotFound,

    #[error("{provider}: {message}")]
    Upstream { provider: String, message: String },

    #[error("{provider} error: {body}")]
    UpstreamStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            // Pass the backend's own status through when it is an error code
            Error::UpstreamStatus { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error class reported in the response envelope and in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::BadRequest(_) | Error::Validation(_) => "invalid_request_error",
            Error::PayloadTooLarge { .. } => "request_too_large",
            Error::Unauthorized => "authentication_error",
            Error::MethodNotAllowed => "method_not_allowed",
            Error::NotFound => "not_found_error",
            Error::Upstream { .. } | Error::UpstreamStatus { .. } | Error::Internal(_) => {
                "api_error"
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        // Source-protocol error envelope
        let body = serde_json::json!({
            "type": "error",
            "error": {
                "type": self.kind(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
