//! Size and shape bounds applied before any conversion happens.

use axum::http::{header, HeaderMap};

use super::types::SourceRequest;

/// Maximum accepted request body (10 MiB).
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Maximum number of messages in one request.
pub const MAX_MESSAGES: usize = 100;
/// Upper bound for `max_tokens`.
pub const MAX_TOKENS: i64 = 100_000;
/// Upper bound for `temperature`.
pub const MAX_TEMPERATURE: f64 = 2.0;
/// Upper bound for `top_p`.
pub const MAX_TOP_P: f64 = 1.0;

/// A violated request constraint. Only the first violation is reported.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("model is required")]
    MissingModel,

    #[error("messages array cannot be empty")]
    NoMessages,

    #[error("too many messages: {count} (max: {max})")]
    TooManyMessages { count: usize, max: usize },

    #[error("max_tokens must be between 0 and {max}, got: {value}")]
    MaxTokens { value: i64, max: i64 },

    #[error("temperature must be between 0 and {max}, got: {value}")]
    Temperature { value: f64, max: f64 },

    #[error("top_p must be between 0 and {max}, got: {value}")]
    TopP { value: f64, max: f64 },
}

/// Declared body length from `Content-Length`, if present and well-formed.
pub fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Reject a request whose declared length is over the ceiling.
///
/// Returns the declared size on rejection. The body itself is still read
/// through a capped reader, so a missing or understated header cannot
/// bypass the limit.
pub fn check_declared_length(headers: &HeaderMap) -> Result<(), u64> {
    match declared_length(headers) {
        Some(len) if len > MAX_BODY_BYTES as u64 => Err(len),
        _ => Ok(()),
    }
}

/// Check the schema-level bounds of a parsed request.
pub fn validate_request(req: &SourceRequest) -> Result<(), ValidationError> {
    if req.model.is_empty() {
        return Err(ValidationError::MissingModel);
    }

    if req.messages.is_empty() {
        return Err(ValidationError::NoMessages);
    }

    if req.messages.len() > MAX_MESSAGES {
        return Err(ValidationError::TooManyMessages {
            count: req.messages.len(),
            max: MAX_MESSAGES,
        });
    }

    if let Some(value) = req.max_tokens {
        if !(0..=MAX_TOKENS).contains(&value) {
            return Err(ValidationError::MaxTokens {
                value,
                max: MAX_TOKENS,
            });
        }
    }

    if let Some(value) = req.temperature {
        if !(0.0..=MAX_TEMPERATURE).contains(&value) {
            return Err(ValidationError::Temperature {
                value,
                max: MAX_TEMPERATURE,
            });
        }
    }

    if let Some(value) = req.top_p {
        if !(0.0..=MAX_TOP_P).contains(&value) {
            return Err(ValidationError::TopP {
                value,
                max: MAX_TOP_P,
            });
        }
    }

    Ok(())
}
