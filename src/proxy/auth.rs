//! Optional bearer-token gate in front of the translation endpoint.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::server::{AppState, HEALTH_PATH};
use crate::config::AuthConfig;
use crate::error::Error;

/// Decide whether a request may proceed.
///
/// The health path is always open. When auth is off, or no token is
/// configured, everything passes. Otherwise the request needs exactly
/// `Authorization: Bearer <token>`.
pub fn is_authorized(auth: &AuthConfig, path: &str, headers: &HeaderMap) -> bool {
    if path == HEALTH_PATH {
        return true;
    }

    let Some(expected) = auth.enforced_token() else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()))
}

/// Byte comparison whose running time does not depend on where inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Middleware wrapping [`is_authorized`].
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_authorized(&state.config.auth, request.uri().path(), request.headers()) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rejected unauthorized request");
    Error::Unauthorized.into_response()
}
