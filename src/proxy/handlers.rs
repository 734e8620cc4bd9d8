//! HTTP request handlers.

use axum::{
    body::Body,
    extract::{Extension, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use super::convert::{to_canonical, to_source};
use super::server::{AppState, RequestId, REQUEST_ID_HEADER};
use super::types::{CanonicalRequest, CanonicalResponse, SourceRequest};
use super::validate::{check_declared_length, validate_request, MAX_BODY_BYTES};
use crate::error::{Error, Result};

/// Handle POST /v1/messages
///
/// Every stage is a terminal failure point: the first error is logged with
/// its class and cause and becomes the whole response.
pub async fn messages(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    request: Request,
) -> Response {
    let start = std::time::Instant::now();

    match translate(&state, &request_id, request).await {
        Ok(response) => {
            tracing::info!(
                latency_ms = start.elapsed().as_millis() as u64,
                "Successfully processed request"
            );
            response
        }
        Err(err) => {
            let status = err.status();
            if status.is_server_error() {
                tracing::error!(
                    error_class = err.kind(),
                    status = status.as_u16(),
                    error = %err,
                    "Request failed"
                );
            } else {
                tracing::warn!(
                    error_class = err.kind(),
                    status = status.as_u16(),
                    error = %err,
                    "Request rejected"
                );
            }
            err.into_response()
        }
    }
}

/// validate -> parse -> convert -> dispatch -> translate -> encode
async fn translate(
    state: &AppState,
    request_id: &RequestId,
    request: Request,
) -> Result<Response> {
    check_declared_length(request.headers()).map_err(|size| Error::PayloadTooLarge {
        size,
        max: MAX_BODY_BYTES,
    })?;

    let body = read_capped(request.into_body(), MAX_BODY_BYTES).await?;

    let source: SourceRequest = serde_json::from_slice(&body)
        .map_err(|e| Error::BadRequest(format!("Invalid JSON: {}", e)))?;

    validate_request(&source)?;

    tracing::info!(
        model = %source.model,
        messages = source.messages.len(),
        "Received messages request"
    );

    let canonical = to_canonical(&source, state.extractor.as_ref());
    let upstream = call_backend(state, &canonical, request_id).await?;
    let translated = to_source(&upstream);

    let body = serde_json::to_vec(&translated)
        .map_err(|e| Error::Internal(format!("Failed to encode response: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response())
}

/// Buffer a request body, failing as soon as it grows past `limit`.
///
/// Enforced on the bytes actually received, independent of any declared
/// `Content-Length`.
pub async fn read_capped(body: Body, limit: usize) -> Result<Bytes> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::BadRequest(format!("Failed to read body: {}", e)))?;
        let size = buf.len() + chunk.len();
        if size > limit {
            return Err(Error::PayloadTooLarge {
                size: size as u64,
                max: limit,
            });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(buf.freeze())
}

/// Send the canonical request to the backend and parse its answer.
async fn call_backend(
    state: &AppState,
    request: &CanonicalRequest,
    request_id: &RequestId,
) -> Result<CanonicalResponse> {
    let provider = &state.config.provider;
    let upstream_error = |message: String| Error::Upstream {
        provider: provider.name.clone(),
        message,
    };

    let payload = serde_json::to_vec(request)
        .map_err(|e| Error::Internal(format!("Failed to marshal request: {}", e)))?;

    let send = state
        .http_client
        .post(provider.completions_url())
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", provider.api_key.expose_secret()),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .header(REQUEST_ID_HEADER, request_id.0.as_str())
        .body(payload)
        .send();

    tracing::debug!(provider = %provider.name, model = %request.model, "Dispatching to backend");

    let response = tokio::time::timeout(state.response_timeout, send)
        .await
        .map_err(|_| {
            upstream_error(format!(
                "no response within {}ms",
                state.response_timeout.as_millis()
            ))
        })?
        .map_err(|e| upstream_error(format!("request failed: {}", e)))?;

    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| upstream_error(format!("failed to read response: {}", e)))?;

    if status != reqwest::StatusCode::OK {
        return Err(Error::UpstreamStatus {
            provider: provider.name.clone(),
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    }

    let parsed: CanonicalResponse = serde_json::from_slice(&body)
        .map_err(|e| upstream_error(format!("failed to parse response: {}", e)))?;

    if let Some(err) = &parsed.error {
        return Err(upstream_error(format!("returned error: {}", err)));
    }

    tracing::debug!(
        upstream_id = %parsed.id,
        choices = parsed.choices.len(),
        prompt_tokens = parsed.usage.prompt_tokens,
        completion_tokens = parsed.usage.completion_tokens,
        "Backend responded"
    );

    Ok(parsed)
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "provider": state.config.provider.name,
    }))
}

/// Any unsupported method on a known path.
pub async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

/// Any unknown path.
pub async fn not_found() -> Error {
    Error::NotFound
}
