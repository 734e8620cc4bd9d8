//! HTTP proxy module.
//!
//! Accepts block-structured `/v1/messages` requests, flattens them into
//! OpenAI-compatible chat completion requests, forwards them to the
//! configured backend and maps the answer back.

pub mod auth;
pub mod convert;
mod handlers;
mod server;
pub mod types;
pub mod validate;

pub use convert::{to_canonical, to_source, ContentExtractor, FlattenText};
pub use handlers::read_capped;
pub use server::{
    build_http_client, create_router, run_server, serve_until, shutdown_signal, AppState,
    RequestId, HEALTH_PATH, MESSAGES_PATH, REQUEST_ID_HEADER, RESPONSE_HEADER_TIMEOUT,
    SHUTDOWN_GRACE,
};
pub use types::{
    CanonicalMessage, CanonicalRequest, CanonicalResponse, ContentBlock, ContentValue,
    SourceMessage, SourceRequest, SourceResponse,
};
