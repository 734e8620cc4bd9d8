//! HTTP server setup and lifecycle.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use super::auth;
use super::convert::{ContentExtractor, FlattenText};
use super::handlers;
use crate::config::Config;

/// Translation endpoint path.
pub const MESSAGES_PATH: &str = "/v1/messages";
/// Liveness endpoint path, exempt from auth.
pub const HEALTH_PATH: &str = "/health";

/// Correlation header read from the client, forwarded upstream and echoed back.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Overall deadline for one backend call.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for establishing the backend connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for the backend to start answering (status line and headers).
pub const RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(10);
/// How long idle pooled connections are kept.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// How long in-flight requests may run after a shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Longest inbound correlation ID accepted as-is.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Shared application state. Everything in here is read-only.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub http_client: Client,
    pub extractor: Arc<dyn ContentExtractor>,
    /// How long to wait for the backend's status line and headers.
    pub response_timeout: Duration,
}

impl AppState {
    /// Build state with the default extraction policy and a pooled client.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            http_client: build_http_client()?,
            extractor: Arc::new(FlattenText),
            response_timeout: RESPONSE_HEADER_TIMEOUT,
        })
    }

    /// Replace the content extraction policy.
    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the response-header deadline.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }
}

/// Correlation ID for the current request, stored as a request extension.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestId(pub String);

/// Outbound client shared by all requests.
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .build()
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            MESSAGES_PATH,
            post(handlers::messages).fallback(handlers::method_not_allowed),
        )
        .route(
            HEALTH_PATH,
            get(handlers::health).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(middleware::from_fn(assign_request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Accept the client's correlation ID when it is reasonable, otherwise mint one.
fn resolve_request_id(incoming: Option<&HeaderValue>) -> String {
    incoming
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| {
            !v.is_empty()
                && v.len() <= MAX_REQUEST_ID_LEN
                && v.chars().all(|c| c.is_ascii_graphic())
        })
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Tag the request with a correlation ID, run everything below inside a span
/// carrying it, and echo it on the response.
async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = resolve_request_id(request.headers().get(REQUEST_ID_HEADER));
    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// Resolve once SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Serve on an already bound listener until `signal` resolves.
///
/// After the signal, new connections are refused and in-flight requests get
/// `grace` to finish before the server gives up on them.
pub async fn serve_until(
    listener: tokio::net::TcpListener,
    state: AppState,
    signal: impl Future<Output = ()> + Send + 'static,
    grace: Duration,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let stopping = Arc::new(Notify::new());
    let trigger = stopping.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            tracing::info!("Shutdown signal received, draining in-flight requests");
            trigger.notify_one();
        })
        .into_future();

    let deadline = async {
        stopping.notified().await;
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result?;
            tracing::info!("Server stopped");
        }
        _ = deadline => {
            tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed with requests still in flight");
        }
    }

    Ok(())
}

/// Run the HTTP server until SIGINT/SIGTERM.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.server.listen_addr();
    let state = AppState::new(config)?;

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(
        address = %listen_addr,
        provider = %state.config.provider.name,
        upstream = %state.config.provider.url,
        auth = state.config.auth.enforced_token().is_some(),
        "Starting msgbridge proxy server"
    );
    for warning in state.config.warnings() {
        tracing::warn!("{}", warning);
    }

    serve_until(listener, state, shutdown_signal(), SHUTDOWN_GRACE).await
}
