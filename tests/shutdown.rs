//! Integration tests for graceful shutdown.
//!
//! Runs the server on a real listener, triggers shutdown through a oneshot
//! channel, and checks that in-flight work is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use msgbridge::config::{ApiKey, AuthConfig, Config, LoggingConfig, ProviderConfig, ServerConfig};
use msgbridge::proxy::{
    build_http_client, serve_until, AppState, FlattenText, RESPONSE_HEADER_TIMEOUT,
};

fn state_for(url: &str) -> AppState {
    let config = Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9001,
        },
        provider: ProviderConfig {
            name: "TestAI".to_string(),
            url: url.to_string(),
            api_key: ApiKey::from("backend-secret"),
        },
        auth: AuthConfig::default(),
        logging: LoggingConfig::default(),
    };
    AppState {
        config: Arc::new(config),
        http_client: build_http_client().expect("http client"),
        extractor: Arc::new(FlattenText),
        response_timeout: RESPONSE_HEADER_TIMEOUT,
    }
}

/// Start the proxy on a random port; returns its base URL, the shutdown
/// trigger and the server task.
async fn start_proxy(
    state: AppState,
    grace: Duration,
) -> (
    String,
    oneshot::Sender<()>,
    tokio::task::JoinHandle<anyhow::Result<()>>,
) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind proxy");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(serve_until(
        listener,
        state,
        async move {
            rx.await.ok();
        },
        grace,
    ));
    (format!("http://{}", addr), tx, handle)
}

#[tokio::test]
async fn test_shutdown_stops_idle_server() {
    let (base, tx, handle) = start_proxy(state_for("http://127.0.0.1:1"), Duration::from_secs(5)).await;

    let response = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops promptly")
        .expect("task did not panic");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_in_flight_request_completes_after_signal() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "id": "slow",
                    "model": "m",
                    "choices": [{"message": {"content": "done"}, "finish_reason": "stop"}],
                    "usage": {"prompt_tokens": 1, "completion_tokens": 1}
                }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&backend)
        .await;

    let (base, tx, handle) = start_proxy(state_for(&backend.uri()), Duration::from_secs(5)).await;

    let client = reqwest::Client::new();
    let in_flight = tokio::spawn(async move {
        client
            .post(format!("{}/v1/messages", base))
            .json(&json!({"model": "m", "messages": [{"role": "user", "content": "hi"}]}))
            .send()
            .await
    });

    // Let the request reach the backend before signalling
    tokio::time::sleep(Duration::from_millis(150)).await;
    tx.send(()).unwrap();

    let response = in_flight.await.unwrap().expect("in-flight request finishes");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], "msg_slow");

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops after draining")
        .unwrap();
    assert!(result.is_ok());
}
