use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use grok_relay::config::{AppConfig, FeaturesConfig, TokenCounterMode};
use grok_relay::routing::dispatch::dispatch_request;
use grok_relay::state::AppState;
use serde_json::{json, Value};

fn build_state() -> Arc<AppState> {
    let config = AppConfig {
        features: FeaturesConfig {
            token_counter: TokenCounterMode::Heuristic,
            ..FeaturesConfig::default()
        },
        ..AppConfig::default()
    };
    Arc::new(AppState::from_config(config).expect("build state"))
}

async fn send(
    state: Arc<AppState>,
    base_path: &str,
    method: &str,
    uri: &str,
    body: Body,
) -> (StatusCode, Bytes) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .expect("build request");
    let response = dispatch_request(state, Arc::<str>::from(base_path), request)
        .await
        .expect("dispatch");
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    (status, body)
}

async fn get_json(uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(build_state(), "", "GET", uri, Body::empty()).await;
    (status, serde_json::from_slice(&body).expect("json payload"))
}

#[tokio::test]
async fn test_health_endpoints() {
    assert_eq!(
        get_json("/health").await,
        (StatusCode::OK, json!({"status": "healthy"}))
    );
    assert_eq!(
        get_json("/v1/health").await,
        (StatusCode::OK, json!({"status": "ok"}))
    );
}

#[tokio::test]
async fn test_root_descriptor_lists_endpoints() {
    let (status, payload) = get_json("/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["name"], "grok-relay");
    assert_eq!(payload["status"], "running");
    assert_eq!(payload["endpoints"]["native"]["chat"], "/api/chat");
    assert_eq!(
        payload["endpoints"]["openai_compatible"]["chat"],
        "/v1/chat/completions"
    );
    assert_eq!(payload["config"]["token_counter"], "heuristic");
}

#[tokio::test]
async fn test_models_catalog() {
    let (status, payload) = get_json("/v1/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload["object"], "list");
    let ids: Vec<&str> = payload["data"]
        .as_array()
        .expect("data array")
        .iter()
        .map(|model| model["id"].as_str().expect("model id"))
        .collect();
    assert_eq!(ids, ["grok-3", "grok-2", "grok-1"]);
    assert_eq!(payload["data"][0]["owned_by"], "grok");
    assert_eq!(payload["data"][0]["created"], 1_677_610_602_u64);
}

#[tokio::test]
async fn test_model_modes() {
    let (status, payload) = get_json("/api/model-modes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        payload["supported_modes"],
        json!([
            "MODEL_MODE_AUTO",
            "MODEL_MODE_FAST",
            "MODEL_MODE_ACCURATE",
            "MODEL_MODE_REASONING"
        ])
    );
    assert_eq!(payload["default"], "MODEL_MODE_AUTO");
}

#[tokio::test]
async fn test_count_tokens() {
    let body = Body::from(r#"{"text":"hello brave new world 你好"}"#);
    let (status, body) = send(build_state(), "", "POST", "/api/count-tokens", body).await;
    assert_eq!(status, StatusCode::OK);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["text"], "hello brave new world 你好");
    assert_eq!(payload["method"], "heuristic");
    assert_eq!(payload["token_count"], 9);
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let state = build_state();
    let (status, _) = send(Arc::clone(&state), "", "GET", "/v1/responses", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(Arc::clone(&state), "", "GET", "/api/chat", Body::empty()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, _) = send(state, "", "DELETE", "/v1/models", Body::empty()).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_base_path_prefix() {
    let state = build_state();
    let (status, _) = send(Arc::clone(&state), "/relay", "GET", "/relay/health", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(state, "/relay", "GET", "/health", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let oversized = vec![b' '; 2 * 1024 * 1024 + 1];
    let (status, _) = send(
        build_state(),
        "",
        "POST",
        "/v1/chat/completions",
        Body::from(oversized),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_invalid_json_on_openai_surface_is_bad_request() {
    let (status, body) = send(
        build_state(),
        "",
        "POST",
        "/v1/chat/completions",
        Body::from("{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let payload: Value = serde_json::from_slice(&body).expect("json payload");
    assert_eq!(payload["error"]["type"], "invalid_request_error");
}
