use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::json;

use crate::state::AppState;

/// Fixed `created` timestamp advertised for every catalog entry.
pub const MODEL_CREATED: u64 = 1_677_610_602;

/// Pre-render the `OpenAI` model list for `models`.
#[must_use]
pub fn build_models_response_body(models: &[String]) -> Bytes {
    let data: Vec<_> = models
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": MODEL_CREATED,
                "owned_by": "grok",
                "permission": [],
                "root": id,
                "parent": null,
            })
        })
        .collect();
    Bytes::from(json!({"object": "list", "data": data}).to_string())
}

/// List the configured models in `OpenAI` format.
#[must_use]
pub fn handler(State(state): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        Body::from(state.models_response_body()),
    )
        .into_response()
}
