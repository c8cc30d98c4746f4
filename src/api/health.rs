use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Service descriptor served at `/`.
pub fn root_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let features = &state.config.features;
    Json(json!({
        "name": "grok-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "native": {
                "chat": "/api/chat",
                "count_tokens": "/api/count-tokens",
                "model_modes": "/api/model-modes"
            },
            "openai_compatible": {
                "chat": "/v1/chat/completions",
                "models": "/v1/models"
            }
        },
        "features": [
            "native API format",
            "OpenAI-compatible format",
            "multi-turn conversations",
            "per-request cookie",
            "token counting",
            "configurable modelMode"
        ],
        "config": {
            "default_model": features.default_model,
            "models": features.models,
            "token_counter": state.tokens().method(),
            "log_level": features.log_level,
        }
    }))
}

pub fn health_handler() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

pub fn openai_health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
