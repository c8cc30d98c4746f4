use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{into_axum_response, IngressApi, RelayError};
use crate::protocol::upstream::ModelMode;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct CountTokensRequest {
    #[serde(default)]
    text: String,
}

/// `POST /api/count-tokens`: `{text}` to `{text, token_count, method}`.
pub fn count_tokens_handler(State(state): State<Arc<AppState>>, body: &Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CountTokensRequest::default()
    } else {
        match serde_json::from_slice::<CountTokensRequest>(body) {
            Ok(request) => request,
            Err(err) => {
                let err = RelayError::InvalidRequest(format!("invalid JSON body: {err}"));
                return into_axum_response(&err, IngressApi::Native);
            }
        }
    };
    let tokens = state.tokens();
    Json(json!({
        "token_count": tokens.count(&request.text),
        "method": tokens.method(),
        "text": request.text,
    }))
    .into_response()
}

/// `GET /api/model-modes`.
pub fn model_modes_handler() -> Json<Value> {
    let descriptions: Map<String, Value> = ModelMode::ALL
        .into_iter()
        .map(|mode| (mode.as_wire().to_string(), Value::from(mode.description())))
        .collect();
    Json(json!({
        "supported_modes": ModelMode::ALL.map(ModelMode::as_wire),
        "default": ModelMode::default().as_wire(),
        "descriptions": descriptions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_modes_listing() {
        let Json(value) = model_modes_handler();
        assert_eq!(value["default"], "MODEL_MODE_AUTO");
        assert_eq!(value["supported_modes"].as_array().unwrap().len(), 4);
        assert!(value["descriptions"]["MODEL_MODE_REASONING"].is_string());
    }
}
