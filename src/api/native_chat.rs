use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;

use crate::error::{into_axum_response, IngressApi, RelayError};
use crate::protocol::error_shapes::native_error_payload;
use crate::protocol::native::{encode_native_response, NativeChatRequest, MESSAGE_REQUIRED};
use crate::state::AppState;

const INGRESS: IngressApi = IngressApi::Native;

/// `POST /api/chat`. Failures are reported in-band with HTTP 200.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: NativeChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let err = RelayError::InvalidRequest(format!("invalid JSON body: {err}"));
            return into_axum_response(&err, INGRESS);
        }
    };
    let Some(chat) = request.into_chat_request(&state.config.features.default_model) else {
        return Json(native_error_payload(MESSAGE_REQUIRED)).into_response();
    };

    match state.router.route(&chat).await {
        Ok(outcome) => Json(encode_native_response(outcome)).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, model = %chat.model, "native chat request failed");
            into_axum_response(&err, INGRESS)
        }
    }
}
