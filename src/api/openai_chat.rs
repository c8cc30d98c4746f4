use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::{into_axum_response, IngressApi, RelayError};
use crate::protocol::openai_chat::decoder::decode_openai_chat_request;
use crate::protocol::openai_chat::encoder::encode_openai_chat_response;
use crate::protocol::openai_chat::stream::{encode_completion_frames, encode_error_frames};
use crate::protocol::openai_chat::OpenAiChatRequest;
use crate::protocol::upstream::ChatRequest;
use crate::state::AppState;
use crate::util::unix_now_secs;

const INGRESS: IngressApi = IngressApi::OpenAiChat;

/// `POST /v1/chat/completions`.
pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: OpenAiChatRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            let err = RelayError::InvalidRequest(format!("invalid JSON body: {err}"));
            return into_axum_response(&err, INGRESS);
        }
    };
    let (chat, stream) =
        match decode_openai_chat_request(request, &state.config.features.default_model) {
            Ok(decoded) => decoded,
            Err(err) => return into_axum_response(&err, INGRESS),
        };

    let id = state.next_completion_id();
    let created = unix_now_secs();

    if stream {
        return sse_ok_response(Body::from_stream(completion_sse_stream(
            state, chat, id, created,
        )));
    }

    match state.router.route(&chat).await {
        Ok(outcome) => Json(encode_openai_chat_response(outcome, id, created)).into_response(),
        Err(err) => {
            tracing::warn!(error = %err, model = %chat.model, "chat completion failed");
            into_axum_response(&err, INGRESS)
        }
    }
}

/// SSE body for a streaming request.
///
/// The reply is collected in full before the first frame; failures become an
/// error frame followed by `[DONE]`.
fn completion_sse_stream(
    state: Arc<AppState>,
    chat: ChatRequest,
    id: String,
    created: u64,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures_util::stream::once(async move {
        let frames = match state.router.route(&chat).await {
            Ok(outcome) => encode_completion_frames(&outcome.text, &outcome.model, &id, created),
            Err(err) => Err(err),
        };
        frames.unwrap_or_else(|err| {
            tracing::warn!(error = %err, model = %chat.model, "streaming chat completion failed");
            encode_error_frames(&err)
        })
    })
    .flat_map(futures_util::stream::iter)
    .map(Ok::<Bytes, Infallible>)
}

fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
