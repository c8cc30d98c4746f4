use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_UPSTREAM_PORT: u16 = 19_002;
const CONVERSATIONS_PREFIX: &str = "/rest/app-chat/conversations/";

#[derive(Copy, Clone)]
enum MockScenario {
    Text,
    Replace,
    SoftStop,
    Empty,
    Error,
    Slow,
}

#[derive(Copy, Clone)]
enum Endpoint {
    NewConversation,
    Responses,
}

struct RequestStats {
    new_conversation: AtomicU64,
    responses: AtomicU64,
}

impl RequestStats {
    const fn new() -> Self {
        Self {
            new_conversation: AtomicU64::new(0),
            responses: AtomicU64::new(0),
        }
    }

    fn record(&self, endpoint: Endpoint) {
        let counter = match endpoint {
            Endpoint::NewConversation => &self.new_conversation,
            Endpoint::Responses => &self.responses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> (u64, u64) {
        (
            self.new_conversation.load(Ordering::Relaxed),
            self.responses.load(Ordering::Relaxed),
        )
    }

    fn reset(&self) {
        self.new_conversation.store(0, Ordering::Relaxed);
        self.responses.store(0, Ordering::Relaxed);
    }
}

struct MockState {
    scenario: MockScenario,
    stats: RequestStats,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("UPSTREAM_PORT", DEFAULT_UPSTREAM_PORT);
    let state = Arc::new(MockState {
        scenario: parse_scenario(),
        stats: RequestStats::new(),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock upstream on 127.0.0.1:{port}: {err}"));
    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock upstream connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("replace") => MockScenario::Replace,
        Ok("softstop") => MockScenario::SoftStop,
        Ok("empty") => MockScenario::Empty,
        Ok("error") => MockScenario::Error,
        Ok("slow") => MockScenario::Slow,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &Arc<MockState>) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    drain_request_body(body).await;

    let method = parts.method;
    let path = parts.uri.path();

    if method == Method::GET && path == "/_mock/stats" {
        return stats_response(state);
    }
    if method == Method::POST && path == "/_mock/reset" {
        state.stats.reset();
        return simple_response_static(StatusCode::OK, "application/json", br#"{"ok":true}"#);
    }
    if method != Method::POST {
        return simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"error":"method_not_allowed"}"#,
        );
    }

    let Some(endpoint) = endpoint_for_path(path) else {
        return simple_response_static(
            StatusCode::NOT_FOUND,
            "application/json",
            br#"{"error":"not_found"}"#,
        );
    };
    state.stats.record(endpoint);

    let body: &'static [u8] = match state.scenario {
        MockScenario::Error => {
            return simple_response_static(
                StatusCode::SERVICE_UNAVAILABLE,
                "application/json",
                br#"{"error":"mock_injected_error"}"#,
            );
        }
        MockScenario::Slow => {
            tokio::time::sleep(Duration::from_secs(120)).await;
            STREAM_TEXT
        }
        MockScenario::Text => STREAM_TEXT,
        MockScenario::Replace => STREAM_REPLACE,
        MockScenario::SoftStop => STREAM_SOFT_STOP,
        MockScenario::Empty => STREAM_EMPTY,
    };
    simple_response_static(StatusCode::OK, "application/x-ndjson", body)
}

async fn drain_request_body(mut body: Incoming) {
    while let Some(frame_result) = body.frame().await {
        if frame_result.is_err() {
            break;
        }
    }
}

fn endpoint_for_path(path: &str) -> Option<Endpoint> {
    let rest = path.strip_prefix(CONVERSATIONS_PREFIX)?;
    if rest == "new" {
        return Some(Endpoint::NewConversation);
    }
    match rest.split_once('/') {
        Some((id, "responses")) if !id.is_empty() => Some(Endpoint::Responses),
        _ => None,
    }
}

fn stats_response(state: &MockState) -> Response<Full<Bytes>> {
    let (new_conversation, responses) = state.stats.snapshot();
    let body = format!("{{\"new\":{new_conversation},\"responses\":{responses}}}");
    simple_response(
        StatusCode::OK,
        "application/json",
        Bytes::from(body.into_bytes()),
    )
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    simple_response(status, content_type, Bytes::from_static(body))
}

const STREAM_TEXT: &[u8] = b"{\"result\":{\"response\":{\"token\":\"Hi\"}}}\n{\"result\":{\"response\":{\"token\":\" there\",\"responseId\":\"mock-r1\"},\"conversation\":{\"conversationId\":\"mock-c1\"}}}\n";
const STREAM_REPLACE: &[u8] = b"{\"result\":{\"response\":{\"token\":\"Draft\"}}}\n{\"result\":{\"response\":{\"modelResponse\":{\"message\":\"Final answer\",\"responseId\":\"mock-r2\"}},\"conversation\":{\"conversationId\":\"mock-c1\"}}}\n";
const STREAM_SOFT_STOP: &[u8] = b"{\"result\":{\"response\":{\"token\":\"done\",\"responseId\":\"mock-r3\"}}}\n{\"result\":{\"response\":{\"isSoftStop\":true},\"conversation\":{\"conversationId\":\"mock-c1\"}}}\n{\"result\":{\"response\":{\"token\":\" ignored\"}}}\n";
const STREAM_EMPTY: &[u8] = b"{\"result\":{\"conversation\":{\"conversationId\":\"mock-c1\"}}}\n";
