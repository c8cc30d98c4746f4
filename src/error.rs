use crate::protocol::error_shapes::{native_error_payload, openai_error_payload};

/// Error type shared by the router, transport and ingress handlers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Request failed with status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Request timeout: {0}")]
    Timeout(String),
    #[error(
        "No response text extracted (lines={lines}, response_id={}, conversation_id={})",
        id_or_dash(.response_id),
        id_or_dash(.conversation_id)
    )]
    EmptyResponse {
        lines: u64,
        response_id: Option<String>,
        conversation_id: Option<String>,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

fn id_or_dash(id: &Option<String>) -> &str {
    id.as_deref().unwrap_or("-")
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Timeout,
    BadGateway,
    ServerError,
}

impl RelayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            RelayError::Timeout(_) => ErrorCategory::Timeout,
            RelayError::Upstream { .. } | RelayError::EmptyResponse { .. } => {
                ErrorCategory::BadGateway
            }
            RelayError::Config(_) | RelayError::Transport(_) | RelayError::Internal(_) => {
                ErrorCategory::ServerError
            }
        }
    }
}

/// Which client-facing surface an error is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressApi {
    Native,
    OpenAiChat,
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

#[must_use]
pub fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Timeout => http::StatusCode::GATEWAY_TIMEOUT,
        ErrorCategory::BadGateway => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Format an error for a given ingress API
// ---------------------------------------------------------------------------

/// Format an error for a given ingress API, returning (`status_code`, JSON body).
///
/// The native surface always answers 200 and reports the failure in-band.
#[must_use]
pub fn format_error(err: &RelayError, ingress: IngressApi) -> (http::StatusCode, serde_json::Value) {
    let message = err.to_string();
    match ingress {
        IngressApi::Native => (http::StatusCode::OK, native_error_payload(&message)),
        IngressApi::OpenAiChat => {
            let cat = err.category();
            (
                http_status_for_category(cat),
                openai_error_payload(cat, &message),
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Axum integration
// ---------------------------------------------------------------------------

/// Convert a `RelayError` into an axum response for a specific ingress.
#[must_use]
pub fn into_axum_response(err: &RelayError, ingress: IngressApi) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err, ingress);
    (status, axum::Json(body)).into_response()
}

/// Default `IntoResponse` implementation uses `OpenAiChat` as the fallback ingress.
/// Handlers should call [`into_axum_response`] with the correct ingress instead.
impl axum::response::IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self, IngressApi::OpenAiChat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_maps_to_bad_gateway() {
        let err = RelayError::Upstream {
            status: 503,
            body: "unavailable".into(),
        };
        let (status, body) = format_error(&err, IngressApi::OpenAiChat);
        assert_eq!(status, http::StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["type"], "upstream_error");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("status 503"));
    }

    #[test]
    fn test_timeout_is_distinct_from_upstream() {
        let err = RelayError::Timeout("idle".into());
        assert_eq!(err.category(), ErrorCategory::Timeout);
        let (status, _) = format_error(&err, IngressApi::OpenAiChat);
        assert_eq!(status, http::StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_native_errors_are_reported_in_band() {
        let err = RelayError::EmptyResponse {
            lines: 3,
            response_id: Some("r1".into()),
            conversation_id: None,
        };
        let (status, body) = format_error(&err, IngressApi::Native);
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(body["success"], false);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("lines=3"));
        assert!(message.contains("response_id=r1"));
        assert!(message.contains("conversation_id=-"));
    }
}
