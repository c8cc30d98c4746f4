pub mod dispatch;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::observability::{log_request_complete, TokenEstimator, TokenUsage};
use crate::protocol::upstream::{
    build_payload, ChatRequest, ConversationRef, ModelMode, StreamEventParser, UpstreamPayload,
};
use crate::state::RequestIdGenerator;
use crate::stream::ndjson_line_stream;
use crate::transport::{HttpTransport, PreparedUpstream, UpstreamEndpoint};

/// Endpoint and body chosen for one request.
#[derive(Debug, Clone)]
pub struct RoutePlan<'a> {
    pub endpoint: UpstreamEndpoint<'a>,
    pub payload: UpstreamPayload,
}

impl RoutePlan<'_> {
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self.endpoint, UpstreamEndpoint::NewConversation)
    }
}

/// Pick the endpoint for a conversation reference: continuation only when
/// both identifiers are present.
#[must_use]
pub fn classify(conversation: &ConversationRef) -> UpstreamEndpoint<'_> {
    match conversation.continuation() {
        Some((conversation_id, _)) => UpstreamEndpoint::Responses { conversation_id },
        None => UpstreamEndpoint::NewConversation,
    }
}

/// Build the endpoint and matching payload shape for `request`.
#[must_use]
pub fn plan_route(request: &ChatRequest) -> RoutePlan<'_> {
    let endpoint = classify(&request.conversation);
    let parent_response_id = request
        .conversation
        .continuation()
        .map(|(_, parent)| parent);
    RoutePlan {
        endpoint,
        payload: build_payload(
            &request.message,
            &request.model,
            request.model_mode,
            parent_response_id,
        ),
    }
}

/// Result of one successful exchange, shared by every response projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub text: String,
    pub conversation_id: Option<String>,
    pub response_id: Option<String>,
    pub is_new_conversation: bool,
    pub model: String,
    pub model_mode: ModelMode,
    pub usage: TokenUsage,
}

/// Drives one request against the backend: classify, call, parse.
pub struct ConversationRouter {
    upstream: PreparedUpstream,
    transport: HttpTransport,
    tokens: Arc<TokenEstimator>,
    request_ids: RequestIdGenerator,
}

impl ConversationRouter {
    #[must_use]
    pub fn new(
        upstream: PreparedUpstream,
        transport: HttpTransport,
        tokens: Arc<TokenEstimator>,
    ) -> Self {
        Self {
            upstream,
            transport,
            tokens,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Run `request` against the backend and collect the full reply.
    ///
    /// No retries are attempted.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Config`] when no cookie is available
    /// - [`RelayError::Upstream`] for a non-2xx backend status
    /// - [`RelayError::Timeout`] on connect or idle timeout
    /// - [`RelayError::Transport`] when the body breaks off before a clean end
    ///   or a soft stop; any partial text is discarded
    /// - [`RelayError::EmptyResponse`] when the stream carried no text
    pub async fn route(&self, request: &ChatRequest) -> Result<ChatOutcome, RelayError> {
        let started = Instant::now();
        let plan = plan_route(request);
        let is_new = plan.is_new();
        let cookie = self.upstream.resolve_cookie(request.credential.as_deref())?;
        let url = self.upstream.endpoint_url(plan.endpoint)?;
        let body = plan
            .payload
            .to_body()
            .map_err(|err| RelayError::Internal(format!("failed to encode payload: {err}")))?;
        let request_id = self.request_ids.next_uuid();

        info!(
            %request_id,
            new_conversation = is_new,
            model = %request.model,
            model_mode = %request.model_mode,
            url = %url,
            "forwarding chat request"
        );

        let headers = self.upstream.request_headers(cookie, request_id);
        let upstream_body = self.transport.post_stream(url, headers, body).await?;
        let mut result = StreamEventParser::parse(ndjson_line_stream(upstream_body)).await?;

        if let Some(reason) = result.interrupted.take() {
            if !result.soft_stopped {
                warn!(
                    %request_id,
                    lines = result.lines_processed,
                    discarded_len = result.text.len(),
                    "discarding partial reply from interrupted stream"
                );
                return Err(RelayError::Transport(format!(
                    "upstream stream interrupted: {reason}"
                )));
            }
        }

        if result.conversation_id.is_none() {
            result.conversation_id = request
                .conversation
                .conversation_id()
                .map(str::to_owned);
        }

        if result.is_empty() {
            return Err(RelayError::EmptyResponse {
                lines: result.lines_processed,
                response_id: result.response_id,
                conversation_id: result.conversation_id,
            });
        }

        result.completion_token_count = self.tokens.count(&result.text);
        let usage = TokenUsage::new(
            self.tokens.count(&request.message),
            result.completion_token_count,
        );
        if result.soft_stopped {
            debug!(%request_id, "reply ended on soft stop");
        }
        log_request_complete(&request.model, &usage, started);

        Ok(ChatOutcome {
            text: result.text,
            conversation_id: result.conversation_id,
            response_id: result.response_id,
            is_new_conversation: is_new,
            model: request.model.clone(),
            model_mode: request.model_mode,
            usage,
        })
    }
}
