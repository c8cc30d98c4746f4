mod request_id;

use std::sync::Arc;

use bytes::Bytes;

use crate::api::models::build_models_response_body;
use crate::config::AppConfig;
use crate::error::RelayError;
use crate::observability::TokenEstimator;
use crate::routing::ConversationRouter;
use crate::transport::{HttpTransport, PreparedUpstream};
use crate::util::completion_id;

pub(crate) use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers. Read-only after startup.
pub struct AppState {
    pub config: AppConfig,
    pub router: ConversationRouter,
    tokens: Arc<TokenEstimator>,
    request_ids: RequestIdGenerator,
    models_response_body: Bytes,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, router: ConversationRouter, tokens: Arc<TokenEstimator>) -> Self {
        let models_response_body = build_models_response_body(&config.features.models);
        Self {
            config,
            router,
            tokens,
            request_ids: RequestIdGenerator::new(),
            models_response_body,
        }
    }

    /// Wire up the transport, upstream and estimator from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the upstream section cannot be prepared.
    pub fn from_config(config: AppConfig) -> Result<Self, RelayError> {
        let tokens = Arc::new(TokenEstimator::new(config.features.token_counter));
        let upstream = PreparedUpstream::new(&config.upstream)?;
        let transport = HttpTransport::new(&config.server);
        let router = ConversationRouter::new(upstream, transport, Arc::clone(&tokens));
        Ok(Self::new(config, router, tokens))
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenEstimator {
        &self.tokens
    }

    /// Fresh `chatcmpl-` id shared by every frame of one completion.
    #[must_use]
    pub fn next_completion_id(&self) -> String {
        completion_id(self.request_ids.next_uuid())
    }

    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }
}
