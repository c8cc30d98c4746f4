//! Wire types and codecs for the backend's conversation API.

pub mod events;
pub mod parser;
pub mod payload;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use events::{extract_patches, EventPatch};
pub use parser::{AccumulatedResult, StreamEventParser};
pub use payload::{build_payload, UpstreamPayload};

/// Backend generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelMode {
    #[default]
    #[serde(rename = "MODEL_MODE_AUTO")]
    Auto,
    #[serde(rename = "MODEL_MODE_FAST")]
    Fast,
    #[serde(rename = "MODEL_MODE_ACCURATE")]
    Accurate,
    #[serde(rename = "MODEL_MODE_REASONING")]
    Reasoning,
}

impl ModelMode {
    pub const ALL: [ModelMode; 4] = [
        ModelMode::Auto,
        ModelMode::Fast,
        ModelMode::Accurate,
        ModelMode::Reasoning,
    ];

    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            ModelMode::Auto => "MODEL_MODE_AUTO",
            ModelMode::Fast => "MODEL_MODE_FAST",
            ModelMode::Accurate => "MODEL_MODE_ACCURATE",
            ModelMode::Reasoning => "MODEL_MODE_REASONING",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ModelMode::Auto => "Automatically pick the most suitable mode",
            ModelMode::Fast => "Fast responses",
            ModelMode::Accurate => "Accurate responses",
            ModelMode::Reasoning => "Extended reasoning",
        }
    }

    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.as_wire() == value)
    }

    /// Parse a client-supplied mode; anything unrecognized becomes [`ModelMode::Auto`].
    #[must_use]
    pub fn coerce(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return ModelMode::Auto;
        };
        Self::from_wire(value).unwrap_or_else(|| {
            tracing::warn!(model_mode = value, "unsupported modelMode, using MODEL_MODE_AUTO");
            ModelMode::Auto
        })
    }
}

impl fmt::Display for ModelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Caller-held handles identifying an existing conversation turn.
///
/// Empty strings are treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationRef {
    conversation_id: Option<String>,
    parent_response_id: Option<String>,
}

impl ConversationRef {
    #[must_use]
    pub fn new(conversation_id: Option<String>, parent_response_id: Option<String>) -> Self {
        Self {
            conversation_id: non_empty(conversation_id),
            parent_response_id: non_empty(parent_response_id),
        }
    }

    #[must_use]
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    #[must_use]
    pub fn parent_response_id(&self) -> Option<&str> {
        self.parent_response_id.as_deref()
    }

    /// `(conversation_id, parent_response_id)` when both are present.
    #[must_use]
    pub fn continuation(&self) -> Option<(&str, &str)> {
        match (&self.conversation_id, &self.parent_response_id) {
            (Some(conversation), Some(parent)) => Some((conversation, parent)),
            _ => None,
        }
    }

    /// True unless both identifiers are present.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.continuation().is_none()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// One relay request after ingress-specific decoding.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub model: String,
    pub model_mode: ModelMode,
    pub conversation: ConversationRef,
    /// Per-request cookie; the configured fallback applies when `None`.
    pub credential: Option<String>,
}

impl ChatRequest {
    #[must_use]
    pub fn new(message: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            model: model.into(),
            model_mode: ModelMode::Auto,
            conversation: ConversationRef::default(),
            credential: None,
        }
    }
}
