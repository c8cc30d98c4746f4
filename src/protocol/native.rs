//! Native chat surface: flat request body, `{success, data}` envelope.

use serde::{Deserialize, Serialize};

use crate::observability::TokenUsage;
use crate::protocol::upstream::{ChatRequest, ConversationRef, ModelMode};
use crate::routing::ChatOutcome;

pub const MESSAGE_REQUIRED: &str = "Message is required";

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NativeChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub model_mode: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub parent_response_id: Option<String>,
}

impl NativeChatRequest {
    /// Normalize into a [`ChatRequest`]; `None` when the message is empty.
    #[must_use]
    pub fn into_chat_request(self, default_model: &str) -> Option<ChatRequest> {
        if self.message.trim().is_empty() {
            return None;
        }
        let model = self
            .model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| default_model.to_string());
        Some(ChatRequest {
            message: self.message,
            model,
            model_mode: ModelMode::coerce(self.model_mode.as_deref()),
            conversation: ConversationRef::new(self.conversation_id, self.parent_response_id),
            credential: self.cookie,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NativeChatData {
    pub response: String,
    pub conversation_id: Option<String>,
    pub response_id: Option<String>,
    pub is_new_conversation: bool,
    pub model_used: String,
    pub model_mode_used: ModelMode,
    pub token_usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize)]
pub struct NativeChatResponse {
    pub success: bool,
    pub data: NativeChatData,
}

#[must_use]
pub fn encode_native_response(outcome: ChatOutcome) -> NativeChatResponse {
    NativeChatResponse {
        success: true,
        data: NativeChatData {
            response: outcome.text,
            conversation_id: outcome.conversation_id,
            response_id: outcome.response_id,
            is_new_conversation: outcome.is_new_conversation,
            model_used: outcome.model,
            model_mode_used: outcome.model_mode,
            token_usage: outcome.usage,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_and_mode_coercion() {
        let request: NativeChatRequest = serde_json::from_value(json!({
            "message": "Hello",
            "model_mode": "MODEL_MODE_TURBO",
            "conversation_id": "c1"
        }))
        .unwrap();
        let chat = request.into_chat_request("grok-3").unwrap();
        assert_eq!(chat.model, "grok-3");
        assert_eq!(chat.model_mode, ModelMode::Auto);
        assert_eq!(chat.conversation.conversation_id(), Some("c1"));
        assert!(chat.conversation.is_new());
        assert!(chat.credential.is_none());
    }

    #[test]
    fn test_empty_message_is_rejected() {
        let request: NativeChatRequest = serde_json::from_value(json!({"message": "  "})).unwrap();
        assert!(request.into_chat_request("grok-3").is_none());
        assert!(NativeChatRequest::default().into_chat_request("grok-3").is_none());
    }

    #[test]
    fn test_response_envelope() {
        let outcome = ChatOutcome {
            text: "Hi there".into(),
            conversation_id: Some("c1".into()),
            response_id: Some("r1".into()),
            is_new_conversation: true,
            model: "grok-3".into(),
            model_mode: ModelMode::Reasoning,
            usage: TokenUsage::new(1, 2),
        };
        let value = serde_json::to_value(encode_native_response(outcome)).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "data": {
                    "response": "Hi there",
                    "conversation_id": "c1",
                    "response_id": "r1",
                    "is_new_conversation": true,
                    "model_used": "grok-3",
                    "model_mode_used": "MODEL_MODE_REASONING",
                    "token_usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
                }
            })
        );
    }
}
