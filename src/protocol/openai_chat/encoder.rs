use crate::routing::ChatOutcome;

use super::{
    OpenAiChatResponse, OpenAiChoice, OpenAiConversation, OpenAiResponseMessage, OpenAiUsage,
};

/// Encode a finished exchange into the `OpenAI` Chat Completions wire format.
#[must_use]
pub fn encode_openai_chat_response(
    outcome: ChatOutcome,
    id: String,
    created: u64,
) -> OpenAiChatResponse {
    OpenAiChatResponse {
        id,
        object: "chat.completion".to_string(),
        created,
        model: outcome.model,
        choices: vec![OpenAiChoice {
            index: 0,
            message: OpenAiResponseMessage {
                role: "assistant".to_string(),
                content: outcome.text,
            },
            finish_reason: "stop".to_string(),
        }],
        usage: OpenAiUsage {
            prompt_tokens: outcome.usage.prompt_tokens,
            completion_tokens: outcome.usage.completion_tokens,
            total_tokens: outcome.usage.total_tokens,
        },
        conversation: OpenAiConversation {
            conversation_id: outcome.conversation_id,
            response_id: outcome.response_id,
            is_new_conversation: outcome.is_new_conversation,
        },
    }
}
