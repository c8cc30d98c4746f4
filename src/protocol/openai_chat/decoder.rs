use serde_json::Value;

use crate::error::RelayError;
use crate::protocol::upstream::{ChatRequest, ConversationRef, ModelMode};

use super::{OpenAiChatRequest, OpenAiMessage};

/// Decode an `OpenAI` chat request into a single backend message.
///
/// Only the last `system` and the last `user` message are used; the system
/// text is prefixed to the user text, separated by a blank line. Returns the
/// request and whether the client asked for a stream.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] when there is no usable user message.
pub fn decode_openai_chat_request(
    req: OpenAiChatRequest,
    default_model: &str,
) -> Result<(ChatRequest, bool), RelayError> {
    let mut system: Option<&OpenAiMessage> = None;
    let mut user: Option<&OpenAiMessage> = None;
    for msg in &req.messages {
        match msg.role.as_str() {
            "system" => system = Some(msg),
            "user" => user = Some(msg),
            _ => {}
        }
    }

    let user_text = user
        .and_then(|msg| extract_text_content(msg.content.as_ref()))
        .filter(|text| !text.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest("No user message found".into()))?;

    let message = match system
        .and_then(|msg| extract_text_content(msg.content.as_ref()))
        .filter(|text| !text.is_empty())
    {
        Some(system_text) => {
            let mut joined = String::with_capacity(system_text.len() + 2 + user_text.len());
            joined.push_str(&system_text);
            joined.push_str("\n\n");
            joined.push_str(&user_text);
            joined
        }
        None => user_text,
    };

    let model = req
        .model
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| default_model.to_string());
    let metadata = req.metadata.unwrap_or_default();

    let request = ChatRequest {
        message,
        model,
        model_mode: ModelMode::coerce(metadata.model_mode.as_deref()),
        conversation: ConversationRef::new(metadata.conversation_id, metadata.parent_response_id),
        credential: metadata.cookie,
    };
    Ok((request, req.stream.unwrap_or(false)))
}

/// Extract plain text from an `OpenAI` message content field.
fn extract_text_content(content: Option<&Value>) -> Option<String> {
    match content {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(arr)) => {
            let mut text = String::new();
            for part in arr {
                if part.get("type").and_then(|t| t.as_str()) != Some("text") {
                    continue;
                }
                if let Some(content) = part.get("text").and_then(|t| t.as_str()) {
                    text.push_str(content);
                }
            }
            if text.is_empty() {
                None
            } else {
                Some(text)
            }
        }
        None | Some(_) => None,
    }
}
