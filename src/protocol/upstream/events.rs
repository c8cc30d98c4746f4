//! Field extraction for one decoded line of the response stream.
//!
//! The backend mixes several record kinds on the same stream: token deltas,
//! full-message corrections and metadata-only lines, with or without the
//! `response`/`conversation` wrappers. Every field path is optional and is
//! read independently.

use serde_json::Value;
use smallvec::SmallVec;

/// One state change derived from a stream record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPatch {
    /// Append an incremental text fragment.
    AppendToken(String),
    /// Replace all text accumulated so far.
    ReplaceText(String),
    SetResponseId(String),
    SetConversationId(String),
    /// Graceful end of turn; no further lines are consumed.
    SoftStop,
}

pub type EventPatches = SmallVec<[EventPatch; 4]>;

#[inline]
fn str_field<'a>(object: &'a Value, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str)
}

#[inline]
fn push_token(out: &mut EventPatches, object: &Value) {
    if let Some(token) = str_field(object, "token").filter(|t| !t.is_empty()) {
        out.push(EventPatch::AppendToken(token.to_owned()));
    }
}

#[inline]
fn push_id(out: &mut EventPatches, object: &Value, key: &str, patch: fn(String) -> EventPatch) {
    if let Some(id) = str_field(object, key) {
        out.push(patch(id.to_owned()));
    }
}

/// Extract the patches carried by one decoded record, in application order.
///
/// Records without a top-level `result` object yield nothing.
#[must_use]
pub fn extract_patches(record: &Value) -> EventPatches {
    let mut out = EventPatches::new();
    let Some(result) = record.get("result").filter(|r| r.is_object()) else {
        return out;
    };

    if let Some(response) = result.get("response").filter(|r| r.is_object()) {
        push_token(&mut out, response);
        push_id(&mut out, response, "responseId", EventPatch::SetResponseId);

        if let Some(model_response) = response.get("modelResponse").filter(|m| m.is_object()) {
            if let Some(message) = str_field(model_response, "message") {
                out.push(EventPatch::ReplaceText(message.to_owned()));
            }
            push_id(
                &mut out,
                model_response,
                "responseId",
                EventPatch::SetResponseId,
            );
        }

        if response.get("isSoftStop").and_then(Value::as_bool) == Some(true) {
            out.push(EventPatch::SoftStop);
        }
    }

    if let Some(conversation) = result.get("conversation").filter(|c| c.is_object()) {
        push_id(
            &mut out,
            conversation,
            "conversationId",
            EventPatch::SetConversationId,
        );
    }

    push_token(&mut out, result);
    push_id(
        &mut out,
        result,
        "conversationId",
        EventPatch::SetConversationId,
    );
    push_id(&mut out, result, "responseId", EventPatch::SetResponseId);

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patches(record: Value) -> Vec<EventPatch> {
        extract_patches(&record).into_vec()
    }

    #[test]
    fn test_record_without_result_is_ignored() {
        assert!(patches(json!({"error": {"code": 1}})).is_empty());
        assert!(patches(json!({"result": "not-an-object"})).is_empty());
    }

    #[test]
    fn test_nested_token_and_ids() {
        let out = patches(json!({
            "result": {
                "response": {"token": " there", "responseId": "r1"},
                "conversation": {"conversationId": "c1"}
            }
        }));
        assert_eq!(
            out,
            vec![
                EventPatch::AppendToken(" there".into()),
                EventPatch::SetResponseId("r1".into()),
                EventPatch::SetConversationId("c1".into()),
            ]
        );
    }

    #[test]
    fn test_empty_and_non_string_tokens_are_skipped() {
        assert!(patches(json!({"result": {"response": {"token": ""}}})).is_empty());
        assert!(patches(json!({"result": {"response": {"token": 7}}})).is_empty());
        assert!(patches(json!({"result": {"response": {"responseId": null}}})).is_empty());
    }

    #[test]
    fn test_model_response_replaces_text() {
        let out = patches(json!({
            "result": {"response": {"modelResponse": {
                "message": "Full corrected text",
                "responseId": "r9"
            }}}
        }));
        assert_eq!(
            out,
            vec![
                EventPatch::ReplaceText("Full corrected text".into()),
                EventPatch::SetResponseId("r9".into()),
            ]
        );
    }

    #[test]
    fn test_soft_stop_only_when_true() {
        assert_eq!(
            patches(json!({"result": {"response": {"isSoftStop": true}}})),
            vec![EventPatch::SoftStop]
        );
        assert!(patches(json!({"result": {"response": {"isSoftStop": false}}})).is_empty());
        assert!(patches(json!({"result": {"response": {"isSoftStop": "true"}}})).is_empty());
    }

    #[test]
    fn test_flat_fallback_fields() {
        let out = patches(json!({
            "result": {"token": "Hi", "conversationId": "c2", "responseId": "r2"}
        }));
        assert_eq!(
            out,
            vec![
                EventPatch::AppendToken("Hi".into()),
                EventPatch::SetConversationId("c2".into()),
                EventPatch::SetResponseId("r2".into()),
            ]
        );
    }

    #[test]
    fn test_key_order_within_record_does_not_matter() {
        let a: Value =
            serde_json::from_str(r#"{"result":{"conversationId":"c1","token":"x"}}"#).unwrap();
        let b: Value =
            serde_json::from_str(r#"{"result":{"token":"x","conversationId":"c1"}}"#).unwrap();
        assert_eq!(extract_patches(&a), extract_patches(&b));
    }
}
