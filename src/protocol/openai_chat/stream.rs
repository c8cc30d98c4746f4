use bytes::Bytes;
use serde::Serialize;

use crate::error::RelayError;
use crate::protocol::error_shapes::openai_error_payload;

use super::{OpenAiDelta, OpenAiStreamChoice, OpenAiStreamChunk};

pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";
const FALLBACK_ERROR_FRAME: &[u8] =
    b"data: {\"error\":{\"message\":\"internal error\",\"type\":\"server_error\",\"code\":\"server_error\",\"param\":null}}\n\n";

fn sse_data_frame<T: Serialize>(value: &T) -> Result<Bytes, serde_json::Error> {
    let mut out = Vec::with_capacity(160);
    out.extend_from_slice(b"data: ");
    serde_json::to_writer(&mut out, value)?;
    out.extend_from_slice(b"\n\n");
    Ok(Bytes::from(out))
}

fn chunk(
    id: &str,
    model: &str,
    created: u64,
    delta: OpenAiDelta,
    finish: Option<&str>,
) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: id.to_string(),
        object: "chat.completion.chunk".to_string(),
        created,
        model: model.to_string(),
        choices: vec![OpenAiStreamChoice {
            index: 0,
            delta,
            finish_reason: finish.map(str::to_string),
        }],
    }
}

/// SSE frames for a finished reply: role, content, stop, then `[DONE]`.
///
/// # Errors
///
/// Returns [`RelayError::Internal`] if a chunk fails to serialize.
pub fn encode_completion_frames(
    text: &str,
    model: &str,
    id: &str,
    created: u64,
) -> Result<Vec<Bytes>, RelayError> {
    let chunks = [
        chunk(
            id,
            model,
            created,
            OpenAiDelta {
                role: Some("assistant".to_string()),
                content: None,
            },
            None,
        ),
        chunk(
            id,
            model,
            created,
            OpenAiDelta {
                role: None,
                content: Some(text.to_string()),
            },
            None,
        ),
        chunk(id, model, created, OpenAiDelta::default(), Some("stop")),
    ];

    let mut frames = Vec::with_capacity(chunks.len() + 1);
    for chunk in &chunks {
        frames.push(
            sse_data_frame(chunk)
                .map_err(|err| RelayError::Internal(format!("failed to encode chunk: {err}")))?,
        );
    }
    frames.push(Bytes::from_static(DONE_FRAME));
    Ok(frames)
}

/// In-band failure: one error frame, then `[DONE]`.
#[must_use]
pub fn encode_error_frames(err: &RelayError) -> Vec<Bytes> {
    let payload = openai_error_payload(err.category(), &err.to_string());
    let frame =
        sse_data_frame(&payload).unwrap_or_else(|_| Bytes::from_static(FALLBACK_ERROR_FRAME));
    vec![frame, Bytes::from_static(DONE_FRAME)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn frame_json(frame: &Bytes) -> Value {
        let text = std::str::from_utf8(frame).unwrap();
        let payload = text
            .strip_prefix("data: ")
            .and_then(|rest| rest.strip_suffix("\n\n"))
            .unwrap();
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn test_three_chunks_then_done() {
        let frames = encode_completion_frames("Hi \"there\"\n", "grok-3", "chatcmpl-7", 42).unwrap();
        assert_eq!(frames.len(), 4);

        let role = frame_json(&frames[0]);
        assert_eq!(role["object"], "chat.completion.chunk");
        assert_eq!(role["choices"][0]["delta"], serde_json::json!({"role": "assistant"}));
        assert!(role["choices"][0]["finish_reason"].is_null());

        let content = frame_json(&frames[1]);
        assert_eq!(content["choices"][0]["delta"]["content"], "Hi \"there\"\n");

        let stop = frame_json(&frames[2]);
        assert_eq!(stop["choices"][0]["delta"], serde_json::json!({}));
        assert_eq!(stop["choices"][0]["finish_reason"], "stop");

        for frame in &frames[..3] {
            let value = frame_json(frame);
            assert_eq!(value["id"], "chatcmpl-7");
            assert_eq!(value["created"], 42);
            assert_eq!(value["model"], "grok-3");
        }
        assert_eq!(frames[3].as_ref(), DONE_FRAME);
    }

    #[test]
    fn test_empty_reply_still_emits_three_chunks() {
        let frames = encode_completion_frames("", "grok-3", "chatcmpl-8", 7).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(
            frame_json(&frames[0])["choices"][0]["delta"],
            serde_json::json!({"role": "assistant"})
        );
        assert_eq!(
            frame_json(&frames[1])["choices"][0]["delta"],
            serde_json::json!({"content": ""})
        );
        assert_eq!(frame_json(&frames[2])["choices"][0]["finish_reason"], "stop");
        assert_eq!(frames[3].as_ref(), DONE_FRAME);
    }

    #[test]
    fn test_error_frames() {
        let frames = encode_error_frames(&RelayError::Upstream {
            status: 503,
            body: "busy".into(),
        });
        assert_eq!(frames.len(), 2);
        let error = frame_json(&frames[0]);
        assert_eq!(error["error"]["type"], "upstream_error");
        assert!(error["error"]["message"]
            .as_str()
            .unwrap()
            .contains("status 503"));
        assert_eq!(frames[1].as_ref(), DONE_FRAME);
    }
}
