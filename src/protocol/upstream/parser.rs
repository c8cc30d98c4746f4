use std::ops::ControlFlow;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tracing::{debug, warn};

use super::events::{extract_patches, EventPatch};
use crate::error::RelayError;

const LOGGED_LEADING_LINES: u64 = 5;
const LOGGED_LINE_PREVIEW_CHARS: usize = 200;

/// Text and identifiers folded from one response stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccumulatedResult {
    pub text: String,
    pub response_id: Option<String>,
    pub conversation_id: Option<String>,
    /// Filled in by the caller once the final text is known.
    pub completion_token_count: u64,
    /// Non-blank lines seen, including malformed ones.
    pub lines_processed: u64,
    pub malformed_lines: u64,
    /// The stream ended on an upstream soft-stop signal.
    pub soft_stopped: bool,
    /// Set when the body broke off before a clean end.
    pub interrupted: Option<String>,
}

impl AccumulatedResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Incremental fold of stream records into an [`AccumulatedResult`].
#[derive(Debug, Default)]
pub struct StreamEventParser {
    result: AccumulatedResult,
    saw_token: bool,
    saw_replacement: bool,
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(LOGGED_LINE_PREVIEW_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl StreamEventParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one raw line. Returns `Break` once a soft stop has been seen.
    ///
    /// Blank lines are skipped; lines that are not UTF-8 JSON are logged and
    /// counted but never abort the stream.
    pub fn feed_line(&mut self, line: &[u8]) -> ControlFlow<()> {
        if self.result.soft_stopped {
            return ControlFlow::Break(());
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return ControlFlow::Continue(());
        }
        self.result.lines_processed += 1;
        let line_no = self.result.lines_processed;

        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(err) => {
                self.result.malformed_lines += 1;
                warn!(line = line_no, error = %err, "skipping non UTF-8 stream line");
                return ControlFlow::Continue(());
            }
        };
        if line_no <= LOGGED_LEADING_LINES {
            debug!(line = line_no, preview = preview(text), "upstream stream line");
        }

        let record: serde_json::Value = match serde_json::from_str(text) {
            Ok(record) => record,
            Err(err) => {
                self.result.malformed_lines += 1;
                warn!(line = line_no, error = %err, "skipping malformed stream line");
                return ControlFlow::Continue(());
            }
        };

        for patch in extract_patches(&record) {
            self.apply(patch);
        }

        if self.result.soft_stopped {
            debug!(line = line_no, "received soft stop");
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    fn apply(&mut self, patch: EventPatch) {
        match patch {
            EventPatch::AppendToken(token) => {
                self.saw_token = true;
                self.result.text.push_str(&token);
            }
            EventPatch::ReplaceText(message) => {
                if self.saw_token && !self.saw_replacement {
                    debug!(
                        accumulated_len = self.result.text.len(),
                        message_len = message.len(),
                        "full message replaces streamed tokens"
                    );
                }
                self.saw_replacement = true;
                self.result.text = message;
            }
            EventPatch::SetResponseId(id) => self.result.response_id = Some(id),
            EventPatch::SetConversationId(id) => self.result.conversation_id = Some(id),
            EventPatch::SoftStop => self.result.soft_stopped = true,
        }
    }

    #[must_use]
    pub fn finish(self) -> AccumulatedResult {
        debug!(
            lines = self.result.lines_processed,
            malformed = self.result.malformed_lines,
            response_len = self.result.text.len(),
            soft_stopped = self.result.soft_stopped,
            interrupted = self.result.interrupted.is_some(),
            "stream parsing completed"
        );
        self.result
    }

    /// Fold an in-memory sequence of lines.
    #[must_use]
    pub fn parse_lines<I, L>(lines: I) -> AccumulatedResult
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        let mut parser = Self::new();
        for line in lines {
            if parser.feed_line(line.as_ref()).is_break() {
                break;
            }
        }
        parser.finish()
    }

    /// Consume a line stream until it ends or a soft stop arrives.
    ///
    /// A dropped connection ends the sequence early and is recorded in
    /// [`AccumulatedResult::interrupted`]; an idle timeout is an error.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Timeout`] when the line stream reports one.
    pub async fn parse<S>(lines: S) -> Result<AccumulatedResult, RelayError>
    where
        S: Stream<Item = Result<Bytes, RelayError>>,
    {
        let mut lines = std::pin::pin!(lines);
        let mut parser = Self::new();
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    if parser.feed_line(&line).is_break() {
                        break;
                    }
                }
                Err(err @ RelayError::Timeout(_)) => return Err(err),
                Err(err) => {
                    warn!(
                        error = %err,
                        lines = parser.result.lines_processed,
                        "upstream stream ended early"
                    );
                    parser.result.interrupted = Some(match err {
                        RelayError::Transport(reason) => reason,
                        other => other.to_string(),
                    });
                    break;
                }
            }
        }
        Ok(parser.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_STREAM: [&str; 2] = [
        r#"{"result":{"response":{"token":"Hi"}}}"#,
        r#"{"result":{"response":{"token":" there","responseId":"r1"},"conversation":{"conversationId":"c1"}}}"#,
    ];

    #[test]
    fn test_tokens_and_ids_accumulate() {
        let result = StreamEventParser::parse_lines(HELLO_STREAM);
        assert_eq!(result.text, "Hi there");
        assert_eq!(result.response_id.as_deref(), Some("r1"));
        assert_eq!(result.conversation_id.as_deref(), Some("c1"));
        assert_eq!(result.lines_processed, 2);
        assert!(!result.soft_stopped);
    }

    #[test]
    fn test_full_message_replaces_tokens() {
        let result = StreamEventParser::parse_lines([
            r#"{"result":{"response":{"token":"Full "}}}"#,
            r#"{"result":{"response":{"token":"corect"}}}"#,
            r#"{"result":{"response":{"modelResponse":{"message":"Full corrected text","responseId":"r2"}}}}"#,
        ]);
        assert_eq!(result.text, "Full corrected text");
        assert_eq!(result.response_id.as_deref(), Some("r2"));
    }

    #[test]
    fn test_tokens_after_replacement_append() {
        let result = StreamEventParser::parse_lines([
            r#"{"result":{"response":{"modelResponse":{"message":"Base"}}}}"#,
            r#"{"result":{"response":{"token":"!"}}}"#,
        ]);
        assert_eq!(result.text, "Base!");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let lines: [&[u8]; 6] = [
            r#"{"result":{"response":{"token":"a"}}}"#.as_bytes(),
            b"{not json",
            &[0xff, 0xfe, 0x00],
            b"",
            b"   ",
            r#"{"result":{"response":{"token":"b"}}}"#.as_bytes(),
        ];
        let result = StreamEventParser::parse_lines(lines);
        assert_eq!(result.text, "ab");
        assert_eq!(result.malformed_lines, 2);
        assert_eq!(result.lines_processed, 4);
    }

    #[test]
    fn test_soft_stop_ends_consumption() {
        let result = StreamEventParser::parse_lines([
            r#"{"result":{"response":{"token":"done"}}}"#,
            r#"{"result":{"response":{"isSoftStop":true},"conversation":{"conversationId":"c7"}}}"#,
            r#"{"result":{"response":{"token":" ignored"}}}"#,
        ]);
        assert_eq!(result.text, "done");
        assert!(result.soft_stopped);
        assert_eq!(result.conversation_id.as_deref(), Some("c7"));
        assert_eq!(result.lines_processed, 2);
    }

    #[test]
    fn test_later_ids_override_earlier_ones() {
        let result = StreamEventParser::parse_lines([
            r#"{"result":{"responseId":"r1","conversationId":"c1","token":"x"}}"#,
            r#"{"result":{"response":{"responseId":"r2"}}}"#,
            r#"{"result":{"conversation":{"conversationId":"c2"}}}"#,
        ]);
        assert_eq!(result.text, "x");
        assert_eq!(result.response_id.as_deref(), Some("r2"));
        assert_eq!(result.conversation_id.as_deref(), Some("c2"));
    }

    #[test]
    fn test_no_text_is_reported_as_empty() {
        let result = StreamEventParser::parse_lines([
            r#"{"result":{"conversation":{"conversationId":"c1"}}}"#,
            r#"{"other":{}}"#,
        ]);
        assert!(result.is_empty());
        assert_eq!(result.conversation_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_async_parse_records_transport_interruption() {
        let lines = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(br#"{"result":{"token":"partial"}}"#)),
            Err(RelayError::Transport("connection reset".into())),
        ]);
        let result = StreamEventParser::parse(lines).await.unwrap();
        assert_eq!(result.text, "partial");
        assert!(result
            .interrupted
            .as_deref()
            .unwrap()
            .contains("connection reset"));
    }

    #[tokio::test]
    async fn test_async_parse_clean_end_is_not_interrupted() {
        let lines = futures_util::stream::iter(vec![Ok::<_, RelayError>(Bytes::from_static(
            br#"{"result":{"token":"whole"}}"#,
        ))]);
        let result = StreamEventParser::parse(lines).await.unwrap();
        assert_eq!(result.text, "whole");
        assert!(result.interrupted.is_none());
    }

    #[tokio::test]
    async fn test_async_parse_propagates_timeout() {
        let lines = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(br#"{"result":{"token":"partial"}}"#)),
            Err(RelayError::Timeout("idle".into())),
        ]);
        let err = StreamEventParser::parse(lines).await.unwrap_err();
        assert!(matches!(err, RelayError::Timeout(_)));
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "你".repeat(300);
        assert_eq!(preview(&long).chars().count(), LOGGED_LINE_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }
}
