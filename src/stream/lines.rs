/// Newline-delimited record framing for the upstream response body.
///
/// Body chunks arrive on arbitrary byte boundaries; a record may be split
/// across any number of chunks. Lines are yielded as raw bytes so UTF-8
/// validation happens per record, not per chunk.
use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use memchr::memchr;

/// Longest record kept in memory; anything beyond is cut off.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Incremental line splitter.
///
/// A line longer than the cap is emitted as its first `max_line` bytes, which
/// fail to decode downstream and are counted as malformed; the remainder up
/// to the next `\n` is dropped.
pub struct LineSplitter {
    buffer: BytesMut,
    max_line: usize,
    discarding: bool,
}

#[inline]
fn strip_cr(mut line: Bytes) -> Bytes {
    if line.last().copied() == Some(b'\r') {
        line.truncate(line.len() - 1);
    }
    line
}

impl LineSplitter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }

    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_line: max_line.max(1),
            discarding: false,
        }
    }

    /// Feed a body chunk and return every line it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut out = VecDeque::new();
        self.feed_into(chunk, &mut out);
        out.into()
    }

    /// Feed a body chunk and append completed lines (without `\n` / `\r\n`).
    pub fn feed_into(&mut self, mut chunk: &[u8], out: &mut VecDeque<Bytes>) {
        if self.discarding {
            match memchr(b'\n', chunk) {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return,
            }
        }
        if chunk.is_empty() {
            return;
        }
        let mut scan_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);
        while let Some(rel_pos) = memchr(b'\n', &self.buffer[scan_from..]) {
            let line_end = scan_from + rel_pos;
            let mut line = self.buffer.split_to(line_end + 1).freeze();
            line.truncate(line_end);
            if line.len() > self.max_line {
                line.truncate(self.max_line);
            }
            out.push_back(strip_cr(line));
            scan_from = 0;
        }
        if self.buffer.len() > self.max_line {
            let mut head = self.buffer.split().freeze();
            head.truncate(self.max_line);
            out.push_back(head);
            self.discarding = true;
        }
    }

    /// Take the trailing unterminated line, if any.
    pub fn finish(&mut self) -> Option<Bytes> {
        self.discarding = false;
        if self.buffer.is_empty() {
            return None;
        }
        Some(strip_cr(self.buffer.split().freeze()))
    }

    /// Bytes held for an incomplete line.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a body byte stream into a stream of lines.
///
/// The first error is forwarded and ends the stream; a partial line buffered
/// at that point is dropped. At a clean end of body the trailing unterminated
/// line is yielded.
pub fn ndjson_line_stream<S, E>(byte_stream: S) -> impl Stream<Item = Result<Bytes, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    use futures_util::StreamExt;

    futures_util::stream::unfold(
        (
            Box::pin(byte_stream),
            LineSplitter::new(),
            VecDeque::<Bytes>::with_capacity(8),
            false,
        ),
        |(mut stream, mut splitter, mut pending, mut done)| async move {
            loop {
                if let Some(line) = pending.pop_front() {
                    return Some((Ok(line), (stream, splitter, pending, done)));
                }
                if done {
                    return None;
                }

                match stream.as_mut().next().await {
                    Some(Ok(chunk)) => splitter.feed_into(&chunk, &mut pending),
                    Some(Err(err)) => {
                        done = true;
                        return Some((Err(err), (stream, splitter, pending, done)));
                    }
                    None => {
                        done = true;
                        if let Some(last) = splitter.finish() {
                            pending.push_back(last);
                        }
                    }
                }
            }
        },
    )
}
