//! Streaming completion consumption.
//!
//! Decodes the `data: <json>` event-stream framing of a chat-completions
//! response into text deltas, yielding each delta as it arrives and
//! accumulating the full response text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::Message;
use crate::config::LlmConfig;
use crate::error::{NovelVoiceError, Result};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

/// Cooperative cancellation flag for in-flight streams.
///
/// Clones share the flag. Once cancelled, the stream stops yielding deltas
/// and surfaces `NovelVoiceError::Cancelled` instead of a final value.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// Incremental event-stream frame decoder.
///
/// Pure byte-in, delta-out state machine, kept separate from the HTTP
/// plumbing. Lines are split on `\n` only, so multi-byte UTF-8 sequences
/// split across network chunks reassemble correctly.
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub(crate) fn new() -> Self {
        Self {
            pending: Vec::new(),
            done: false,
        }
    }

    pub(crate) fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Treat any trailing bytes as a final line. Called when the transport
    /// ends without a terminating newline.
    pub(crate) fn finish(&mut self) {
        if !self.pending.is_empty() && !self.done {
            self.pending.push(b'\n');
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Next decoded text delta, or `None` when no complete frame is
    /// buffered. Frames that are not valid structured data are skipped,
    /// not raised; partial frames are expected mid-stream.
    pub(crate) fn next_frame(&mut self) -> Option<String> {
        while let Some(line) = self.pop_line() {
            if self.done {
                return None;
            }
            let line = line.trim();
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                // Not a data frame (comment, blank line); ignore.
                continue;
            };
            if payload == DONE_MARKER {
                self.done = true;
                return None;
            }
            match serde_json::from_str::<StreamChunk>(payload) {
                Ok(chunk) => {
                    if let Some(content) = chunk
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                    {
                        if !content.is_empty() {
                            return Some(content);
                        }
                    }
                }
                Err(e) => {
                    debug!("Skipping undecodable stream frame: {}", e);
                }
            }
        }
        None
    }

    fn pop_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        let mut line = String::from_utf8_lossy(&line).into_owned();
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }
}

/// A live streaming completion.
///
/// Yields text deltas in arrival order via [`next_delta`](Self::next_delta)
/// and accumulates the full response text. The cancellation token is
/// checked before every yield.
pub struct CompletionStream {
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    accumulated: String,
    cancel: CancelToken,
    ended: bool,
}

impl CompletionStream {
    /// Issue the streaming completion request. A non-success HTTP status is
    /// fatal and yields no deltas.
    pub async fn open(
        client: &Client,
        config: &LlmConfig,
        messages: &[Message],
        cancel: CancelToken,
    ) -> Result<Self> {
        let request = CompletionRequest {
            model: &config.model,
            messages,
            stream: true,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let response = client
            .post(&config.api_url)
            .header("Authorization", format!("Bearer {}", config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Completion request failed with status {}: {}", status, body);
            return Err(NovelVoiceError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Self {
            stream: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            accumulated: String::new(),
            cancel,
            ended: false,
        })
    }

    /// Next text delta, or `None` once the stream has ended (either via the
    /// end marker or because the transport closed).
    pub async fn next_delta(&mut self) -> Result<Option<String>> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(NovelVoiceError::Cancelled);
            }
            if let Some(delta) = self.decoder.next_frame() {
                self.accumulated.push_str(&delta);
                return Ok(Some(delta));
            }
            if self.decoder.is_done() || self.ended {
                return Ok(None);
            }
            match self.stream.next().await {
                Some(Ok(chunk)) => self.decoder.feed(&chunk),
                Some(Err(e)) => return Err(e.into()),
                None => {
                    // Abrupt end without the end marker; whatever is
                    // buffered forms the last frame.
                    self.ended = true;
                    self.decoder.finish();
                }
            }
        }
    }

    /// Text accumulated so far.
    pub fn text(&self) -> &str {
        &self.accumulated
    }

    /// Drain the stream, invoking `on_delta` for every delta in arrival
    /// order, and return the full accumulated text.
    pub async fn collect_with<F>(mut self, mut on_delta: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        while let Some(delta) = self.next_delta().await? {
            on_delta(&delta);
        }
        Ok(self.accumulated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}}}}]}}\n",
            serde_json::to_string(content).unwrap()
        )
    }

    #[test]
    fn test_decodes_frames_in_order() {
        let mut decoder = SseDecoder::new();
        decoder.feed(frame("hello ").as_bytes());
        decoder.feed(frame("world").as_bytes());
        decoder.feed(b"data: [DONE]\n");

        assert_eq!(decoder.next_frame().as_deref(), Some("hello "));
        assert_eq!(decoder.next_frame().as_deref(), Some("world"));
        assert_eq!(decoder.next_frame(), None);
        assert!(decoder.is_done());
    }

    #[test]
    fn test_ignores_non_data_lines() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b": keep-alive\n\n");
        decoder.feed(b"event: message\n");
        decoder.feed(frame("x").as_bytes());

        assert_eq!(decoder.next_frame().as_deref(), Some("x"));
    }

    #[test]
    fn test_skips_undecodable_frames() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: {truncated\n");
        decoder.feed(frame("ok").as_bytes());

        assert_eq!(decoder.next_frame().as_deref(), Some("ok"));
    }

    #[test]
    fn test_skips_frames_without_content() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: {\"choices\":[{\"delta\":{}}]}\n");
        decoder.feed(b"data: {\"choices\":[]}\n");
        decoder.feed(frame("tail").as_bytes());

        assert_eq!(decoder.next_frame().as_deref(), Some("tail"));
    }

    #[test]
    fn test_multibyte_utf8_split_across_chunks() {
        let full = frame("旁白");
        let bytes = full.as_bytes();
        // Split in the middle of a 3-byte character.
        let cut = full.find('旁').unwrap() + 1;

        let mut decoder = SseDecoder::new();
        decoder.feed(&bytes[..cut]);
        assert_eq!(decoder.next_frame(), None);
        decoder.feed(&bytes[cut..]);
        assert_eq!(decoder.next_frame().as_deref(), Some("旁白"));
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        decoder.feed(frame("a").replace('\n', "\r\n").as_bytes());
        assert_eq!(decoder.next_frame().as_deref(), Some("a"));
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseDecoder::new();
        let unterminated = frame("end");
        decoder.feed(unterminated.trim_end().as_bytes());
        assert_eq!(decoder.next_frame(), None);

        decoder.finish();
        assert_eq!(decoder.next_frame().as_deref(), Some("end"));
    }

    #[test]
    fn test_frames_after_done_are_ignored() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"data: [DONE]\n");
        decoder.feed(frame("late").as_bytes());

        assert_eq!(decoder.next_frame(), None);
        assert_eq!(decoder.next_frame(), None);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        clone.cancel();
        assert!(token.is_cancelled());
    }
}
