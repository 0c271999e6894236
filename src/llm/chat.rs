//! Interactive chat side channel.
//!
//! Shares the streaming decoder with the segmentation pipeline but serves
//! live display instead: deltas accumulate in a buffer that is flushed to
//! the caller on size, punctuation, newline, or elapsed-time heuristics.

use std::time::{Duration, Instant};

use reqwest::Client;

use super::stream::{CancelToken, CompletionStream};
use super::Message;
use crate::config::LlmConfig;
use crate::error::Result;

const FLUSH_MAX_CHARS: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_millis(200);
/// Sentence-terminal marks, full-width and half-width.
const TERMINAL_MARKS: [char; 6] = ['。', '！', '？', '.', '!', '?'];

/// Buffers streamed deltas and decides when to hand text to the caller.
pub(crate) struct FlushBuffer {
    buffer: String,
    last_flush: Instant,
}

impl FlushBuffer {
    pub(crate) fn new() -> Self {
        Self {
            buffer: String::new(),
            last_flush: Instant::now(),
        }
    }

    /// Append a delta; returns buffered text when a flush condition holds.
    pub(crate) fn push(&mut self, delta: &str) -> Option<String> {
        self.buffer.push_str(delta);

        let terminal = delta
            .chars()
            .last()
            .is_some_and(|c| TERMINAL_MARKS.contains(&c));
        let newline = delta.ends_with('\n');

        if self.buffer.chars().count() >= FLUSH_MAX_CHARS
            || terminal
            || newline
            || self.last_flush.elapsed() >= FLUSH_INTERVAL
        {
            self.last_flush = Instant::now();
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    /// Remaining buffered text, if any. Called at stream end so no content
    /// is lost on abrupt termination.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }
}

/// A conversation with the chat endpoint.
///
/// Keeps an ordered role-tagged history that is prepended to every request.
/// Each session is an independent task; concurrent sessions do not share
/// state.
pub struct ChatSession {
    config: LlmConfig,
    client: Client,
    history: Vec<Message>,
}

impl ChatSession {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            history: Vec::new(),
        }
    }

    /// Send a user message and stream the reply.
    ///
    /// `on_text` receives display-ready text chunks per the flush
    /// heuristics. The full reply is appended to the history and returned.
    /// Cancellation stops delivery immediately; the history then keeps the
    /// user message but no assistant reply.
    pub async fn send<F>(
        &mut self,
        message: &str,
        cancel: CancelToken,
        mut on_text: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        self.history.push(Message::user(message));

        let stream =
            CompletionStream::open(&self.client, &self.config, &self.history, cancel).await?;

        let mut flush = FlushBuffer::new();
        let reply = stream
            .collect_with(|delta| {
                if let Some(text) = flush.push(delta) {
                    on_text(&text);
                }
            })
            .await?;

        if let Some(rest) = flush.finish() {
            on_text(&rest);
        }

        self.history.push(Message::assistant(&reply));
        Ok(reply)
    }

    /// Conversation history so far.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Reset the conversation.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}
