//! Language-model integration.
//!
//! Streaming consumption of chat-completion endpoints, reconstruction of
//! role-tagged segments from model output, and the interactive chat side
//! channel.

pub mod chat;
pub mod segment;
pub mod stream;

use serde::{Deserialize, Serialize};

/// One chat message in an LLM request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}
