//! Error types for the novel-voice library.

use thiserror::Error;

/// Errors produced by the narration pipeline and its side channels.
#[derive(Debug, Error)]
pub enum NovelVoiceError {
    /// An HTTP call returned a non-success status.
    #[error("API request failed with status {status}: {body}")]
    Transport { status: u16, body: String },

    /// HTTP request error (connection, timeout, protocol).
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The accumulated model output could not be decoded into segments,
    /// even after the repair pass. Carries the raw text for diagnosis.
    #[error("dialogue segmentation failed: {message}")]
    Segmentation { message: String, raw: String },

    /// A single segment's synthesis failed. Recovered locally by the
    /// dispatcher; never escalates out of a pipeline run.
    #[error("speech synthesis failed for role {role}: {message}")]
    Synthesis { role: String, message: String },

    /// Final audio export failed. Temporary artifacts are left in place.
    #[error("audio assembly error: {0}")]
    Assembly(String),

    /// Invalid configuration or voice profile values.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller cancelled an in-flight stream.
    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for the novel-voice library.
pub type Result<T> = std::result::Result<T, NovelVoiceError>;
