//! Library configuration.
//!
//! All values carry defaults so a partial JSON config file loads cleanly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::media::audio::DEFAULT_SEGMENT_GAP_MS;

/// Connection settings for one chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Completions endpoint URL
    pub api_url: String,
    /// Bearer token
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Sampling temperature for the completion
    pub temperature: f32,
    /// Completion token limit
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }
}

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NovelVoiceConfig {
    /// Endpoint used for dialogue segmentation
    pub segmentation: LlmConfig,
    /// Endpoint used for the interactive chat side channel
    pub chat: LlmConfig,
    /// Base URL of the GPT-SoVITS synthesis backend
    pub tts_base_url: String,
    /// Directory for per-segment temporary audio artifacts
    pub temp_dir: PathBuf,
    /// Where to write the segmentation result for operator review.
    /// `None` disables the review file.
    pub review_file: Option<PathBuf>,
    /// Silence inserted between consecutive segments, in milliseconds
    pub segment_gap_ms: u64,
    /// Remove per-segment artifacts after a successful final write
    pub cleanup_temp_files: bool,
}

impl Default for NovelVoiceConfig {
    fn default() -> Self {
        Self {
            segmentation: LlmConfig::default(),
            chat: LlmConfig::default(),
            tts_base_url: "http://127.0.0.1:9880".to_string(),
            temp_dir: PathBuf::from("novel_voice_segments"),
            review_file: Some(PathBuf::from("dialogue_split.json")),
            segment_gap_ms: DEFAULT_SEGMENT_GAP_MS,
            cleanup_temp_files: true,
        }
    }
}

impl NovelVoiceConfig {
    /// Load configuration from a JSON file. Missing fields fall back to
    /// their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
