//! Speech synthesis against a GPT-SoVITS backend.
//!
//! The backend holds the active model weights as global state, so each
//! segment is processed as an atomic configuration-plus-synthesis unit and
//! dispatch is strictly sequential. A failed segment becomes an explicit
//! placeholder so one bad segment never loses prior work.

pub mod voice;

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, error, info};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde::Serialize;

use crate::error::{NovelVoiceError, Result};
use crate::llm::segment::{Segment, NARRATOR_ROLE};
use crate::progress::ProgressTracker;
use crate::utils::temp::ArtifactStore;
use voice::{VoiceProfile, VoiceRegistry};

// Synthesis of a long segment can take minutes.
static API_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(300))
        .build()
        .expect("Failed to create HTTP client")
});

/// Reference to one segment's synthesized audio.
///
/// Artifacts are positional: the assembler consumes them in the order the
/// dispatcher produced them, never by filename or modification time. A
/// `Placeholder` marks a failed segment; it contributes no audio but
/// preserves its position.
#[derive(Debug, PartialEq, Eq)]
pub enum AudioArtifact {
    File(PathBuf),
    Placeholder,
}

impl AudioArtifact {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Placeholder => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    text_lang: &'a str,
    ref_audio_path: &'a str,
    prompt_text: &'a str,
    prompt_lang: &'a str,
    text_split_method: &'a str,
    batch_size: u32,
    media_type: &'a str,
    streaming_mode: bool,
    speed_factor: f32,
    top_k: u32,
    top_p: f32,
    temperature: f32,
    repetition_penalty: f32,
}

/// Client for the GPT-SoVITS HTTP API.
pub struct SynthesisClient {
    base_url: String,
}

impl SynthesisClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    /// Select the active GPT weights on the backend. Idempotent.
    pub async fn set_gpt_weights(&self, weights_path: &str) -> Result<()> {
        let url = format!("{}/set_gpt_weights", self.base_url);
        let response = API_CLIENT
            .get(&url)
            .query(&[("weights_path", weights_path)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Select the active SoVITS weights on the backend. Idempotent.
    pub async fn set_sovits_weights(&self, weights_path: &str) -> Result<()> {
        let url = format!("{}/set_sovits_weights", self.base_url);
        let response = API_CLIENT
            .get(&url)
            .query(&[("weights_path", weights_path)])
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Synthesize one utterance with the currently selected weights,
    /// returning raw WAV bytes.
    pub async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<Bytes> {
        let url = format!("{}/tts", self.base_url);
        let request = TtsRequest {
            text,
            text_lang: "zh",
            ref_audio_path: &profile.ref_audio_path,
            prompt_text: &profile.ref_text,
            prompt_lang: "zh",
            text_split_method: "cut5",
            batch_size: 1,
            media_type: "wav",
            streaming_mode: false,
            speed_factor: profile.speed_factor,
            top_k: profile.top_k,
            top_p: profile.top_p,
            temperature: profile.temperature,
            repetition_penalty: profile.repetition_penalty,
        };

        let response = API_CLIENT.post(&url).json(&request).send().await?;
        let response = check_status(response).await?;
        Ok(response.bytes().await?)
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(NovelVoiceError::Transport {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Whether a segment is dropped from dispatch entirely (no calls, no
/// artifact): narrator segments while narration is disabled.
pub(crate) fn is_skipped(segment: &Segment, registry: &VoiceRegistry) -> bool {
    !registry.narration_enabled() && segment.role == NARRATOR_ROLE
}

/// Synthesize segments in order, one at a time.
///
/// Weight selection mutates backend state shared across segments, so the
/// loop must stay sequential. Per-segment failures are logged and recovered
/// as placeholders; only the artifact list itself is returned.
pub async fn synthesize_segments(
    client: &SynthesisClient,
    segments: &[Segment],
    registry: &mut VoiceRegistry,
    store: &ArtifactStore,
    tracker: Option<&ProgressTracker>,
) -> Result<Vec<AudioArtifact>> {
    let total = segments.len();
    let mut artifacts = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        if is_skipped(segment, registry) {
            debug!(
                "Narration disabled, skipping narrator segment {}/{}",
                i + 1,
                total
            );
            continue;
        }

        if let Some(t) = tracker {
            t.update_step_progress(
                (i as f32 / total as f32) * 100.0,
                Some(format!(
                    "Synthesizing segment {}/{} ({})",
                    i + 1,
                    total,
                    segment.role
                )),
            );
        }

        let profile = registry.get(&segment.role).clone();
        match synthesize_one(client, segment, &profile, store).await {
            Ok(path) => {
                info!(
                    "Synthesized segment {}/{} ({}) to {}",
                    i + 1,
                    total,
                    segment.role,
                    path.display()
                );
                artifacts.push(AudioArtifact::File(path));
            }
            Err(e) => {
                error!(
                    "Synthesis failed for segment {}/{} ({}): {}",
                    i + 1,
                    total,
                    segment.role,
                    e
                );
                artifacts.push(AudioArtifact::Placeholder);
            }
        }
    }

    Ok(artifacts)
}

/// Configuration and synthesis for a single segment, as one atomic unit
/// against the backend's global weight state.
async fn synthesize_one(
    client: &SynthesisClient,
    segment: &Segment,
    profile: &VoiceProfile,
    store: &ArtifactStore,
) -> Result<PathBuf> {
    profile.validate()?;

    client.set_gpt_weights(&profile.gpt_weights_path).await?;
    client.set_sovits_weights(&profile.sovits_weights_path).await?;

    let bytes = client.synthesize(&segment.text, profile).await?;
    if bytes.is_empty() {
        return Err(NovelVoiceError::Synthesis {
            role: segment.role.clone(),
            message: "backend returned an empty audio body".to_string(),
        });
    }

    let path = store.artifact_path(&segment.role);
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}
