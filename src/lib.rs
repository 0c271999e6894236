//! novel-voice: multi-voice audiobook generation from narrative text.
//!
//! The pipeline streams a chat-completion that splits a novel into
//! role-tagged segments, synthesizes each segment through a GPT-SoVITS
//! backend with per-role voice profiles, and assembles the results into a
//! single WAV file with progress tracking along the way.

pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod notification;
pub mod progress;
pub mod tts;
pub mod utils;

use std::path::Path;

use log::{error, info};

use crate::progress::{ProcessStep, ProgressObserver, ProgressReporter, ProgressTracker};
use crate::tts::SynthesisClient;
use crate::utils::temp::ArtifactStore;

pub use crate::config::{LlmConfig, NovelVoiceConfig};
pub use crate::error::{NovelVoiceError, Result};
pub use crate::llm::chat::ChatSession;
pub use crate::llm::segment::{Segment, NARRATOR_ROLE};
pub use crate::llm::stream::CancelToken;
pub use crate::tts::voice::{VoiceProfile, VoiceRegistry};
pub use crate::tts::AudioArtifact;

/// One narration pipeline instance.
///
/// Owns its voice registry, so concurrent runs against separate instances
/// are safe; a single instance must not run two pipelines at once.
pub struct NovelVoice {
    config: NovelVoiceConfig,
    registry: VoiceRegistry,
    progress_tracker: Option<ProgressTracker>,
}

impl NovelVoice {
    pub fn new(config: NovelVoiceConfig) -> Self {
        Self {
            config,
            registry: VoiceRegistry::new(),
            progress_tracker: None,
        }
    }

    pub fn with_progress_reporter(
        config: NovelVoiceConfig,
        reporter: Box<dyn ProgressReporter>,
    ) -> Self {
        let mut instance = Self::new(config);
        instance.progress_tracker = Some(ProgressTracker::with_reporter(reporter));
        instance
    }

    pub fn set_progress_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        match &mut self.progress_tracker {
            Some(tracker) => tracker.set_reporter(reporter),
            None => self.progress_tracker = Some(ProgressTracker::with_reporter(reporter)),
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> Option<usize> {
        self.progress_tracker
            .as_mut()
            .and_then(|tracker| tracker.add_observer(observer))
    }

    /// Voice profiles and the narration toggle for this instance.
    pub fn registry(&self) -> &VoiceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut VoiceRegistry {
        &mut self.registry
    }

    /// Run the full pipeline: segmentation, per-segment synthesis, audio
    /// assembly. Returns the output path on success.
    ///
    /// Per-segment synthesis failures become silent gaps in the output and
    /// are reported through the log/progress channel only; structural
    /// failures (segmentation, assembly) abort the run.
    pub async fn process(
        &mut self,
        novel_text: &str,
        output_path: &str,
        cancel: CancelToken,
    ) -> Result<String> {
        info!("Starting narration pipeline");
        let tracker = self.progress_tracker.as_ref();

        // 1. Dialogue segmentation
        if let Some(t) = tracker {
            t.set_step(ProcessStep::Segmentation);
            t.update_step_progress(0.0, Some("Requesting dialogue segmentation".to_string()));
        }

        let segments = llm::segment::split_dialogue(
            &self.config.segmentation,
            novel_text,
            self.registry.narration_enabled(),
            cancel,
            tracker,
        )
        .await
        .map_err(|e| {
            error!("Dialogue segmentation failed: {}", e);
            e
        })?;

        self.registry.register_segments(&segments);

        if let Some(path) = &self.config.review_file {
            llm::segment::write_review_file(&segments, path).await?;
        }

        if let Some(t) = tracker {
            t.update_step_progress(
                100.0,
                Some(format!("Segmentation complete: {} segments", segments.len())),
            );
        }

        // 2. Speech synthesis, strictly in segment order
        if let Some(t) = tracker {
            t.set_step(ProcessStep::Synthesis);
        }

        let store = ArtifactStore::new(&self.config.temp_dir)?;
        let client = SynthesisClient::new(&self.config.tts_base_url);
        let artifacts =
            tts::synthesize_segments(&client, &segments, &mut self.registry, &store, tracker)
                .await?;

        let failed = artifacts.iter().filter(|a| a.is_placeholder()).count();
        if failed > 0 {
            error!("{} of {} segments failed to synthesize", failed, artifacts.len());
        }

        // 3. Assembly
        if let Some(t) = tracker {
            t.set_step(ProcessStep::Assembly);
            t.update_step_progress(0.0, Some("Merging audio segments".to_string()));
        }

        media::audio::assemble(
            &artifacts,
            Path::new(output_path),
            self.config.segment_gap_ms,
            self.config.cleanup_temp_files,
        )
        .map_err(|e| {
            error!("Audio assembly failed: {}", e);
            e
        })?;

        if let Some(t) = tracker {
            t.update_step_progress(100.0, None);
            t.complete();
        }

        info!("Narration pipeline completed successfully");
        Ok(output_path.to_string())
    }

    /// Run the pipeline on a novel file.
    pub async fn process_file(
        &mut self,
        novel_path: &str,
        output_path: &str,
        cancel: CancelToken,
    ) -> Result<String> {
        if tokio::fs::metadata(novel_path).await.is_err() {
            let message = format!("Input novel file not found: {}", novel_path);
            error!("{}", message);
            return Err(NovelVoiceError::Configuration(message));
        }

        let novel_text = tokio::fs::read_to_string(novel_path).await?;
        self.process(&novel_text, output_path, cancel).await
    }
}

/// Convenience entry point with defaults: no progress reporting, narrator
/// enabled, default voice profiles.
pub async fn narrate(
    novel_text: &str,
    output_path: &str,
    config: NovelVoiceConfig,
) -> Result<String> {
    let mut pipeline = NovelVoice::new(config);
    pipeline
        .process(novel_text, output_path, CancelToken::new())
        .await
}

/// Convenience entry point with progress reporting.
pub async fn narrate_with_progress(
    novel_text: &str,
    output_path: &str,
    config: NovelVoiceConfig,
    reporter: Box<dyn ProgressReporter>,
) -> Result<String> {
    let mut pipeline = NovelVoice::with_progress_reporter(config, reporter);
    pipeline
        .process(novel_text, output_path, CancelToken::new())
        .await
}
