//! Progress tracking for pipeline runs.
//!
//! Implements an observer pattern so callers can follow long-running
//! operations (segmentation, synthesis, assembly) without polling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A single progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressInfo {
    /// Name of the current pipeline step
    pub step: String,
    /// Completion of the current step (0.0 - 100.0)
    pub step_progress: f32,
    /// Completion of the whole run (0.0 - 100.0)
    pub total_progress: f32,
    /// Free-form detail text (e.g. streamed model output, segment counters)
    pub details: Option<String>,
}

impl ProgressInfo {
    pub fn new(
        step: impl Into<String>,
        step_progress: f32,
        total_progress: f32,
        details: Option<String>,
    ) -> Self {
        Self {
            step: step.into(),
            step_progress: step_progress.clamp(0.0, 100.0),
            total_progress: total_progress.clamp(0.0, 100.0),
            details,
        }
    }
}

/// Receives progress updates.
pub trait ProgressObserver: Send + Sync {
    fn on_progress_update(&self, progress: ProgressInfo);
}

/// Fans progress updates out to registered observers.
pub trait ProgressReporter: Send + Sync {
    /// Add an observer; returns an id usable with `remove_observer`.
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize;

    /// Remove an observer by id, returning it if it was registered.
    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>>;

    /// Notify all observers.
    fn notify_progress(&self, progress: ProgressInfo);
}

/// Default `ProgressReporter` backed by a map of observers.
pub struct DefaultProgressReporter {
    observers: RwLock<HashMap<usize, Box<dyn ProgressObserver>>>,
    next_id: AtomicUsize,
}

impl DefaultProgressReporter {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl Default for DefaultProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for DefaultProgressReporter {
    fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut observers = self.observers.write().unwrap();
        observers.insert(id, observer);
        id
    }

    fn remove_observer(&mut self, id: usize) -> Option<Box<dyn ProgressObserver>> {
        let mut observers = self.observers.write().unwrap();
        observers.remove(&id)
    }

    fn notify_progress(&self, progress: ProgressInfo) {
        let observers = self.observers.read().unwrap();
        for observer in observers.values() {
            observer.on_progress_update(progress.clone());
        }
    }
}

/// Steps of the narration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessStep {
    /// Streaming the completion and reconstructing the segment list
    Segmentation,
    /// Per-segment speech synthesis against the TTS backend
    Synthesis,
    /// Concatenating segment audio into the final artifact
    Assembly,
}

impl ProcessStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Segmentation => "Dialogue segmentation",
            Self::Synthesis => "Speech synthesis",
            Self::Assembly => "Audio assembly",
        }
    }

    /// Share of the whole run attributed to this step, in percent.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Segmentation => 30.0,
            Self::Synthesis => 60.0,
            Self::Assembly => 10.0,
        }
    }
}

struct TrackerState {
    current_step: ProcessStep,
    step_progress: f32,
    total_progress: f32,
    completed_steps: HashMap<ProcessStep, f32>,
}

impl TrackerState {
    fn recompute_total(&mut self) {
        let mut total = 0.0;
        let mut total_weight = 0.0;

        for (step, progress) in &self.completed_steps {
            total += step.weight() * progress / 100.0;
            total_weight += step.weight();
        }

        total += self.current_step.weight() * self.step_progress / 100.0;
        total_weight += self.current_step.weight();

        self.total_progress = (total / total_weight * 100.0).clamp(0.0, 100.0);
    }
}

/// Tracks a pipeline run across its weighted steps and reports updates.
pub struct ProgressTracker {
    reporter: Option<Box<dyn ProgressReporter>>,
    state: RwLock<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            reporter: None,
            state: RwLock::new(TrackerState {
                current_step: ProcessStep::Segmentation,
                step_progress: 0.0,
                total_progress: 0.0,
                completed_steps: HashMap::new(),
            }),
        }
    }

    pub fn with_reporter(reporter: Box<dyn ProgressReporter>) -> Self {
        let mut tracker = Self::new();
        tracker.reporter = Some(reporter);
        tracker
    }

    pub fn set_reporter(&mut self, reporter: Box<dyn ProgressReporter>) {
        self.reporter = Some(reporter);
    }

    pub fn add_observer(&mut self, observer: Box<dyn ProgressObserver>) -> Option<usize> {
        self.reporter
            .as_mut()
            .map(|reporter| reporter.add_observer(observer))
    }

    /// Enter a new step. The previous step is considered 100% complete.
    pub fn set_step(&self, step: ProcessStep) {
        {
            let mut state = self.state.write().unwrap();
            if state.current_step == step {
                return;
            }
            let previous = state.current_step;
            state.completed_steps.insert(previous, 100.0);
            state.current_step = step;
            state.step_progress = 0.0;
            state.recompute_total();
        }
        self.report(None);
    }

    /// Update progress of the current step.
    pub fn update_step_progress(&self, progress: f32, details: Option<String>) {
        {
            let mut state = self.state.write().unwrap();
            state.step_progress = progress.clamp(0.0, 100.0);
            state.recompute_total();
        }
        self.report(details);
    }

    /// Emit an update without changing tracked state. Used for streamed
    /// detail text where no meaningful percentage exists.
    pub fn notify_progress(&self, progress: f32, details: Option<String>) {
        if let Some(reporter) = &self.reporter {
            let state = self.state.read().unwrap();
            reporter.notify_progress(ProgressInfo::new(
                state.current_step.as_str(),
                progress,
                state.total_progress,
                details,
            ));
        }
    }

    /// Mark the whole run as complete.
    pub fn complete(&self) {
        {
            let mut state = self.state.write().unwrap();
            let current = state.current_step;
            state.completed_steps.insert(current, 100.0);
            state.step_progress = 100.0;
            state.total_progress = 100.0;
        }
        self.report(Some("Pipeline complete".to_string()));
    }

    fn report(&self, details: Option<String>) {
        if let Some(reporter) = &self.reporter {
            let state = self.state.read().unwrap();
            reporter.notify_progress(ProgressInfo::new(
                state.current_step.as_str(),
                state.step_progress,
                state.total_progress,
                details,
            ));
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
