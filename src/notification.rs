//! Concrete progress observers.
//!
//! Ready-made `ProgressObserver` implementations for common sinks: the
//! console, an in-memory history, a log file, a tokio channel, or an
//! arbitrary callback.

use std::io::Write;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::progress::{ProgressInfo, ProgressObserver};

/// Prints progress updates to stdout.
pub struct ConsoleProgressObserver {
    prefix: Option<String>,
}

impl ConsoleProgressObserver {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl Default for ConsoleProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ConsoleProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let prefix = self.prefix.as_deref().unwrap_or("");
        let details = progress.details.as_deref().unwrap_or("");

        println!(
            "{}[{}] step {:.1}%, total {:.1}%{}",
            prefix,
            progress.step,
            progress.step_progress,
            progress.total_progress,
            if details.is_empty() {
                String::new()
            } else {
                format!(": {}", details)
            }
        );
    }
}

/// Records progress updates in memory.
#[derive(Clone)]
pub struct MemoryProgressObserver {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl MemoryProgressObserver {
    pub fn new() -> Self {
        Self {
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn history(&self) -> Vec<ProgressInfo> {
        self.history.lock().unwrap().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }
}

impl Default for MemoryProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for MemoryProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        self.history.lock().unwrap().push(progress);
    }
}

/// Appends timestamped progress lines to a file.
pub struct FileProgressObserver {
    file_path: String,
}

impl FileProgressObserver {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl ProgressObserver for FileProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        let details = progress.details.as_deref().unwrap_or("");
        let log_entry = format!(
            "[{}] {}: step {:.1}%, total {:.1}%{}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            progress.step,
            progress.step_progress,
            progress.total_progress,
            if details.is_empty() {
                String::new()
            } else {
                format!(", {}", details)
            }
        );

        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
        {
            let _ = file.write_all(log_entry.as_bytes());
        }
    }
}

/// Forwards progress updates through a tokio channel.
pub struct ChannelProgressObserver {
    sender: mpsc::Sender<ProgressInfo>,
}

impl ChannelProgressObserver {
    pub fn new(sender: mpsc::Sender<ProgressInfo>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelProgressObserver {
    fn on_progress_update(&self, progress: ProgressInfo) {
        // Non-blocking; a full channel drops the update rather than stall
        // the pipeline.
        let _ = self.sender.try_send(progress);
    }
}

/// Invokes a callback for every progress update.
pub struct CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    callback: F,
}

impl<F> CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressObserver for CallbackProgressObserver<F>
where
    F: Fn(ProgressInfo) + Send + Sync + 'static,
{
    fn on_progress_update(&self, progress: ProgressInfo) {
        (self.callback)(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_observer() {
        let observer = MemoryProgressObserver::new();

        observer.on_progress_update(ProgressInfo::new("Step 1", 50.0, 25.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 1", 100.0, 50.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 2", 50.0, 75.0, None));

        let history = observer.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].step, "Step 1");
        assert_eq!(history[1].step_progress, 100.0);
        assert_eq!(history[2].total_progress, 75.0);

        observer.clear_history();
        assert_eq!(observer.history().len(), 0);
    }

    #[test]
    fn test_file_observer() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("progress.log");

        let observer = FileProgressObserver::new(log_path.to_string_lossy());
        observer.on_progress_update(ProgressInfo::new(
            "Test Step",
            50.0,
            25.0,
            Some("Testing".to_string()),
        ));

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("Test Step"));
        assert!(content.contains("50.0%"));
        assert!(content.contains("25.0%"));
        assert!(content.contains("Testing"));
    }

    #[test]
    fn test_callback_observer() {
        let counter = Arc::new(Mutex::new(0));
        let counter_clone = counter.clone();

        let observer = CallbackProgressObserver::new(move |_| {
            *counter_clone.lock().unwrap() += 1;
        });

        observer.on_progress_update(ProgressInfo::new("Step 1", 50.0, 25.0, None));
        observer.on_progress_update(ProgressInfo::new("Step 2", 0.0, 50.0, None));

        assert_eq!(*counter.lock().unwrap(), 2);
    }

    #[test]
    fn test_channel_observer() {
        let (tx, mut rx) = mpsc::channel(8);
        let observer = ChannelProgressObserver::new(tx);

        observer.on_progress_update(ProgressInfo::new("Step 1", 10.0, 5.0, None));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.step, "Step 1");
        assert_eq!(received.step_progress, 10.0);
    }
}
