//! Per-run temporary artifact storage.
//!
//! The artifact directory survives a failed run so its contents remain
//! available for diagnosis; deletion is the assembler's job and happens
//! only after a successful final write.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

static ARTIFACT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Names and owns the directory for one run's per-segment audio files.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create the store, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A fresh artifact path for a role. Names combine the sanitized role
    /// with a time-based token so concurrent segments of the same role
    /// never collide.
    pub fn artifact_path(&self, role: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}.wav", sanitize_role(role), unique_id()))
    }
}

fn sanitize_role(role: &str) -> String {
    role.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

fn unique_id() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = ARTIFACT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}_{}_{}",
        since_epoch.as_millis(),
        since_epoch.subsec_nanos(),
        counter
    )
}
