//! Per-role voice configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{NovelVoiceError, Result};
use crate::llm::segment::{Segment, NARRATOR_ROLE};

/// Synthesis configuration for one role: model weights, reference audio
/// and sampling parameters. Replaced whole-struct on update, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// GPT weights checkpoint path on the backend host
    pub gpt_weights_path: String,
    /// SoVITS weights checkpoint path on the backend host
    pub sovits_weights_path: String,
    /// Reference audio path on the backend host
    pub ref_audio_path: String,
    /// Transcript of the reference audio
    pub ref_text: String,
    /// Playback speed, 0.5 - 2.0
    pub speed_factor: f32,
    /// Sampling candidates, 1 - 10
    pub top_k: u32,
    /// Cumulative probability threshold, (0.0, 1.0]
    pub top_p: f32,
    /// Sampling temperature, 0.1 - 2.0
    pub temperature: f32,
    /// Repetition penalty, 1.0 - 2.0
    pub repetition_penalty: f32,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            gpt_weights_path: String::new(),
            sovits_weights_path: String::new(),
            ref_audio_path: String::new(),
            ref_text: String::new(),
            speed_factor: 1.0,
            top_k: 5,
            top_p: 1.0,
            temperature: 1.0,
            repetition_penalty: 1.35,
        }
    }
}

impl VoiceProfile {
    /// Check the numeric parameters against their allowed ranges.
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=2.0).contains(&self.speed_factor) {
            return Err(NovelVoiceError::Configuration(format!(
                "speed_factor {} outside [0.5, 2.0]",
                self.speed_factor
            )));
        }
        if !(1..=10).contains(&self.top_k) {
            return Err(NovelVoiceError::Configuration(format!(
                "top_k {} outside [1, 10]",
                self.top_k
            )));
        }
        if self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(NovelVoiceError::Configuration(format!(
                "top_p {} outside (0.0, 1.0]",
                self.top_p
            )));
        }
        if !(0.1..=2.0).contains(&self.temperature) {
            return Err(NovelVoiceError::Configuration(format!(
                "temperature {} outside [0.1, 2.0]",
                self.temperature
            )));
        }
        if !(1.0..=2.0).contains(&self.repetition_penalty) {
            return Err(NovelVoiceError::Configuration(format!(
                "repetition_penalty {} outside [1.0, 2.0]",
                self.repetition_penalty
            )));
        }
        Ok(())
    }
}

/// Holds the voice profile for every known role plus the narration toggle.
///
/// No internal locking: a registry belongs to one pipeline run at a time.
/// Clone it for per-run snapshots when runs may overlap.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    voices: HashMap<String, VoiceProfile>,
    narration_enabled: bool,
}

impl VoiceRegistry {
    /// A registry always knows the narrator role.
    pub fn new() -> Self {
        let mut voices = HashMap::new();
        voices.insert(NARRATOR_ROLE.to_string(), VoiceProfile::default());
        Self {
            voices,
            narration_enabled: true,
        }
    }

    /// Profile for a role, creating a default entry on first access.
    pub fn get(&mut self, role: &str) -> &VoiceProfile {
        self.voices.entry(role.to_string()).or_default()
    }

    /// Profile for a role without creating one.
    pub fn lookup(&self, role: &str) -> Option<&VoiceProfile> {
        self.voices.get(role)
    }

    /// Validate and replace a role's profile.
    pub fn set(&mut self, role: &str, profile: VoiceProfile) -> Result<()> {
        profile.validate()?;
        self.voices.insert(role.to_string(), profile);
        Ok(())
    }

    /// Pre-create default profiles for every role appearing in a
    /// segmentation result.
    pub fn register_segments(&mut self, segments: &[Segment]) {
        for segment in segments {
            self.voices.entry(segment.role.clone()).or_default();
        }
    }

    /// Known roles, sorted.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Whether narrator segments are dispatched for synthesis. Consulted by
    /// the dispatcher only; the segment reconstructor never filters.
    pub fn narration_enabled(&self) -> bool {
        self.narration_enabled
    }

    pub fn set_narration_enabled(&mut self, enabled: bool) {
        self.narration_enabled = enabled;
    }
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrator_profile_always_exists() {
        let registry = VoiceRegistry::new();
        assert!(registry.lookup(NARRATOR_ROLE).is_some());
        assert!(registry.narration_enabled());
    }

    #[test]
    fn test_default_profile_on_first_access() {
        let mut registry = VoiceRegistry::new();
        assert!(registry.lookup("张三").is_none());

        let profile = registry.get("张三");
        assert_eq!(profile.speed_factor, 1.0);
        assert_eq!(profile.top_k, 5);
        assert_eq!(profile.repetition_penalty, 1.35);
        assert!(registry.lookup("张三").is_some());
    }

    #[test]
    fn test_set_replaces_whole_profile() {
        let mut registry = VoiceRegistry::new();
        let profile = VoiceProfile {
            gpt_weights_path: "GPT_weights_v2/zhangsan.ckpt".to_string(),
            speed_factor: 1.2,
            ..VoiceProfile::default()
        };
        registry.set("张三", profile.clone()).unwrap();

        assert_eq!(registry.lookup("张三"), Some(&profile));

        // replacement, not merge: the second set drops the weights path
        let replacement = VoiceProfile {
            speed_factor: 0.8,
            ..VoiceProfile::default()
        };
        registry.set("张三", replacement.clone()).unwrap();
        assert_eq!(registry.lookup("张三"), Some(&replacement));
        assert!(registry.lookup("张三").unwrap().gpt_weights_path.is_empty());
    }

    #[test]
    fn test_set_rejects_out_of_range_profile() {
        let mut registry = VoiceRegistry::new();
        let profile = VoiceProfile {
            speed_factor: 3.0,
            ..VoiceProfile::default()
        };
        assert!(matches!(
            registry.set("张三", profile),
            Err(NovelVoiceError::Configuration(_))
        ));
        assert!(registry.lookup("张三").is_none());
    }

    #[test]
    fn test_validate_bounds() {
        let ok = VoiceProfile::default();
        assert!(ok.validate().is_ok());

        let cases = [
            VoiceProfile {
                speed_factor: 0.4,
                ..VoiceProfile::default()
            },
            VoiceProfile {
                top_k: 0,
                ..VoiceProfile::default()
            },
            VoiceProfile {
                top_k: 11,
                ..VoiceProfile::default()
            },
            VoiceProfile {
                top_p: 0.0,
                ..VoiceProfile::default()
            },
            VoiceProfile {
                top_p: 1.5,
                ..VoiceProfile::default()
            },
            VoiceProfile {
                temperature: 0.05,
                ..VoiceProfile::default()
            },
            VoiceProfile {
                repetition_penalty: 0.9,
                ..VoiceProfile::default()
            },
        ];
        for profile in cases {
            assert!(profile.validate().is_err());
        }
    }

    #[test]
    fn test_register_segments_creates_roles() {
        let mut registry = VoiceRegistry::new();
        let segments = vec![
            Segment {
                role: NARRATOR_ROLE.to_string(),
                text: "a".to_string(),
            },
            Segment {
                role: "张三".to_string(),
                text: "b".to_string(),
            },
            Segment {
                role: "李四".to_string(),
                text: "c".to_string(),
            },
        ];
        registry.register_segments(&segments);

        assert_eq!(registry.roles(), vec!["张三", "旁白", "李四"]);
    }
}
