//! Final audio assembly.
//!
//! Concatenates per-segment WAV artifacts in dispatch order with a fixed
//! silence gap between them, writes a single output WAV, then reclaims the
//! temporary artifacts. On export failure the artifacts are left in place
//! for recovery.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{info, warn};

use crate::error::{NovelVoiceError, Result};
use crate::tts::AudioArtifact;

/// Silence inserted between consecutive segments.
pub const DEFAULT_SEGMENT_GAP_MS: u64 = 500;

/// Concatenate artifacts into `output_path`.
///
/// Placeholders contribute no audio but do not break ordering. An
/// artifact list with no files is a no-op: nothing is written. With
/// `cleanup`, per-segment files are removed (best-effort) after a
/// successful write.
pub fn assemble(
    artifacts: &[AudioArtifact],
    output_path: &Path,
    gap_ms: u64,
    cleanup: bool,
) -> Result<()> {
    let files: Vec<&Path> = artifacts.iter().filter_map(AudioArtifact::path).collect();
    if files.is_empty() {
        info!("No audio artifacts to assemble, skipping write");
        return Ok(());
    }

    write_concatenated(&files, output_path, gap_ms)?;
    info!(
        "Assembled {} segments into {}",
        files.len(),
        output_path.display()
    );

    if cleanup {
        cleanup_artifacts(&files);
    }
    Ok(())
}

fn write_concatenated(files: &[&Path], output_path: &Path, gap_ms: u64) -> Result<()> {
    let spec = read_spec(files[0])?;
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(NovelVoiceError::Assembly(format!(
            "{}: only 16-bit PCM artifacts are supported, got {:?}",
            files[0].display(),
            spec
        )));
    }

    let gap_samples = spec.sample_rate as u64 * gap_ms / 1000 * spec.channels as u64;

    let mut writer = WavWriter::create(output_path, spec).map_err(|e| {
        NovelVoiceError::Assembly(format!(
            "failed to create output file {}: {}",
            output_path.display(),
            e
        ))
    })?;

    for (i, file) in files.iter().enumerate() {
        let reader = open_reader(file)?;
        let file_spec = reader.spec();
        if file_spec != spec {
            return Err(NovelVoiceError::Assembly(format!(
                "{}: WAV spec {:?} does not match {:?} of the first artifact",
                file.display(),
                file_spec,
                spec
            )));
        }

        if i > 0 {
            for _ in 0..gap_samples {
                writer.write_sample(0i16).map_err(|e| {
                    NovelVoiceError::Assembly(format!("failed to write silence gap: {}", e))
                })?;
            }
        }

        for sample in reader.into_samples::<i16>() {
            let sample = sample.map_err(|e| {
                NovelVoiceError::Assembly(format!("failed to read {}: {}", file.display(), e))
            })?;
            writer.write_sample(sample).map_err(|e| {
                NovelVoiceError::Assembly(format!("failed to write sample: {}", e))
            })?;
        }
    }

    writer
        .finalize()
        .map_err(|e| NovelVoiceError::Assembly(format!("failed to finalize output: {}", e)))
}

/// Remove per-segment files. Best-effort: a failure is logged, never fatal.
pub fn cleanup_artifacts<P: AsRef<Path>>(files: &[P]) {
    for file in files {
        let file = file.as_ref();
        if let Err(e) = std::fs::remove_file(file) {
            warn!(
                "Failed to remove temporary artifact {}: {}",
                file.display(),
                e
            );
        }
    }
}

/// Duration of a WAV file in seconds.
pub fn wav_duration(path: &Path) -> Result<f32> {
    let reader = open_reader(path)?;
    let spec = reader.spec();
    Ok(reader.duration() as f32 / spec.sample_rate as f32)
}

fn open_reader(path: &Path) -> Result<WavReader<std::io::BufReader<std::fs::File>>> {
    WavReader::open(path).map_err(|e| {
        NovelVoiceError::Assembly(format!("failed to open WAV file {}: {}", path.display(), e))
    })
}

fn read_spec(path: &Path) -> Result<WavSpec> {
    Ok(open_reader(path)?.spec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const SAMPLE_RATE: u32 = 8000;

    fn test_spec() -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    fn write_test_wav(path: &Path, duration_ms: u64) {
        let mut writer = WavWriter::create(path, test_spec()).unwrap();
        let samples = SAMPLE_RATE as u64 * duration_ms / 1000;
        for i in 0..samples {
            writer.write_sample(((i % 128) as i16) * 16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn file_artifact(dir: &Path, name: &str, duration_ms: u64) -> AudioArtifact {
        let path = dir.join(name);
        write_test_wav(&path, duration_ms);
        AudioArtifact::File(path)
    }

    #[test]
    fn test_assemble_inserts_gaps_between_artifacts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let artifacts = vec![
            file_artifact(temp_dir.path(), "a.wav", 250),
            file_artifact(temp_dir.path(), "b.wav", 500),
            file_artifact(temp_dir.path(), "c.wav", 250),
        ];
        let output = temp_dir.path().join("out.wav");

        assemble(&artifacts, &output, 500, false).unwrap();

        // d1 + d2 + d3 + two 500 ms gaps
        let duration = wav_duration(&output).unwrap();
        assert!((duration - 2.0).abs() < 0.01, "duration was {}", duration);
    }

    #[test]
    fn test_empty_artifact_list_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output = temp_dir.path().join("out.wav");

        assemble(&[], &output, 500, true).unwrap();
        assert!(!output.exists());
    }

    #[test]
    fn test_placeholders_preserve_position_without_audio() {
        let temp_dir = tempfile::tempdir().unwrap();
        let artifacts = vec![
            file_artifact(temp_dir.path(), "a.wav", 250),
            AudioArtifact::Placeholder,
            file_artifact(temp_dir.path(), "c.wav", 250),
        ];
        let output = temp_dir.path().join("out.wav");

        assemble(&artifacts, &output, 500, false).unwrap();

        // two files, one gap; the placeholder adds no sound
        let duration = wav_duration(&output).unwrap();
        assert!((duration - 1.0).abs() < 0.01, "duration was {}", duration);
    }

    #[test]
    fn test_placeholders_only_writes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output = temp_dir.path().join("out.wav");

        let artifacts = vec![AudioArtifact::Placeholder, AudioArtifact::Placeholder];
        assemble(&artifacts, &output, 500, true).unwrap();
        assert!(!output.exists());
    }

    #[test]
    fn test_cleanup_after_successful_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let artifacts = vec![
            file_artifact(temp_dir.path(), "a.wav", 100),
            file_artifact(temp_dir.path(), "b.wav", 100),
        ];
        let output = temp_dir.path().join("out.wav");

        assemble(&artifacts, &output, 500, true).unwrap();

        assert!(output.exists());
        for artifact in &artifacts {
            assert!(!artifact.path().unwrap().exists());
        }
    }

    #[test]
    fn test_artifacts_kept_without_cleanup() {
        let temp_dir = tempfile::tempdir().unwrap();
        let artifacts = vec![file_artifact(temp_dir.path(), "a.wav", 100)];
        let output = temp_dir.path().join("out.wav");

        assemble(&artifacts, &output, 500, false).unwrap();
        assert!(artifacts[0].path().unwrap().exists());
    }

    #[test]
    fn test_spec_mismatch_is_an_assembly_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let a = temp_dir.path().join("a.wav");
        write_test_wav(&a, 100);

        let b = temp_dir.path().join("b.wav");
        let mut spec = test_spec();
        spec.sample_rate = 16000;
        let mut writer = WavWriter::create(&b, spec).unwrap();
        for _ in 0..1600 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let artifacts = vec![AudioArtifact::File(a.clone()), AudioArtifact::File(b)];
        let output = temp_dir.path().join("out.wav");

        let result = assemble(&artifacts, &output, 500, true);
        assert!(matches!(result, Err(NovelVoiceError::Assembly(_))));
        // failed export leaves artifacts in place
        assert!(a.exists());
    }

    #[test]
    fn test_single_artifact_has_no_gap() {
        let temp_dir = tempfile::tempdir().unwrap();
        let artifacts = vec![file_artifact(temp_dir.path(), "a.wav", 400)];
        let output = temp_dir.path().join("out.wav");

        assemble(&artifacts, &output, 500, false).unwrap();

        let duration = wav_duration(&output).unwrap();
        assert!((duration - 0.4).abs() < 0.01, "duration was {}", duration);
    }

    #[test]
    fn test_cleanup_missing_file_does_not_panic() {
        cleanup_artifacts(&[PathBuf::from("does_not_exist.wav")]);
    }
}
