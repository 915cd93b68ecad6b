//! Debug WAV dump of the last capture.
//!
//! When enabled in settings, each stopped recording is written as 16-bit
//! PCM mono WAV under `<data_dir>/recordings/` so transcription problems
//! can be checked against the actual audio.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use hound::{SampleFormat, WavSpec, WavWriter};

use super::session::SAMPLE_RATE;

/// Write a normalized capture to a timestamped WAV file, returning its path.
pub fn write_recording(data_dir: &Path, samples: &[f32]) -> Result<PathBuf> {
    let dir = data_dir.join("recordings");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let filename = format!("recording-{}.wav", Local::now().format("%Y%m%d-%H%M%S"));
    let path = dir.join(filename);

    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(&path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for &sample in samples {
        let pcm = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(pcm)?;
    }
    writer.finalize().context("failed to finalize wav file")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_wav_is_mono_16k() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![0.0f32, 0.5, -0.5, 1.0, -1.0];

        let path = write_recording(dir.path(), &samples).unwrap();
        assert!(path.starts_with(dir.path().join("recordings")));

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, SAMPLE_RATE);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), samples.len() as u32);
    }

    #[test]
    fn test_samples_round_trip_within_quantization() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![0.25f32, -0.75];

        let path = write_recording(dir.path(), &samples).unwrap();
        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.unwrap() as f32 / 32767.0)
            .collect();

        for (orig, round) in samples.iter().zip(read.iter()) {
            assert!((orig - round).abs() < 1.0 / 32000.0);
        }
    }
}
