use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::debug;

/// A decoded mono audio clip at its native sample rate
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Load a WAV file as mono f32 samples in [-1, 1]
///
/// The file's native sample rate is preserved. Multi-channel audio is
/// downmixed by averaging each frame across channels.
pub fn load_wav(path: &Path) -> Result<AudioClip> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open audio file: {:?}", path))?;
    let spec = reader.spec();

    debug!(
        "Loading WAV: {} Hz, {} channels, {} bits, format {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    );

    let samples = match spec.sample_format {
        SampleFormat::Float => read_float_samples(reader)?,
        SampleFormat::Int => read_int_samples(reader, spec.bits_per_sample)?,
    };

    let mono = downmix(&samples, spec.channels as usize);

    if mono.is_empty() {
        anyhow::bail!("Audio file contains no samples: {:?}", path);
    }

    debug!(
        "Loaded {} samples ({} ms at {} Hz)",
        mono.len(),
        mono.len() as u64 * 1000 / spec.sample_rate as u64,
        spec.sample_rate
    );

    Ok(AudioClip::new(mono, spec.sample_rate))
}

fn read_float_samples(reader: WavReader<impl std::io::Read>) -> Result<Vec<f32>> {
    reader
        .into_samples::<f32>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to decode float samples")
}

fn read_int_samples(
    reader: WavReader<impl std::io::Read>,
    bits_per_sample: u16,
) -> Result<Vec<f32>> {
    // Scale by the full range of the source bit depth
    let scale = match bits_per_sample {
        8 => 128.0,
        16 => 32768.0,
        24 => 8_388_608.0,
        32 => 2_147_483_648.0,
        bits => anyhow::bail!("Unsupported bit depth: {}", bits),
    };

    let samples = reader
        .into_samples::<i32>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to decode integer samples")?;

    Ok(samples.into_iter().map(|s| s as f32 / scale).collect())
}

/// Downmix interleaved samples to mono by per-frame mean
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_i16_wav(path: &Path, sample_rate: u32, channels: u16, frames: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &s in frames {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_mono_i16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_i16_wav(&path, 44100, 1, &[0, 16384, -16384, 32767]);

        let clip = load_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 44100);
        assert_eq!(clip.samples.len(), 4);
        assert!((clip.samples[1] - 0.5).abs() < 1e-4);
        assert!((clip.samples[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_load_stereo_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // L = 16384, R = -16384 in every frame: the mean is silence
        write_i16_wav(&path, 22050, 2, &[16384, -16384, 16384, -16384]);

        let clip = load_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 22050);
        assert_eq!(clip.samples.len(), 2);
        for s in &clip.samples {
            assert!(s.abs() < 1e-4);
        }
    }

    #[test]
    fn test_load_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &s in &[0.25f32, -0.75, 1.0] {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let clip = load_wav(&path).unwrap();
        assert_eq!(clip.samples, vec![0.25, -0.75, 1.0]);
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_i16_wav(&path, 44100, 1, &[]);

        assert!(load_wav(&path).is_err());
    }

    #[test]
    fn test_duration_ms() {
        let clip = AudioClip::new(vec![0.0; 22050], 44100);
        assert_eq!(clip.duration_ms(), 500);
    }
}
