use anyhow::{Context, Result};
use cpal::traits::DeviceTrait;
use cpal::Device;
use hound::{SampleFormat, WavSpec, WavWriter};
use ringbuf::traits::{Consumer as ConsumerTrait, Observer, Split};
use ringbuf::HeapRb;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::capture::{calculate_ring_buffer_capacity, select_input_config, AudioCapture};
use super::loader::AudioClip;
use super::resampler::{AudioResampler, RECORD_SAMPLE_RATE};

/// Record a fixed-length mono clip from an input device
///
/// Drains the capture ring buffer until `duration_ms` of audio has been
/// collected or the stop flag is raised, then resamples to the 44.1 kHz
/// recording rate. Returns an error if recording stopped with nothing
/// captured.
pub fn record_clip(
    device: &Device,
    duration_ms: u32,
    stop_flag: Arc<AtomicBool>,
) -> Result<AudioClip> {
    let selected = select_input_config(device)?;
    let device_rate = selected.config.sample_rate.0;

    info!(
        "Recording {} ms from {:?} at {} Hz",
        duration_ms,
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        device_rate
    );

    let capacity = calculate_ring_buffer_capacity(device_rate, duration_ms);
    let ring_buffer = HeapRb::<f32>::new(capacity);
    let (producer, mut consumer) = ring_buffer.split();

    let capture = AudioCapture::new(device, &selected.config, selected.sample_format, producer)?;
    capture.start()?;

    let target_samples = (device_rate as u64 * duration_ms as u64 / 1000) as usize;
    let mut collected: Vec<f32> = Vec::with_capacity(target_samples);
    let mut drain = vec![0.0f32; 4096];

    while collected.len() < target_samples {
        if stop_flag.load(Ordering::Relaxed) {
            info!(
                "Recording stopped early at {} of {} samples",
                collected.len(),
                target_samples
            );
            break;
        }

        let available = consumer.occupied_len();
        if available == 0 {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }

        let want = drain.len().min(target_samples - collected.len());
        let read = consumer.pop_slice(&mut drain[..want]);
        collected.extend_from_slice(&drain[..read]);
    }

    capture.stop()?;

    if capture.overflow_count() > 0 {
        warn!("Audio overflows during recording: {}", capture.overflow_count());
    }

    if collected.is_empty() {
        anyhow::bail!("Recording produced no audio");
    }

    debug!(
        "Captured {} samples ({} ms at {} Hz)",
        collected.len(),
        collected.len() as u64 * 1000 / device_rate as u64,
        device_rate
    );

    let samples = if device_rate == RECORD_SAMPLE_RATE {
        collected
    } else {
        let mut resampler = AudioResampler::new(device_rate)?;
        resampler.process_all(&collected)?
    };

    Ok(AudioClip::new(samples, RECORD_SAMPLE_RATE))
}

/// Save a clip as a float WAV file
pub fn save_wav(clip: &AudioClip, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;
    for &sample in &clip.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize().context("Failed to finalize WAV file")?;

    info!(
        "Saved recording to {:?} ({} ms)",
        path,
        clip.duration_ms()
    );
    Ok(())
}
