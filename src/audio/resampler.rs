use anyhow::{Context, Result};
use rubato::{FftFixedIn, Resampler};
use tracing::debug;

/// Sample rate recorded clips are stored at
pub const RECORD_SAMPLE_RATE: u32 = 44_100;

/// Converts captured audio from the device rate to the recording rate
pub struct AudioResampler {
    resampler: FftFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    input_frames: usize,
    from_rate: u32,
    to_rate: u32,
}

impl AudioResampler {
    pub fn new(device_sample_rate: u32) -> Result<Self> {
        Self::with_target(device_sample_rate, RECORD_SAMPLE_RATE)
    }

    pub fn with_target(from_rate: u32, to_rate: u32) -> Result<Self> {
        debug!(
            "Creating resampler: {} Hz -> {} Hz (ratio {:.4})",
            from_rate,
            to_rate,
            to_rate as f64 / from_rate as f64
        );

        let input_frames = 1024;
        let channels = 1;

        let resampler = FftFixedIn::new(
            from_rate as usize,
            to_rate as usize,
            input_frames,
            2, // sub_chunks for quality
            channels,
        )
        .context("Failed to create resampler")?;

        let input_buffer = vec![vec![0.0f32; input_frames]; channels];
        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            input_frames,
            from_rate,
            to_rate,
        })
    }

    /// Number of input samples each `process` call consumes
    pub fn input_frames_next(&self) -> usize {
        self.input_frames
    }

    /// Resample one fixed-size chunk of mono audio
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.input_frames {
            anyhow::bail!(
                "Input length {} doesn't match expected {}",
                input.len(),
                self.input_frames
            );
        }

        self.input_buffer[0].copy_from_slice(input);

        let (_, output_frames) = self
            .resampler
            .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
            .context("Resampling failed")?;

        Ok(self.output_buffer[0][..output_frames].to_vec())
    }

    /// Resample a complete clip, compensating for the FFT latency
    ///
    /// Pads the tail with zeros so every input sample makes it through the
    /// filter, then trims the leading delay and the padding from the output.
    pub fn process_all(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        self.resampler.reset();

        let delay = self.resampler.output_delay();
        let expected =
            (samples.len() as u64 * self.to_rate as u64).div_ceil(self.from_rate as u64) as usize;

        let mut output = Vec::with_capacity(expected + delay);
        let mut chunk = vec![0.0f32; self.input_frames];

        let mut fed = 0;
        while output.len() < expected + delay {
            let remaining = samples.len().saturating_sub(fed);
            let take = remaining.min(self.input_frames);

            chunk[..take].copy_from_slice(&samples[fed..fed + take]);
            chunk[take..].fill(0.0);
            fed += take;

            output.extend(self.process(&chunk)?);
        }

        let resampled: Vec<f32> = output.into_iter().skip(delay).take(expected).collect();
        debug!(
            "Resampled {} samples at {} Hz to {} at {} Hz",
            samples.len(),
            self.from_rate,
            resampled.len(),
            self.to_rate
        );
        Ok(resampled)
    }

    pub fn reset(&mut self) {
        self.resampler.reset();
    }
}
