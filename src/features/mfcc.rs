use anyhow::Result;
use ndarray::{Array1, Array2};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::debug;

/// MFCC front-end parameters
///
/// The defaults match the geometry the cry model was trained with:
/// 40 coefficients over a 128-band mel spectrogram, 2048-point frames
/// with a 512-sample hop.
#[derive(Debug, Clone)]
pub struct MfccConfig {
    pub n_mfcc: usize,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            n_mfcc: 40,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
        }
    }
}

/// Minimum power before the dB conversion
const AMIN: f32 = 1e-10;

/// Dynamic range clamp applied after the dB conversion
const TOP_DB: f32 = 80.0;

/// Computes mean MFCC feature vectors from raw audio
pub struct MfccExtractor {
    config: MfccConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig) -> Result<Self> {
        if config.n_fft == 0 || config.hop_length == 0 {
            anyhow::bail!("FFT size and hop length must be nonzero");
        }
        if config.n_mfcc == 0 || config.n_mfcc > config.n_mels {
            anyhow::bail!(
                "n_mfcc must be in 1..={} (got {})",
                config.n_mels,
                config.n_mfcc
            );
        }

        let fft = FftPlanner::new().plan_fft_forward(config.n_fft);
        let window = periodic_hann(config.n_fft);

        Ok(Self {
            config,
            fft,
            window,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(MfccConfig::default())
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    /// Compute the fixed-length feature vector: MFCCs averaged over time
    ///
    /// Output length is exactly `n_mfcc`. The result is deterministic for
    /// a fixed input signal and sample rate.
    pub fn mean_mfcc(&self, samples: &[f32], sample_rate: u32) -> Result<Array1<f32>> {
        if sample_rate == 0 {
            anyhow::bail!("Sample rate must be nonzero");
        }
        if samples.len() < 2 {
            anyhow::bail!(
                "Signal too short for feature extraction: {} samples",
                samples.len()
            );
        }

        let mel_db = self.mel_spectrogram_db(samples, sample_rate);
        let n_frames = mel_db.ncols();

        debug!(
            "Mel spectrogram: {} bands x {} frames at {} Hz",
            mel_db.nrows(),
            n_frames,
            sample_rate
        );

        // Orthonormal DCT-II over the mel axis, then mean over frames
        let mut means = Array1::zeros(self.config.n_mfcc);
        let n_mels = self.config.n_mels;
        let scale0 = (1.0 / n_mels as f32).sqrt();
        let scale = (2.0 / n_mels as f32).sqrt();

        for k in 0..self.config.n_mfcc {
            let factor = if k == 0 { scale0 } else { scale };
            let mut acc = 0.0f64;
            for t in 0..n_frames {
                let mut coeff = 0.0f32;
                for m in 0..n_mels {
                    let angle =
                        std::f32::consts::PI * (m as f32 + 0.5) * k as f32 / n_mels as f32;
                    coeff += mel_db[[m, t]] * angle.cos();
                }
                acc += (coeff * factor) as f64;
            }
            means[k] = (acc / n_frames as f64) as f32;
        }

        Ok(means)
    }

    /// Log-scaled mel spectrogram, shape (n_mels, n_frames)
    fn mel_spectrogram_db(&self, samples: &[f32], sample_rate: u32) -> Array2<f32> {
        let power = self.power_spectrogram(samples);
        let filterbank = mel_filterbank(sample_rate, self.config.n_fft, self.config.n_mels);

        let mut mel = filterbank.dot(&power);

        // power_to_db: 10*log10, clamped to TOP_DB below the peak
        mel.mapv_inplace(|v| 10.0 * v.max(AMIN).log10());
        let peak = mel.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - TOP_DB;
        mel.mapv_inplace(|v| v.max(floor));

        mel
    }

    /// Windowed FFT power spectrum, shape (n_fft/2 + 1, n_frames)
    ///
    /// Frames are centered: the signal is reflect-padded by n_fft/2 on
    /// both sides so frame t is centered on sample t * hop_length.
    fn power_spectrogram(&self, samples: &[f32]) -> Array2<f32> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let n_bins = n_fft / 2 + 1;
        let pad = n_fft / 2;

        let padded_len = samples.len() + 2 * pad;
        let n_frames = if padded_len >= n_fft {
            (padded_len - n_fft) / hop + 1
        } else {
            1
        };

        let mut power = Array2::zeros((n_bins, n_frames));
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

        for t in 0..n_frames {
            let start = t as isize * hop as isize - pad as isize;
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = sample_at(samples, start + i as isize);
                *slot = Complex::new(sample * self.window[i], 0.0);
            }

            self.fft.process(&mut buffer);

            for (bin, value) in buffer.iter().take(n_bins).enumerate() {
                power[[bin, t]] = value.norm_sqr();
            }
        }

        power
    }
}

/// Periodic Hann window of the given length
fn periodic_hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let phase = 2.0 * std::f32::consts::PI * n as f32 / len as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

/// Read a sample with reflection at the signal boundaries
fn sample_at(samples: &[f32], index: isize) -> f32 {
    let len = samples.len() as isize;
    if len == 1 {
        return samples[0];
    }
    // Mirror without repeating the edge sample
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    samples[i as usize]
}

/// Slaney-style mel scale: linear below 1 kHz, logarithmic above
fn hz_to_mel(hz: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f32.ln() / 27.0;

    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / logstep
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    const F_SP: f32 = 200.0 / 3.0;
    const MIN_LOG_HZ: f32 = 1000.0;
    let min_log_mel = MIN_LOG_HZ / F_SP;
    let logstep = 6.4f32.ln() / 27.0;

    if mel >= min_log_mel {
        MIN_LOG_HZ * ((mel - min_log_mel) * logstep).exp()
    } else {
        mel * F_SP
    }
}

/// Triangular mel filterbank, shape (n_mels, n_fft/2 + 1)
///
/// Filters are area-normalized so each integrates to roughly constant
/// energy across the band (Slaney normalization).
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let fmax = sample_rate as f32 / 2.0;

    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(fmax);
    let band_edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut weights = Array2::zeros((n_mels, n_bins));

    for m in 0..n_mels {
        let (f_lo, f_center, f_hi) = (band_edges[m], band_edges[m + 1], band_edges[m + 2]);
        let enorm = 2.0 / (f_hi - f_lo);

        for bin in 0..n_bins {
            let freq = bin as f32 * sample_rate as f32 / n_fft as f32;
            let rising = (freq - f_lo) / (f_center - f_lo);
            let falling = (f_hi - freq) / (f_hi - f_center);
            let weight = rising.min(falling).max(0.0);
            weights[[m, bin]] = weight * enorm;
        }
    }

    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_hann_window_shape() {
        let w = periodic_hann(2048);
        assert_eq!(w.len(), 2048);
        assert!(w[0].abs() < 1e-6);
        assert!((w[1024] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0, 220.0, 999.0, 1000.0, 4410.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 0.5, "round trip failed for {} Hz", hz);
        }
    }

    #[test]
    fn test_filterbank_coverage() {
        let fb = mel_filterbank(22050, 2048, 128);
        assert_eq!(fb.shape(), &[128, 1025]);
        // Every filter has some passband
        for m in 0..128 {
            let row_sum: f32 = fb.row(m).iter().sum();
            assert!(row_sum > 0.0, "filter {} is empty", m);
        }
    }

    #[test]
    fn test_mean_mfcc_length_and_determinism() {
        let extractor = MfccExtractor::with_defaults().unwrap();
        let signal = tone(440.0, 22050, 1.0);

        let a = extractor.mean_mfcc(&signal, 22050).unwrap();
        let b = extractor.mean_mfcc(&signal, 22050).unwrap();

        assert_eq!(a.len(), 40);
        assert!(a.iter().all(|v| v.is_finite()));
        assert_eq!(a, b);
    }

    #[test]
    fn test_silence_has_flat_cepstrum() {
        let extractor = MfccExtractor::with_defaults().unwrap();
        let silence = vec![0.0f32; 22050];

        let features = extractor.mean_mfcc(&silence, 22050).unwrap();

        // A flat spectrum concentrates all energy in the DC coefficient
        assert!(features[0] < 0.0);
        for k in 1..features.len() {
            assert!(
                features[k].abs() < 1e-2,
                "coefficient {} = {}",
                k,
                features[k]
            );
        }
    }

    #[test]
    fn test_short_signal_rejected() {
        let extractor = MfccExtractor::with_defaults().unwrap();
        assert!(extractor.mean_mfcc(&[], 22050).is_err());
        assert!(extractor.mean_mfcc(&[0.1], 22050).is_err());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MfccConfig {
            n_mfcc: 200,
            ..MfccConfig::default()
        };
        assert!(MfccExtractor::new(config).is_err());
    }

    #[test]
    fn test_tone_energy_near_fundamental() {
        // A 440 Hz tone should put its strongest mel band near 440 Hz
        let extractor = MfccExtractor::with_defaults().unwrap();
        let signal = tone(440.0, 22050, 1.0);

        let mel_db = extractor.mel_spectrogram_db(&signal, 22050);
        let mid = mel_db.ncols() / 2;

        let mut best_band = 0;
        let mut best = f32::NEG_INFINITY;
        for m in 0..mel_db.nrows() {
            if mel_db[[m, mid]] > best {
                best = mel_db[[m, mid]];
                best_band = m;
            }
        }

        // Band center frequencies rise with index; 440 Hz falls in the
        // lower quarter of a 128-band filterbank over 0..11025 Hz
        assert!(best_band < 32, "peak band {} too high", best_band);
        assert!(best_band > 2, "peak band {} too low", best_band);
    }
}
