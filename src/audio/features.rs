//! # Short-Time Feature Extraction
//!
//! Computes two per-frame series over a mono waveform and reduces them to a
//! fixed summary record.
//!
//! ## Framing:
//! - Frame length 2048 samples, hop 512 samples
//! - Frames are centered: the waveform is zero-padded by half a frame on each side,
//!   so there are always `1 + len / hop` frames, even for input shorter than a frame
//!
//! ## Per-frame features:
//! - **RMS**: `sqrt(mean(x²))` over the raw (un-windowed) frame
//! - **Spectral centroid**: `Σ f·|X(f)| / Σ |X(f)|` over the magnitude spectrum of
//!   the Hann-windowed frame; a frame with no spectral energy has centroid 0
//!
//! Everything runs sequentially in `f64`, so the same waveform always produces a
//! bit-identical summary.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::audio::{AnalysisError, Waveform};

/// Analysis window length in samples (also the FFT size).
pub const FRAME_LENGTH: usize = 2048;

/// Distance between the starts of consecutive frames, in samples.
pub const HOP_LENGTH: usize = 512;

/// Aggregated acoustic features of one recording.
///
/// This is the only thing the scorer and the assistant ever see.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub duration_sec: f64,
    pub rms_mean: f64,
    pub rms_max: f64,
    pub spectral_centroid_mean: f64,
    pub spectral_centroid_max: f64,
}

/// Per-frame feature values, one entry per analysis window.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSeries {
    pub rms: Vec<f64>,
    pub spectral_centroid: Vec<f64>,
}

impl FrameSeries {
    pub fn len(&self) -> usize {
        self.rms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rms.is_empty()
    }
}

/// Short-time analyzer with a pre-planned FFT and window.
pub struct FeatureExtractor {
    frame_length: usize,
    hop_length: usize,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FRAME_LENGTH, HOP_LENGTH)
    }
}

impl FeatureExtractor {
    /// Create an extractor for the given frame and hop sizes.
    ///
    /// Both are clamped to at least one sample.
    pub fn new(frame_length: usize, hop_length: usize) -> Self {
        let frame_length = frame_length.max(1);
        let hop_length = hop_length.max(1);

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(frame_length);

        Self {
            frame_length,
            hop_length,
            window: hann_window(frame_length),
            fft,
        }
    }

    /// Number of frames produced for `sample_count` samples.
    pub fn frame_count(&self, sample_count: usize) -> usize {
        1 + sample_count / self.hop_length
    }

    /// Compute the RMS and spectral-centroid series for a waveform.
    ///
    /// Returns empty series for an empty waveform; [`extract`](Self::extract)
    /// turns that into an error.
    pub fn frame_series(&self, waveform: &Waveform) -> FrameSeries {
        if waveform.is_empty() {
            return FrameSeries { rms: Vec::new(), spectral_centroid: Vec::new() };
        }

        let n_frames = self.frame_count(waveform.len());
        let n_bins = self.frame_length / 2 + 1;
        let bin_hz = waveform.sample_rate as f64 / self.frame_length as f64;

        let mut rms = Vec::with_capacity(n_frames);
        let mut centroid = Vec::with_capacity(n_frames);

        let mut spectrum = vec![Complex::new(0.0f64, 0.0); self.frame_length];
        let mut scratch = vec![Complex::new(0.0f64, 0.0); self.fft.get_inplace_scratch_len()];
        let mut edge = vec![0.0f32; self.frame_length];

        for frame_idx in 0..n_frames {
            let frame = centered_frame(
                &waveform.samples,
                frame_idx * self.hop_length,
                self.frame_length,
                &mut edge,
            );

            // Energy
            let sum_sq: f64 = frame.iter().map(|&x| (x as f64) * (x as f64)).sum();
            rms.push((sum_sq / self.frame_length as f64).sqrt());

            // Magnitude spectrum of the windowed frame
            for (slot, (&x, &w)) in spectrum.iter_mut().zip(frame.iter().zip(self.window.iter())) {
                *slot = Complex::new(x as f64 * w, 0.0);
            }
            self.fft.process_with_scratch(&mut spectrum, &mut scratch);

            let mut weighted = 0.0f64;
            let mut total = 0.0f64;
            for (k, bin) in spectrum[..n_bins].iter().enumerate() {
                let magnitude = bin.norm();
                weighted += k as f64 * bin_hz * magnitude;
                total += magnitude;
            }
            centroid.push(if total > f64::MIN_POSITIVE { weighted / total } else { 0.0 });
        }

        FrameSeries { rms, spectral_centroid: centroid }
    }

    /// Reduce a waveform to its feature summary.
    ///
    /// ## Errors:
    /// An empty waveform or a zero sample rate is a `Decode` error: there is
    /// no recording to describe, and a zeroed summary would look like silence.
    pub fn extract(&self, waveform: &Waveform) -> Result<FeatureSummary, AnalysisError> {
        if waveform.is_empty() {
            return Err(AnalysisError::decode("waveform contains no samples"));
        }
        if waveform.sample_rate == 0 {
            return Err(AnalysisError::decode("waveform has a zero sample rate"));
        }

        let series = self.frame_series(waveform);
        let (rms_mean, rms_max) = mean_max(&series.rms);
        let (spectral_centroid_mean, spectral_centroid_max) = mean_max(&series.spectral_centroid);

        let summary = FeatureSummary {
            duration_sec: waveform.duration_seconds(),
            rms_mean,
            rms_max,
            spectral_centroid_mean,
            spectral_centroid_max,
        };

        tracing::debug!(
            frames = series.len(),
            duration_sec = summary.duration_sec,
            rms_mean = summary.rms_mean,
            spectral_centroid_mean = summary.spectral_centroid_mean,
            "Features extracted"
        );

        Ok(summary)
    }
}

/// Periodic Hann window, the usual choice for STFT analysis.
fn hann_window(size: usize) -> Vec<f64> {
    let factor = 2.0 * std::f64::consts::PI / size as f64;
    (0..size).map(|i| 0.5 - 0.5 * (i as f64 * factor).cos()).collect()
}

/// The frame of `frame_length` samples centered on `center`.
///
/// Positions before the start or past the end of `samples` read as zero.
/// Frames that fit inside the waveform borrow straight from it; only the few
/// frames at either end are assembled in `edge`.
fn centered_frame<'a>(
    samples: &'a [f32],
    center: usize,
    frame_length: usize,
    edge: &'a mut [f32],
) -> &'a [f32] {
    let left = frame_length / 2;
    if center >= left && center - left + frame_length <= samples.len() {
        let start = center - left;
        return &samples[start..start + frame_length];
    }

    let start = center as isize - left as isize;
    for (offset, slot) in edge.iter_mut().enumerate() {
        let idx = start + offset as isize;
        *slot = if idx >= 0 && (idx as usize) < samples.len() {
            samples[idx as usize]
        } else {
            0.0
        };
    }
    edge
}

/// Arithmetic mean and maximum of a non-empty series.
fn mean_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let sum: f64 = values.iter().sum();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (sum / values.len() as f64, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, sample_rate: u32, seconds: f64) -> Waveform {
        let n = (sample_rate as f64 * seconds) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()) as f32
            })
            .collect();
        Waveform::new(samples, sample_rate)
    }

    /// Deterministic pseudo-noise so the tests don't need a RNG crate.
    fn noise(n: usize, sample_rate: u32) -> Waveform {
        let mut state: u32 = 0x1234_5678;
        let samples = (0..n)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
            })
            .collect();
        Waveform::new(samples, sample_rate)
    }

    #[test]
    fn test_silence() {
        let waveform = Waveform::new(vec![0.0; 16_000], 16_000);
        let extractor = FeatureExtractor::default();

        let summary = extractor.extract(&waveform).unwrap();
        assert!((summary.duration_sec - 1.0).abs() < 1e-9);
        assert_eq!(summary.rms_mean, 0.0);
        assert_eq!(summary.rms_max, 0.0);
        assert_eq!(summary.spectral_centroid_mean, 0.0);
        assert_eq!(summary.spectral_centroid_max, 0.0);
        assert_eq!(extractor.frame_series(&waveform).len(), 32);
    }

    #[test]
    fn test_sine_tone() {
        let amplitude = 0.5;
        let waveform = sine(440.0, amplitude, 16_000, 2.0);
        let summary = FeatureExtractor::default().extract(&waveform).unwrap();

        let expected_rms = amplitude / std::f64::consts::SQRT_2;
        // Edge frames are half padding, which pulls the mean down slightly
        assert!(
            (summary.rms_mean - expected_rms).abs() < 0.03 * expected_rms,
            "rms_mean {} vs {}",
            summary.rms_mean,
            expected_rms
        );
        assert!((summary.rms_max - expected_rms).abs() < 0.01 * expected_rms);
        assert!(
            (summary.spectral_centroid_mean - 440.0).abs() < 44.0,
            "centroid {}",
            summary.spectral_centroid_mean
        );
        assert!((summary.duration_sec - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_interior_frames_centered_on_tone() {
        let waveform = sine(1000.0, 0.3, 16_000, 1.0);
        let series = FeatureExtractor::default().frame_series(&waveform);

        // Frames fully inside the signal see a clean tone
        for &c in &series.spectral_centroid[4..series.len() - 4] {
            assert!((c - 1000.0).abs() < 20.0, "centroid {}", c);
        }
    }

    #[test]
    fn test_brighter_tone_has_higher_centroid() {
        let extractor = FeatureExtractor::default();
        let low = extractor.extract(&sine(300.0, 0.4, 16_000, 1.0)).unwrap();
        let high = extractor.extract(&sine(3000.0, 0.4, 16_000, 1.0)).unwrap();
        assert!(high.spectral_centroid_mean > low.spectral_centroid_mean);
    }

    #[test]
    fn test_short_input_still_yields_a_frame() {
        let extractor = FeatureExtractor::default();

        let tiny = Waveform::new(vec![0.5; 100], 16_000);
        let series = extractor.frame_series(&tiny);
        assert_eq!(series.len(), 1);
        let summary = extractor.extract(&tiny).unwrap();
        assert!(summary.rms_mean > 0.0);
        assert_eq!(summary.rms_mean, summary.rms_max);

        let single = Waveform::new(vec![1.0], 8_000);
        let summary = extractor.extract(&single).unwrap();
        assert!((summary.duration_sec - 1.0 / 8_000.0).abs() < 1e-15);
        assert!(summary.rms_mean > 0.0);
    }

    #[test]
    fn test_empty_waveform_is_decode_error() {
        let err = FeatureExtractor::default()
            .extract(&Waveform::new(Vec::new(), 16_000))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Decode { .. }));
    }

    #[test]
    fn test_zero_sample_rate_is_decode_error() {
        let err = FeatureExtractor::default()
            .extract(&Waveform::new(vec![0.1; 10], 0))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Decode { .. }));
    }

    #[test]
    fn test_duration_matches_sample_count() {
        let extractor = FeatureExtractor::default();
        for &(n, rate) in &[(1usize, 8_000u32), (511, 16_000), (44_100, 44_100), (100_003, 48_000)] {
            let summary = extractor.extract(&Waveform::new(vec![0.01; n], rate)).unwrap();
            let expected = n as f64 / rate as f64;
            assert!((summary.duration_sec - expected).abs() <= 1e-9 * expected);
        }
    }

    #[test]
    fn test_rms_bounds_on_noise() {
        let summary = FeatureExtractor::default().extract(&noise(30_000, 16_000)).unwrap();
        assert!(summary.rms_mean >= 0.0);
        assert!(summary.rms_mean <= summary.rms_max);
        assert!(summary.rms_max <= 1.0);
        assert!(summary.spectral_centroid_mean <= summary.spectral_centroid_max);
        assert!(summary.spectral_centroid_max <= 8_000.0);
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let waveform = noise(40_000, 22_050);
        let extractor = FeatureExtractor::default();
        let a = extractor.extract(&waveform).unwrap();
        let b = FeatureExtractor::default().extract(&waveform).unwrap();

        assert_eq!(a.duration_sec.to_bits(), b.duration_sec.to_bits());
        assert_eq!(a.rms_mean.to_bits(), b.rms_mean.to_bits());
        assert_eq!(a.rms_max.to_bits(), b.rms_max.to_bits());
        assert_eq!(a.spectral_centroid_mean.to_bits(), b.spectral_centroid_mean.to_bits());
        assert_eq!(a.spectral_centroid_max.to_bits(), b.spectral_centroid_max.to_bits());
    }

    #[test]
    fn test_frame_count() {
        let extractor = FeatureExtractor::default();
        assert_eq!(extractor.frame_count(1), 1);
        assert_eq!(extractor.frame_count(511), 1);
        assert_eq!(extractor.frame_count(512), 2);
        assert_eq!(extractor.frame_count(16_000), 32);
    }

    #[test]
    fn test_interior_frames_are_not_copied() {
        let samples: Vec<f32> = (0..10_000).map(|i| (i % 7) as f32 * 0.1).collect();
        let mut edge = vec![0.0f32; FRAME_LENGTH];

        let frame = centered_frame(&samples, 4_096, FRAME_LENGTH, &mut edge);
        assert!(std::ptr::eq(frame.as_ptr(), samples[3_072..].as_ptr()));
        assert_eq!(frame.len(), FRAME_LENGTH);
    }

    #[test]
    fn test_edge_frames_are_zero_padded() {
        let samples = vec![1.0f32; 3_000];
        let mut edge = vec![0.5f32; FRAME_LENGTH];

        // First frame: half padding, half signal
        let first = centered_frame(&samples, 0, FRAME_LENGTH, &mut edge).to_vec();
        assert!(first[..1024].iter().all(|&x| x == 0.0));
        assert!(first[1024..].iter().all(|&x| x == 1.0));

        // Centered on the last sample: runs off the end
        let last = centered_frame(&samples, 2_999, FRAME_LENGTH, &mut edge);
        assert!(last[..1025].iter().all(|&x| x == 1.0));
        assert!(last[1025..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_rms_matches_explicitly_padded_signal() {
        let waveform = noise(5_000, 16_000);
        let series = FeatureExtractor::default().frame_series(&waveform);

        let mut padded = vec![0.0f32; FRAME_LENGTH / 2];
        padded.extend_from_slice(&waveform.samples);
        padded.extend(std::iter::repeat(0.0f32).take(FRAME_LENGTH / 2));

        assert_eq!(series.len(), 1 + 5_000 / HOP_LENGTH);
        for (i, &rms) in series.rms.iter().enumerate() {
            let frame = &padded[i * HOP_LENGTH..i * HOP_LENGTH + FRAME_LENGTH];
            let sum_sq: f64 = frame.iter().map(|&x| (x as f64) * (x as f64)).sum();
            let expected = (sum_sq / FRAME_LENGTH as f64).sqrt();
            assert_eq!(rms.to_bits(), expected.to_bits(), "frame {}", i);
        }
    }

    #[test]
    fn test_hann_window() {
        let window = hann_window(2048);
        assert_eq!(window.len(), 2048);
        assert!(window[0].abs() < 1e-12);
        assert!((window[1024] - 1.0).abs() < 1e-12);
    }
}
