//! # Audio Analysis Module
//!
//! Turns a sleep recording into a handful of acoustic numbers and a heuristic score.
//! The pipeline is strictly linear; every stage owns its input and hands a new
//! value to the next one:
//!
//! ```text
//! RawAudio ──decode──▶ Waveform ──extract──▶ FeatureSummary ──score──▶ QualityScore
//! ```
//!
//! ## Key Components:
//! - **fetch**: Downloads a recording from a (signed) URL with a bounded timeout
//! - **decoder**: Container/codec decoding to mono `f32` samples via symphonia
//! - **features**: Short-time RMS and spectral centroid, reduced to mean/max
//! - **score**: Placeholder quality heuristic over the mean RMS
//! - **summary**: Stateless assistant text over the final report
//! - **pipeline**: Glues the stages together and produces an `AnalysisReport`

pub mod decoder;      // Bytes → Waveform
pub mod error;        // AnalysisError taxonomy shared by every stage
pub mod features;     // Waveform → FeatureSummary
pub mod fetch;        // URL → RawAudio
pub mod pipeline;     // End-to-end orchestration
pub mod score;        // FeatureSummary → QualityScore
pub mod summary;      // AnalysisReport → assistant text

pub use error::{AnalysisError, Stage};
pub use features::FeatureSummary;
pub use pipeline::AnalysisReport;

use std::path::Path;

/// Container format hint handed to the decoder.
///
/// Always a lowercase extension without the leading dot. Unknown or missing
/// extensions collapse to `webm`, which is what browser recorders produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatHint(String);

impl FormatHint {
    pub const DEFAULT_EXTENSION: &'static str = "webm";

    pub const KNOWN_EXTENSIONS: &'static [&'static str] = &[
        "wav", "webm", "mp3", "m4a", "mp4", "ogg", "oga", "opus", "flac", "aac", "mkv", "caf",
    ];

    /// Whether `ext` (with or without a leading dot, any case) is a known extension.
    pub fn is_known(ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::KNOWN_EXTENSIONS.contains(&ext.as_str())
    }

    /// Build a hint from a bare extension, falling back to `webm`.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        if Self::KNOWN_EXTENSIONS.contains(&ext.as_str()) {
            Self(ext)
        } else {
            Self(Self::DEFAULT_EXTENSION.to_string())
        }
    }

    /// Derive a hint from a file name or storage path.
    ///
    /// Paths without a known extension get `fallback`.
    pub fn from_path(path: &str, fallback: &FormatHint) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) if Self::is_known(ext) => Self::from_extension(ext),
            _ => fallback.clone(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.0
    }
}

impl Default for FormatHint {
    fn default() -> Self {
        Self(Self::DEFAULT_EXTENSION.to_string())
    }
}

impl std::fmt::Display for FormatHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Encoded audio as received from storage or an upload.
///
/// Consumed exactly once by [`decoder::decode`].
#[derive(Debug)]
pub struct RawAudio {
    pub bytes: Vec<u8>,
    pub format: FormatHint,
}

impl RawAudio {
    pub fn new(bytes: Vec<u8>, format: FormatHint) -> Self {
        Self { bytes, format }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded mono audio.
///
/// ## Invariants:
/// - `sample_rate > 0`
/// - samples are in [-1.0, 1.0] by convention of the decoder
/// - the rate applies to the whole buffer; nothing downstream resamples
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration = number_of_samples / sample_rate
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}
