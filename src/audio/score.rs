//! # Sleep Quality Score
//!
//! **This is a placeholder heuristic, not a validated model.** It only says
//! "quieter recordings score higher": the mean RMS is scaled by 1000 and
//! subtracted from 100, then clamped to [0, 100]. It exists so the client can be
//! built against a stable bounded-integer field until a real model replaces it.

use serde::{Deserialize, Serialize};

use crate::audio::FeatureSummary;

/// Heuristic quality indicator in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityScore(u8);

impl QualityScore {
    pub const MAX: u8 = 100;

    /// `clamp(100 - floor(rms_mean * 1000), 0, 100)`
    ///
    /// Total over every input: NaN scores 0, negative RMS (impossible from the
    /// extractor) clamps to 100.
    pub fn from_rms_mean(rms_mean: f64) -> Self {
        let raw = 100.0 - (rms_mean * 1000.0).floor();
        if raw.is_nan() {
            return Self(0);
        }
        Self(raw.clamp(0.0, Self::MAX as f64) as u8)
    }

    pub fn from_summary(summary: &FeatureSummary) -> Self {
        Self::from_rms_mean(summary.rms_mean)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for QualityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
