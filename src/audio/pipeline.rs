//! # Analysis Pipeline
//!
//! Runs one recording through fetch → decode → extract → score.
//!
//! ## Concurrency:
//! - The fetch is async and only holds the request's own buffer
//! - Decode and extraction are CPU-bound and run on tokio's blocking pool
//! - Nothing here is shared between requests except the HTTP connection pool

use serde::{Deserialize, Serialize};

use crate::audio::decoder;
use crate::audio::features::FeatureExtractor;
use crate::audio::fetch::Fetcher;
use crate::audio::score::QualityScore;
use crate::audio::{AnalysisError, FeatureSummary, FormatHint, RawAudio, Stage};
use crate::config::AppConfig;

/// What a finished analysis hands back: the features plus the heuristic score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    #[serde(flatten)]
    pub features: FeatureSummary,
    pub sleep_quality_score: QualityScore,
}

/// Final stage: attach the heuristic score to the extracted features.
fn score(input_bytes: usize, features: FeatureSummary) -> AnalysisReport {
    let sleep_quality_score = QualityScore::from_summary(&features);

    tracing::info!(
        input_bytes,
        duration_sec = features.duration_sec,
        rms_mean = features.rms_mean,
        score = sleep_quality_score.value(),
        "Recording analyzed"
    );

    AnalysisReport { features, sleep_quality_score }
}

/// Run one CPU-bound stage on tokio's blocking pool.
///
/// A panic inside the stage surfaces as `Internal` tagged with that stage.
async fn run_blocking<T, F>(stage: Stage, work: F) -> Result<T, AnalysisError>
where
    F: FnOnce() -> Result<T, AnalysisError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AnalysisError::internal(stage, e))?
}

/// Async front door to the pipeline, built once from the app config.
#[derive(Debug, Clone)]
pub struct AnalysisPipeline {
    fetcher: Fetcher,
    default_format: FormatHint,
    max_audio_bytes: usize,
}

impl AnalysisPipeline {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config.fetch_timeout(), config.analysis.max_audio_bytes)?,
            default_format: config.default_format(),
            max_audio_bytes: config.analysis.max_audio_bytes,
        })
    }

    /// Format hint for a file name or storage path.
    pub fn format_for(&self, name: &str) -> FormatHint {
        FormatHint::from_path(name, &self.default_format)
    }

    pub fn max_audio_bytes(&self) -> usize {
        self.max_audio_bytes
    }

    /// Download a recording and analyze it.
    pub async fn analyze_url(&self, url: &str, format: FormatHint) -> Result<AnalysisReport, AnalysisError> {
        let raw = self.fetcher.fetch(url, format).await?;
        self.analyze_bytes(raw).await
    }

    /// Analyze a recording that arrived as an upload.
    ///
    /// Decode and extraction each take a trip to the blocking pool; the raw
    /// bytes are gone before extraction starts and the samples before scoring.
    pub async fn analyze_bytes(&self, raw: RawAudio) -> Result<AnalysisReport, AnalysisError> {
        let input_bytes = raw.len();
        let waveform = run_blocking(Stage::Decode, move || decoder::decode(raw)).await?;
        let features = run_blocking(Stage::Extract, move || {
            FeatureExtractor::default().extract(&waveform)
        })
        .await?;

        Ok(score(input_bytes, features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let header = wav::Header::new(wav::WAV_FORMAT_PCM, 1, sample_rate, 16);
        let mut out = Cursor::new(Vec::new());
        wav::write(header, &wav::BitDepth::Sixteen(samples.to_vec()), &mut out).unwrap();
        out.into_inner()
    }

    async fn analyze(raw: RawAudio) -> Result<AnalysisReport, AnalysisError> {
        AnalysisPipeline::from_config(&AppConfig::default())
            .unwrap()
            .analyze_bytes(raw)
            .await
    }

    #[tokio::test]
    async fn test_silent_second_scores_100() {
        let raw = RawAudio::new(wav_bytes(&vec![0i16; 16_000], 16_000), FormatHint::from_extension("wav"));
        let report = analyze(raw).await.unwrap();

        assert!(report.features.rms_mean.abs() < 1e-9);
        assert_eq!(report.sleep_quality_score.value(), 100);
        assert!((report.features.duration_sec - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_loud_tone_scores_low() {
        let pcm: Vec<i16> = (0..32_000)
            .map(|i| {
                let t = i as f64 / 16_000.0;
                (0.5 * (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 32767.0) as i16
            })
            .collect();
        let raw = RawAudio::new(wav_bytes(&pcm, 16_000), FormatHint::from_extension("wav"));
        let report = analyze(raw).await.unwrap();

        // rms ≈ 0.35 → 100 - 350 clamps to 0
        assert_eq!(report.sleep_quality_score.value(), 0);
        assert!((report.features.duration_sec - 2.0).abs() < 1e-9);
        assert!((report.features.spectral_centroid_mean - 440.0).abs() < 44.0);
    }

    #[tokio::test]
    async fn test_empty_upload_never_yields_a_report() {
        let err = analyze(RawAudio::new(Vec::new(), FormatHint::default())).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Decode { .. }));
    }

    #[test]
    fn test_report_json_shape() {
        let report = AnalysisReport {
            features: FeatureSummary {
                duration_sec: 12.5,
                rms_mean: 0.01,
                rms_max: 0.2,
                spectral_centroid_mean: 800.0,
                spectral_centroid_max: 2400.0,
            },
            sleep_quality_score: QualityScore::from_rms_mean(0.01),
        };

        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["duration_sec"], 12.5);
        assert_eq!(json["spectral_centroid_max"], 2400.0);
        assert_eq!(json["sleep_quality_score"], 90);

        let back: AnalysisReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }

    #[tokio::test]
    async fn test_pipeline_runs_uploads_off_the_async_thread() {
        let pipeline = AnalysisPipeline::from_config(&AppConfig::default()).unwrap();
        let raw = RawAudio::new(wav_bytes(&vec![0i16; 8_000], 8_000), pipeline.format_for("clip.wav"));

        let report = pipeline.analyze_bytes(raw).await.unwrap();
        assert_eq!(report.sleep_quality_score.value(), 100);
    }

    #[test]
    fn test_format_for_uses_configured_default() {
        let mut config = AppConfig::default();
        config.analysis.default_format = "ogg".to_string();
        let pipeline = AnalysisPipeline::from_config(&config).unwrap();

        assert_eq!(pipeline.format_for("night.flac").extension(), "flac");
        assert_eq!(pipeline.format_for("night").extension(), "ogg");
    }
}
