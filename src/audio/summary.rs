//! Assistant reply text.
//!
//! A stand-in for the conversational assistant: a pure formatter over the
//! analysis report so the client's chat view has something deterministic to
//! render.

use crate::audio::AnalysisReport;

/// Render a short natural-language summary of an analysis.
pub fn assistant_reply(report: &AnalysisReport) -> String {
    let score = report.sleep_quality_score.value();

    let band = if score >= 80 {
        "The recording was mostly quiet."
    } else if score >= 50 {
        "The recording picked up some disturbances."
    } else {
        "The recording picked up frequent or loud disturbances."
    };

    format!(
        "Your sleep session lasted {:.1} seconds with a quality score of {}. {} \
         I can help explain disturbances and trends once the assistant is connected.",
        report.features.duration_sec, score, band
    )
}
