use crate::audio::summary::assistant_reply;
use crate::audio::AnalysisReport;
use crate::error::AppResult;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `POST /api/v1/assistant`
///
/// Takes a report as returned by the analyze endpoints and answers with a short
/// plain-language summary of it.
pub async fn ask_assistant(report: web::Json<AnalysisReport>) -> AppResult<HttpResponse> {
    let report = report.into_inner();
    tracing::debug!(score = %report.sleep_quality_score, "Summarizing analysis for assistant");

    Ok(HttpResponse::Ok().json(json!({
        "response": assistant_reply(&report)
    })))
}
