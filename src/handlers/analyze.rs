//! # Analysis REST API Handlers
//!
//! Two ways in, one pipeline:
//! - `POST /api/v1/analyze` - analyze a recording already in object storage
//! - `POST /api/v1/analyze/upload` - analyze a recording sent as multipart form data
//!
//! Both reserve an analysis slot first and answer 503 when the server is full,
//! then return the same response shape.

use crate::audio::{AnalysisError, AnalysisReport, FormatHint, RawAudio};
use crate::error::{AppError, AppResult};
use crate::state::{AnalysisPermit, AppState};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

/// Request body for analyzing a stored recording.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Client-side sleep session this recording belongs to
    pub sleep_session_id: String,
    /// Object path inside the recordings bucket (e.g. "user-1/2024-05-01.webm")
    pub audio_path: String,
}

/// Response structure for both analysis endpoints.
#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis_id: Uuid,
    pub sleep_session_id: Option<String>,
    pub audio_path: Option<String>,
    pub format: String,
    pub analysis: AnalysisReport,
    pub processing_time_ms: u64,
    pub timestamp: String,
}

/// Analyze a recording stored in the bucket.
///
/// ## Endpoint: `POST /api/v1/analyze`
///
/// ## Request Body:
/// ```json
/// {
///   "sleep_session_id": "3f1c...",
///   "audio_path": "user-1/night-2024-05-01.webm"
/// }
/// ```
///
/// ## Response:
/// ```json
/// {
///   "analysis_id": "9b2e...",
///   "sleep_session_id": "3f1c...",
///   "audio_path": "user-1/night-2024-05-01.webm",
///   "format": "webm",
///   "analysis": {
///     "duration_sec": 28800.0,
///     "rms_mean": 0.004,
///     "rms_max": 0.31,
///     "spectral_centroid_mean": 912.4,
///     "spectral_centroid_max": 5120.0,
///     "sleep_quality_score": 96
///   },
///   "processing_time_ms": 5400,
///   "timestamp": "2025-01-01T07:00:00Z"
/// }
/// ```
pub async fn analyze_stored(
    state: web::Data<AppState>,
    request: web::Json<AnalyzeRequest>,
) -> AppResult<HttpResponse> {
    let AnalyzeRequest { sleep_session_id, audio_path } = request.into_inner();

    if sleep_session_id.trim().is_empty() {
        return Err(AppError::ValidationError("sleep_session_id cannot be empty".to_string()));
    }
    if audio_path.trim().trim_start_matches('/').is_empty() {
        return Err(AppError::ValidationError("audio_path cannot be empty".to_string()));
    }

    let permit = state.try_begin_analysis().ok_or_else(at_capacity)?;
    let start_time = Instant::now();
    let analysis_id = Uuid::new_v4();
    let format = state.pipeline.format_for(&audio_path);

    tracing::info!(%analysis_id, %sleep_session_id, %audio_path, %format, "Analyzing stored recording");

    let result = sign_and_analyze(&state, &audio_path, format.clone()).await;
    permit.finish(result.is_ok());
    let analysis = result?;

    Ok(HttpResponse::Ok().json(AnalyzeResponse {
        analysis_id,
        sleep_session_id: Some(sleep_session_id),
        audio_path: Some(audio_path),
        format: format.to_string(),
        analysis,
        processing_time_ms: start_time.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

async fn sign_and_analyze(
    state: &AppState,
    audio_path: &str,
    format: FormatHint,
) -> Result<AnalysisReport, AnalysisError> {
    let url = state.storage.create_signed_url(audio_path).await?;
    state.pipeline.analyze_url(&url, format).await
}

/// Analyze an uploaded recording.
///
/// ## Endpoint: `POST /api/v1/analyze/upload`
///
/// ## Request:
/// Multipart form data with:
/// - `audio`: the recording; its filename extension is the format hint
/// - `sleep_session_id` (optional): echoed back in the response
///
/// ## Response:
/// Same shape as `POST /api/v1/analyze`, with `audio_path` set to null.
///
/// The analysis slot is reserved before the `audio` field is read, so a full
/// server turns uploads away without buffering them.
pub async fn analyze_upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let max_bytes = state.pipeline.max_audio_bytes();

    let mut audio: Option<(Vec<u8>, Option<String>, AnalysisPermit)> = None;
    let mut sleep_session_id: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let (name, filename) = {
            let disposition = field.content_disposition().ok_or_else(|| {
                AppError::BadRequest("Missing content disposition".to_string())
            })?;
            (
                disposition.get_name().map(|s| s.to_string()),
                disposition.get_filename().map(|s| s.to_string()),
            )
        };

        match name.as_deref() {
            Some("audio") => {
                if audio.is_some() {
                    return Err(AppError::ValidationError(
                        "Only one audio file per request".to_string(),
                    ));
                }
                let permit = state.try_begin_analysis().ok_or_else(at_capacity)?;
                let bytes = read_field(&mut field, max_bytes).await?;
                audio = Some((bytes, filename, permit));
            }
            Some("sleep_session_id") => {
                let bytes = read_field(&mut field, 1024).await?;
                let value = String::from_utf8(bytes)
                    .map_err(|_| AppError::ValidationError("sleep_session_id must be UTF-8".to_string()))?;
                sleep_session_id = Some(value.trim().to_string()).filter(|s| !s.is_empty());
            }
            _ => {
                // Drain fields we don't know about so the stream can move on
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
                }
            }
        }
    }

    let (bytes, filename, permit) = audio.ok_or_else(|| {
        AppError::ValidationError("No audio file provided (expected form field 'audio')".to_string())
    })?;

    let start_time = Instant::now();
    let analysis_id = Uuid::new_v4();
    let format = state.pipeline.format_for(filename.as_deref().unwrap_or(""));

    tracing::info!(
        %analysis_id,
        size_bytes = bytes.len(),
        filename = filename.as_deref().unwrap_or("<none>"),
        %format,
        "Analyzing uploaded recording"
    );

    let result = state.pipeline.analyze_bytes(RawAudio::new(bytes, format.clone())).await;
    permit.finish(result.is_ok());
    let analysis = result?;

    Ok(HttpResponse::Ok().json(AnalyzeResponse {
        analysis_id,
        sleep_session_id,
        audio_path: None,
        format: format.to_string(),
        analysis,
        processing_time_ms: start_time.elapsed().as_millis() as u64,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// Collect one multipart field, refusing to buffer more than `limit` bytes.
async fn read_field(field: &mut Field, limit: usize) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::ValidationError(format!(
                "Field too large: more than {} bytes",
                limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

fn at_capacity() -> AppError {
    AppError::Unavailable("Too many analyses in progress, try again shortly".to_string())
}
