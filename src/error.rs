//! # Error Handling
//!
//! This module defines the HTTP-facing error type and how it is converted to responses.
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Result<T, E> Type
//! - **T**: The success type (what you get when everything works)
//! - **E**: The error type (what you get when something goes wrong)
//! - **No exceptions**: Rust doesn't have try/catch, it uses Result instead
//!
//! ### Traits for Error Conversion
//! - **From trait**: Automatically converts between error types (this is what makes `?` work)
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings
//!
//! ## Two layers of errors:
//! - `AnalysisError` (in `audio::error`) describes *what* went wrong in the pipeline
//! - `AppError` (here) decides *how the client hears about it*: status code,
//!   machine-readable type, and whether a retry could help

use actix_web::{http::StatusCode, HttpResponse, ResponseError};  // Web framework error handling
use serde_json::json;                                           // For creating JSON error responses
use std::fmt;                                                   // For implementing Display trait

use crate::audio::AnalysisError;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **BadRequest**: Client sent a body we couldn't parse (400 errors)
/// - **ValidationError**: Parsed fine, but the values are unacceptable (400 errors)
/// - **Unavailable**: Too many analyses already running (503 errors)
/// - **Analysis**: The pipeline failed; status depends on the stage and cause
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::ValidationError("audio_path cannot be empty".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// User input failed validation rules
    ValidationError(String),

    /// Server is at its concurrent analysis limit
    Unavailable(String),

    /// A pipeline stage failed
    Analysis(AnalysisError),
}

/// Implementation of the Display trait for AppError.
///
/// ## Purpose:
/// This trait defines how errors are formatted as human-readable strings.
/// It's used when you print an error or convert it to a string.
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Analysis(err) => write!(f, "Analysis failed: {}", err),
        }
    }
}

impl AppError {
    /// Machine-readable error type used in the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ValidationError(_) => "validation_error",
            AppError::Unavailable(_) => "service_unavailable",
            AppError::Analysis(AnalysisError::Network { .. }) => "network_error",
            AppError::Analysis(AnalysisError::UnsupportedFormat { .. }) => "unsupported_format",
            AppError::Analysis(AnalysisError::Decode { .. }) => "decode_error",
            AppError::Analysis(AnalysisError::InvalidInput { .. }) => "validation_error",
            AppError::Analysis(AnalysisError::Internal { .. }) => "internal_error",
        }
    }

    /// Whether the same request might succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Unavailable(_) => true,
            AppError::Analysis(err) => err.is_retryable(),
            _ => false,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Unavailable(msg) => msg.clone(),
            AppError::Analysis(err) => err.to_string(),
        }
    }
}

/// Implementation of the ResponseError trait for AppError.
///
/// ## HTTP Status Code Mapping:
/// - Internal → 500 (Internal Server Error)
/// - BadRequest/ValidationError → 400 (Bad Request)
/// - Unavailable → 503 (Service Unavailable)
/// - Network failure while signing or fetching → 502 (Bad Gateway)
/// - Unsupported container/codec → 415 (Unsupported Media Type)
/// - Empty or corrupt audio → 422 (Unprocessable Entity)
/// - A pipeline request that can never succeed → 400 (Bad Request)
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "decode_error",
///     "message": "could not decode audio: audio is empty",
///     "stage": "decode",
///     "retryable": false,
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Analysis(AnalysisError::Network { .. }) => StatusCode::BAD_GATEWAY,
            AppError::Analysis(AnalysisError::UnsupportedFormat { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            AppError::Analysis(AnalysisError::Decode { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Analysis(AnalysisError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            AppError::Analysis(AnalysisError::Internal { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let stage = match self {
            AppError::Analysis(err) => Some(err.stage().as_str()),
            _ => None,
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),            // Machine-readable error type
                "message": self.message(),            // Human-readable error message
                "stage": stage,                       // Pipeline stage, if any
                "retryable": self.is_retryable(),
                "timestamp": chrono::Utc::now().to_rfc3339()  // When the error occurred
            }
        }))
    }
}

/// Pipeline failures keep their full cause chain in the server log;
/// the client only gets the top-level message.
impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        tracing::error!(stage = %err.stage(), error = ?err, "Analysis failed");
        AppError::Analysis(err)
    }
}

/// Automatic conversion from anyhow::Error to AppError.
///
/// ## Usage:
/// When you use `?` with an anyhow::Error, it automatically becomes an AppError::Internal.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Type alias for Results that use our custom error type.
///
/// ## Usage Example:
/// ```rust
/// async fn handler() -> AppResult<HttpResponse> {
///     // This is equivalent to: Result<HttpResponse, AppError>
///     Ok(HttpResponse::Ok().finish())
/// }
/// ```
pub type AppResult<T> = Result<T, AppError>;
