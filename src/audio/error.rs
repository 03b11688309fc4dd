//! Error taxonomy for the analysis pipeline.
//!
//! Every failure carries the stage it came from so the HTTP layer can tell the
//! client what broke and whether trying again makes sense.

use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Pipeline stage a failure originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Issuing a signed URL for a stored recording
    Sign,
    /// Downloading the recording
    Fetch,
    /// Turning container bytes into samples
    Decode,
    /// Short-time feature computation
    Extract,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Sign => "sign",
            Stage::Fetch => "fetch",
            Stage::Decode => "decode",
            Stage::Extract => "extract",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort an analysis.
///
/// No variant ever comes with a partial result; the first failing stage wins.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Transport failure, timeout, non-success status or oversize body.
    #[error("{stage} failed: {message}")]
    Network {
        stage: Stage,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// No compiled-in reader or codec understands the recording.
    #[error("unsupported audio format: {message}")]
    UnsupportedFormat {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The recording is empty, truncated or otherwise unreadable.
    #[error("could not decode audio: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The caller asked for something that can never succeed (e.g. an empty object path).
    #[error("invalid {stage} request: {message}")]
    InvalidInput { stage: Stage, message: String },

    /// Anything else, with the original cause kept for diagnostics.
    #[error("internal error during {stage}: {source}")]
    Internal {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },
}

impl AnalysisError {
    pub fn network(stage: Stage, message: impl Into<String>) -> Self {
        AnalysisError::Network { stage, message: message.into(), source: None }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        AnalysisError::Decode { message: message.into(), source: None }
    }

    pub fn decode_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AnalysisError::Decode { message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn unsupported_with<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AnalysisError::UnsupportedFormat { message: message.into(), source: Some(Box::new(source)) }
    }

    pub fn invalid_input(stage: Stage, message: impl Into<String>) -> Self {
        AnalysisError::InvalidInput { stage, message: message.into() }
    }

    pub fn internal(stage: Stage, source: impl Into<anyhow::Error>) -> Self {
        AnalysisError::Internal { stage, source: source.into() }
    }

    /// Stage the failure originated in.
    pub fn stage(&self) -> Stage {
        match self {
            AnalysisError::Network { stage, .. } => *stage,
            AnalysisError::UnsupportedFormat { .. } | AnalysisError::Decode { .. } => Stage::Decode,
            AnalysisError::InvalidInput { stage, .. } | AnalysisError::Internal { stage, .. } => *stage,
        }
    }

    /// Only network failures are worth retrying; bad input stays bad.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Network { .. })
    }

    /// Build a network error from a reqwest failure, naming timeouts explicitly.
    pub fn from_reqwest(stage: Stage, err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if let Some(status) = err.status() {
            format!("remote returned {}", status)
        } else {
            err.to_string()
        };
        AnalysisError::Network { stage, message, source: Some(err) }
    }
}
