//! # Recording Fetcher
//!
//! Downloads a recording from a (usually signed, short-lived) URL.
//!
//! ## Contract:
//! - One attempt, no retries. The caller decides retry policy from the error.
//! - The whole request (connect + headers + body) is bounded by one timeout.
//! - Non-success statuses and bodies larger than the configured limit are errors.

use std::time::Duration;

use crate::audio::{AnalysisError, FormatHint, RawAudio, Stage};

/// HTTP downloader with a fixed per-request timeout and size limit.
///
/// `reqwest::Client` is an `Arc` internally, so cloning a `Fetcher` shares the
/// connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl Fetcher {
    /// Build a fetcher whose every request must finish within `timeout`.
    pub fn new(timeout: Duration, max_bytes: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client, max_bytes })
    }

    /// Download `url` into memory and tag it with `format`.
    ///
    /// ## Errors:
    /// Every failure is `AnalysisError::Network` in stage `fetch`:
    /// timeouts, connection errors, 4xx/5xx, and bodies over the size limit.
    pub async fn fetch(&self, url: &str, format: FormatHint) -> Result<RawAudio, AnalysisError> {
        tracing::debug!(format = %format, "Fetching recording");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AnalysisError::from_reqwest(Stage::Fetch, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::network(
                Stage::Fetch,
                format!("remote returned {}", status),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large(len as usize));
            }
        }

        // Stream the body so an unannounced oversize download stops early
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| AnalysisError::from_reqwest(Stage::Fetch, e))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(bytes.len() + chunk.len()));
            }
            bytes.extend_from_slice(&chunk);
        }

        tracing::info!(bytes = bytes.len(), format = %format, "Recording fetched");
        Ok(RawAudio::new(bytes, format))
    }

    fn too_large(&self, size: usize) -> AnalysisError {
        AnalysisError::network(
            Stage::Fetch,
            format!("recording too large: {} bytes (max: {} bytes)", size, self.max_bytes),
        )
    }
}
