//! # Object Storage Signer
//!
//! Recordings live in a private bucket. Before we can download one we ask the
//! storage API for a short-lived signed URL, using the service role key.
//!
//! ## Wire format (Supabase storage REST API):
//! ```text
//! POST {url}/storage/v1/object/sign/{bucket}/{path}
//! Authorization: Bearer {service_key}
//! {"expiresIn": 3600}
//!
//! 200 {"signedURL": "/object/sign/{bucket}/{path}?token=..."}
//! ```
//! The returned `signedURL` is relative to `{url}/storage/v1`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{AnalysisError, Stage};
use crate::config::StorageConfig;

/// Request body for the sign endpoint.
#[derive(Debug, Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

/// Response body of the sign endpoint.
#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: Option<String>,
}

/// Client for issuing signed download URLs.
///
/// ## Construction fails fast:
/// `new` refuses an empty URL or service key, so a misconfigured deployment
/// stops at startup instead of failing every request later.
#[derive(Debug, Clone)]
pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
    ttl_secs: u64,
}

impl StorageClient {
    pub fn new(config: &StorageConfig, timeout: Duration) -> Result<Self> {
        let base_url = config.url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow::anyhow!(
                "Storage URL is not configured (set SUPABASE_URL or storage.url)"
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("Storage URL must be http(s): {}", base_url));
        }
        if config.service_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Storage service key is not configured (set SUPABASE_SERVICE_ROLE_KEY or storage.service_key)"
            ));
        }
        if config.bucket.trim().is_empty() {
            return Err(anyhow::anyhow!("Storage bucket cannot be empty"));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            service_key: config.service_key.trim().to_string(),
            bucket: config.bucket.trim().to_string(),
            ttl_secs: config.signed_url_ttl_secs,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Endpoint that signs `path` in the configured bucket.
    fn sign_endpoint(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    /// Turn the API's relative `signedURL` into something we can GET.
    fn absolute_url(&self, signed: &str) -> String {
        if signed.starts_with("http://") || signed.starts_with("https://") {
            signed.to_string()
        } else {
            format!("{}/storage/v1/{}", self.base_url, signed.trim_start_matches('/'))
        }
    }

    /// Issue a signed URL for an object path inside the bucket.
    ///
    /// ## Errors:
    /// `Network` in stage `sign` for transport failures, non-success statuses and
    /// responses without a URL. An empty path is `InvalidInput`, rejected before
    /// any request is made.
    pub async fn create_signed_url(&self, path: &str) -> Result<String, AnalysisError> {
        let path = path.trim().trim_start_matches('/');
        if path.is_empty() {
            return Err(AnalysisError::invalid_input(Stage::Sign, "object path is empty"));
        }

        tracing::debug!(bucket = %self.bucket, path, ttl_secs = self.ttl_secs, "Requesting signed URL");

        let response = self
            .client
            .post(self.sign_endpoint(path))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .json(&SignRequest { expires_in: self.ttl_secs })
            .send()
            .await
            .map_err(|e| AnalysisError::from_reqwest(Stage::Sign, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::network(
                Stage::Sign,
                format!("storage returned {} for '{}'", status, path),
            ));
        }

        let body: SignResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::from_reqwest(Stage::Sign, e))?;

        let signed = body
            .signed_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| AnalysisError::network(Stage::Sign, "storage response has no signedURL"))?;

        Ok(self.absolute_url(&signed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{response, serve};

    fn storage_config(url: &str, key: &str) -> StorageConfig {
        StorageConfig {
            url: url.to_string(),
            service_key: key.to_string(),
            bucket: "sleep-audio".to_string(),
            signed_url_ttl_secs: 600,
        }
    }

    #[test]
    fn test_new_fails_fast_without_credentials() {
        let timeout = Duration::from_secs(5);
        assert!(StorageClient::new(&storage_config("", "key"), timeout).is_err());
        assert!(StorageClient::new(&storage_config("https://x.supabase.co", ""), timeout).is_err());
        assert!(StorageClient::new(&storage_config("ftp://x", "key"), timeout).is_err());
        assert!(StorageClient::new(&storage_config("https://x.supabase.co", "key"), timeout).is_ok());
    }

    #[test]
    fn test_url_building() {
        let client = StorageClient::new(
            &storage_config("https://x.supabase.co/", "key"),
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            client.sign_endpoint("/user-1/night.webm"),
            "https://x.supabase.co/storage/v1/object/sign/sleep-audio/user-1/night.webm"
        );
        assert_eq!(
            client.absolute_url("/object/sign/sleep-audio/user-1/night.webm?token=abc"),
            "https://x.supabase.co/storage/v1/object/sign/sleep-audio/user-1/night.webm?token=abc"
        );
        assert_eq!(client.absolute_url("https://cdn.example/a?t=1"), "https://cdn.example/a?t=1");
    }

    #[test]
    fn test_sign_response_parsing() {
        let body: SignResponse = serde_json::from_str(r#"{"signedURL": "/object/sign/b/p?token=t"}"#).unwrap();
        assert_eq!(body.signed_url.as_deref(), Some("/object/sign/b/p?token=t"));

        let body: SignResponse = serde_json::from_str(r#"{"error": "not found"}"#).unwrap();
        assert!(body.signed_url.is_none());
    }

    #[tokio::test]
    async fn test_empty_path_rejected_without_request() {
        let client = StorageClient::new(
            &storage_config("http://127.0.0.1:1", "key"),
            Duration::from_secs(1),
        )
        .unwrap();

        let err = client.create_signed_url("  / ").await.unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput { stage: Stage::Sign, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_storage_is_network_error() {
        let client = StorageClient::new(
            &storage_config("http://127.0.0.1:1", "key"),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = client.create_signed_url("user/night.webm").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Network { stage: Stage::Sign, .. }));
    }

    #[tokio::test]
    async fn test_signed_url_is_joined_onto_base() {
        let (base, log) = serve(|_| {
            response(
                "200 OK",
                "application/json",
                br#"{"signedURL": "/object/sign/sleep-audio/user-1/night.webm?token=abc"}"#,
            )
        })
        .await;
        let client = StorageClient::new(&storage_config(&base, "secret-key"), Duration::from_secs(5)).unwrap();

        let url = client.create_signed_url("/user-1/night.webm").await.unwrap();
        assert_eq!(
            url,
            format!("{}/storage/v1/object/sign/sleep-audio/user-1/night.webm?token=abc", base)
        );

        let request = log.lock().unwrap()[0].clone();
        assert!(request.starts_with("POST /storage/v1/object/sign/sleep-audio/user-1/night.webm "));
        let lowered = request.to_ascii_lowercase();
        assert!(lowered.contains("authorization: bearer secret-key"));
        assert!(lowered.contains("apikey: secret-key"));
        assert!(request.contains(r#"{"expiresIn":600}"#));
    }

    #[tokio::test]
    async fn test_sign_rejection_is_network_error() {
        let (base, _) = serve(|_| {
            response("403 Forbidden", "application/json", br#"{"error": "invalid signature"}"#)
        })
        .await;
        let client = StorageClient::new(&storage_config(&base, "key"), Duration::from_secs(5)).unwrap();

        let err = client.create_signed_url("user/night.webm").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Network { stage: Stage::Sign, .. }));
        assert!(err.to_string().contains("403"), "{}", err);
    }

    #[tokio::test]
    async fn test_sign_response_without_url_is_network_error() {
        let (base, _) = serve(|_| response("200 OK", "application/json", br#"{"error": "not found"}"#)).await;
        let client = StorageClient::new(&storage_config(&base, "key"), Duration::from_secs(5)).unwrap();

        let err = client.create_signed_url("user/night.webm").await.unwrap_err();
        assert!(matches!(err, AnalysisError::Network { stage: Stage::Sign, .. }));
        assert!(err.to_string().contains("no signedURL"), "{}", err);
    }
}
