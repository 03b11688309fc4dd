//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Platform and storage variables (HOST, PORT, SUPABASE_*)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **impl blocks**: Add methods to structs
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Platform variables (HOST, PORT, SUPABASE_URL, SUPABASE_SERVICE_ROLE_KEY, SUPABASE_BUCKET)
//! 2. Environment variables (APP_SERVER__HOST, APP_STORAGE__BUCKET, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! The whole configuration is loaded once at startup and passed down explicitly.
//! Nothing in the request path reads the process environment.

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables
use std::time::Duration;

use crate::audio::FormatHint;

/// Main application configuration that contains all settings.
///
/// ## Rust Concepts:
/// - **#[derive(...)]**: Automatically implements common traits:
///   - `Debug`: Allows printing with {:?} for debugging
///   - `Clone`: Allows making copies of the struct
///   - `Serialize`: Can convert this struct to JSON, TOML, etc.
///   - `Deserialize`: Can create this struct from JSON, TOML, etc.
///
/// ## Why separate config structs:
/// Each section maps to one concern: where we listen, where recordings live,
/// how the analysis pipeline is bounded, and how much work runs at once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub analysis: AnalysisConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
}

/// Object storage credentials used to sign recording URLs.
///
/// ## Fields:
/// - `url`: Base URL of the storage project (e.g. "https://abc.supabase.co")
/// - `service_key`: Service role key sent as a bearer token
/// - `bucket`: Bucket holding the uploaded recordings
/// - `signed_url_ttl_secs`: Lifetime of every signed URL we request
///
/// `url` and `service_key` default to empty. They are not checked by
/// `AppConfig::validate` but by `StorageClient::new`, which refuses to build
/// a client without them so the server fails at startup instead of on the
/// first request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub url: String,
    pub service_key: String,
    pub bucket: String,
    pub signed_url_ttl_secs: u64,
}

/// Bounds for the fetch → decode → extract pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Whole-request timeout for downloading a recording
    pub fetch_timeout_secs: u64,

    /// Largest recording (in bytes) we will download or accept as an upload
    pub max_audio_bytes: usize,

    /// Container hint used when a file name carries no known extension
    pub default_format: String,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_analyses`: How many recordings may be decoded and analyzed at once.
///   Requests beyond this are rejected with 503 rather than queued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_analyses: usize,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8000,
            },
            storage: StorageConfig {
                url: String::new(),
                service_key: String::new(),
                bucket: "sleep-audio".to_string(),
                signed_url_ttl_secs: 3600,      // One hour
            },
            analysis: AnalysisConfig {
                fetch_timeout_secs: 30,
                max_audio_bytes: 50 * 1024 * 1024,  // 50MB
                default_format: FormatHint::DEFAULT_EXTENSION.to_string(),
            },
            performance: PerformanceConfig {
                max_concurrent_analyses: 8,
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for platform and storage variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_ANALYSIS__FETCH_TIMEOUT_SECS=10`: Override fetch timeout
    /// - `PORT=3000`: Special case for deployment platforms
    /// - `SUPABASE_SERVICE_ROLE_KEY=...`: Storage credentials as issued by the provider
    ///
    /// ## Why a double underscore:
    /// Field names contain single underscores (`service_key`), so `__` is the only
    /// unambiguous separator between a section and its field.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists) - required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Variables that don't follow the APP_ convention but are what the
        // hosting platform and the storage provider hand out
        let overrides = [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("SUPABASE_URL", "storage.url"),
            ("SUPABASE_SERVICE_ROLE_KEY", "storage.service_key"),
            ("SUPABASE_BUCKET", "storage.bucket"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        // Build the final configuration and convert it back to our AppConfig struct
        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Signed URLs live for at least one second
    /// - The fetch timeout and maximum recording size are non-zero
    /// - The default format is one the decoder knows how to hint
    /// - At least one analysis may run at a time
    ///
    /// ## Why validate:
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.storage.signed_url_ttl_secs == 0 {
            return Err(anyhow::anyhow!("Signed URL TTL must be greater than 0"));
        }

        if self.analysis.fetch_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Fetch timeout must be greater than 0"));
        }

        if self.analysis.max_audio_bytes == 0 {
            return Err(anyhow::anyhow!("Max audio size must be greater than 0"));
        }

        if !FormatHint::is_known(&self.analysis.default_format) {
            return Err(anyhow::anyhow!(
                "Unknown default audio format '{}' (expected one of: {})",
                self.analysis.default_format,
                FormatHint::KNOWN_EXTENSIONS.join(", ")
            ));
        }

        if self.performance.max_concurrent_analyses == 0 {
            return Err(anyhow::anyhow!("Max concurrent analyses must be greater than 0"));
        }

        Ok(())  // All validation passed
    }

    /// Fetch timeout as a `Duration`, ready for the HTTP client builder.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis.fetch_timeout_secs)
    }

    /// Format hint used when a file name doesn't provide one.
    pub fn default_format(&self) -> FormatHint {
        FormatHint::from_extension(&self.analysis.default_format)
    }

    /// A JSON view of the configuration that is safe to return over HTTP.
    ///
    /// The service key is never echoed back; only whether one is set.
    pub fn redacted(&self) -> serde_json::Value {
        serde_json::json!({
            "server": {
                "host": self.server.host,
                "port": self.server.port
            },
            "storage": {
                "url": self.storage.url,
                "bucket": self.storage.bucket,
                "signed_url_ttl_secs": self.storage.signed_url_ttl_secs,
                "service_key_set": !self.storage.service_key.is_empty()
            },
            "analysis": {
                "fetch_timeout_secs": self.analysis.fetch_timeout_secs,
                "max_audio_bytes": self.analysis.max_audio_bytes,
                "default_format": self.analysis.default_format
            },
            "performance": {
                "max_concurrent_analyses": self.performance.max_concurrent_analyses
            }
        })
    }
}
