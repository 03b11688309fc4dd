//! # Application State Management
//!
//! This module manages state that every HTTP request handler needs: the loaded
//! configuration, the analysis pipeline, the storage signer, and request metrics.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Allows multiple parts of the program to safely share ownership of data
//! - **Why needed**: Actix runs one `App` per worker thread; each gets a clone of `AppState`
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Allows multiple readers OR one writer at a time
//! - **Why needed**: Every request updates metrics, while `/metrics` and `/health` read them
//!
//! ### RAII guards
//! - **AnalysisPermit**: Holding one means "an analysis is running". Dropping it,
//!   on success, error or panic, gives the slot back. No code path can forget to.
//!
//! The configuration itself is immutable after startup, so it only needs an `Arc`.

use crate::audio::pipeline::AnalysisPipeline;
use crate::config::AppConfig;
use crate::storage::StorageClient;
use std::collections::HashMap;       // For storing per-endpoint metrics
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;              // For tracking server uptime

/// The main application state that's shared across all HTTP request handlers.
///
/// ## Rust Concepts:
/// - **#[derive(Clone)]**: Cloning only bumps reference counts, nothing is copied
/// - **Arc<RwLock<T>>**: Thread-safe shared mutable data (the metrics)
/// - **Arc<T>**: Thread-safe shared read-only data (the config)
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration, fixed at startup
    pub config: Arc<AppConfig>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Fetch → decode → extract → score
    pub pipeline: AnalysisPipeline,

    /// Signs storage paths into downloadable URLs
    pub storage: StorageClient,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Metrics collected across all HTTP requests.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: Load and reliability monitoring
/// - **active_analyses**: Recordings being decoded/analyzed right now (capacity planning)
/// - **analyses_completed / analyses_failed**: Pipeline outcome counts
/// - **endpoint_metrics**: Per-route statistics (for performance optimization)
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Analyses currently holding a permit
    pub active_analyses: u32,

    /// Analyses that produced a report
    pub analyses_completed: u64,

    /// Analyses that ended in an error
    pub analyses_failed: u64,

    /// Detailed metrics for each route
    /// Key: method plus route pattern (e.g., "POST /api/v1/analyze")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
///
/// ## Performance calculations:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

/// Proof that an analysis slot is reserved.
///
/// Created by [`AppState::try_begin_analysis`]; the slot is released on drop.
#[derive(Debug)]
pub struct AnalysisPermit {
    metrics: Arc<RwLock<AppMetrics>>,
    finished: bool,
}

impl AnalysisPermit {
    /// Record how the analysis ended. A permit dropped without calling this
    /// (e.g. the client disconnected mid-request) counts as failed.
    pub fn finish(mut self, success: bool) {
        self.record(success);
    }

    fn record(&mut self, success: bool) {
        if self.finished {
            return;
        }
        self.finished = true;

        let mut metrics = write_lock(&self.metrics);
        if success {
            metrics.analyses_completed += 1;
        } else {
            metrics.analyses_failed += 1;
        }
        metrics.active_analyses = metrics.active_analyses.saturating_sub(1);
    }
}

impl Drop for AnalysisPermit {
    fn drop(&mut self) {
        self.record(false);
    }
}

/// Acquire the metrics write lock, recovering the data if a holder panicked.
///
/// The metrics are plain counters, so a half-finished update is still usable.
fn write_lock(lock: &RwLock<AppMetrics>) -> RwLockWriteGuard<'_, AppMetrics> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock(lock: &RwLock<AppMetrics>) -> RwLockReadGuard<'_, AppMetrics> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Implementation of methods for AppState.
impl AppState {
    /// Create a new AppState.
    ///
    /// ## What this does:
    /// 1. Wraps the config in an Arc for cheap sharing
    /// 2. Creates empty metrics
    /// 3. Records the current time as the server start time
    pub fn new(config: AppConfig, pipeline: AnalysisPipeline, storage: StorageClient) -> Self {
        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            pipeline,
            storage,
            start_time: Instant::now(),
        }
    }

    /// Borrow the startup configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        write_lock(&self.metrics).request_count += 1;
    }

    /// Increment the total error counter (called for every 4xx/5xx response).
    pub fn increment_error_count(&self) {
        write_lock(&self.metrics).error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// ## HashMap operations:
    /// The first time we see an endpoint, we create a new EndpointMetric with default values.
    /// Subsequent requests update the existing metrics for that endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = write_lock(&self.metrics);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Reserve a slot for one analysis, or `None` if the server is at its limit.
    ///
    /// ## Thread Safety:
    /// The check and the increment happen under one write lock, so two requests
    /// can never both take the last slot.
    pub fn try_begin_analysis(&self) -> Option<AnalysisPermit> {
        let limit = self.config.performance.max_concurrent_analyses;
        let mut metrics = write_lock(&self.metrics);

        if metrics.active_analyses as usize >= limit {
            return None;
        }
        metrics.active_analyses += 1;

        Some(AnalysisPermit {
            metrics: Arc::clone(&self.metrics),
            finished: false,
        })
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    ///
    /// ## Why a snapshot:
    /// Cloning releases the lock immediately, so serializing the response
    /// doesn't block requests that want to record metrics.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        read_lock(&self.metrics).clone()
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// Implementation of utility methods for EndpointMetric.
impl EndpointMetric {
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no average to calculate
        }
    }

    /// Error Rate = Number of Errors ÷ Total Requests (0.0 to 1.0)
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no errors possible
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use std::time::Duration;

    /// State wired to an unreachable storage endpoint, for handler tests.
    pub(crate) fn test_state(config: AppConfig) -> AppState {
        test_state_with_storage(config, "http://127.0.0.1:1")
    }

    /// State whose storage API lives at `storage_url`.
    pub(crate) fn test_state_with_storage(config: AppConfig, storage_url: &str) -> AppState {
        let storage = StorageClient::new(
            &StorageConfig {
                url: storage_url.to_string(),
                service_key: "test-key".to_string(),
                bucket: "sleep-audio".to_string(),
                signed_url_ttl_secs: 60,
            },
            Duration::from_secs(2),
        )
        .unwrap();
        let pipeline = AnalysisPipeline::from_config(&config).unwrap();
        AppState::new(config, pipeline, storage)
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = test_state(AppConfig::default());
        state.record_endpoint_request("GET /health", 10, false);
        state.record_endpoint_request("GET /health", 30, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["GET /health"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 20.0);
        assert_eq!(metric.error_rate(), 0.5);
        assert_eq!(EndpointMetric::default().average_duration_ms(), 0.0);
    }

    #[test]
    fn test_permits_are_bounded_and_released() {
        let mut config = AppConfig::default();
        config.performance.max_concurrent_analyses = 2;
        let state = test_state(config);

        let first = state.try_begin_analysis().expect("first slot");
        let second = state.try_begin_analysis().expect("second slot");
        assert!(state.try_begin_analysis().is_none());
        assert_eq!(state.get_metrics_snapshot().active_analyses, 2);

        first.finish(true);
        assert_eq!(state.get_metrics_snapshot().active_analyses, 1);

        drop(second);
        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.active_analyses, 0);
        assert_eq!(snapshot.analyses_completed, 1);
        assert_eq!(snapshot.analyses_failed, 1);

        assert!(state.try_begin_analysis().is_some());
    }
}
