//! # Application State
//!
//! Shared state handed to every request handler: the runtime configuration
//! behind a reader-writer lock, request/pipeline metrics, and the server
//! start time. The Whisper engine and dialogue client are injected
//! separately as their own `web::Data` handles so tests can swap them out.

use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// State shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runtime configuration; readable concurrently, updatable via the API
    pub config: Arc<RwLock<AppConfig>>,

    /// Counters updated on every request
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Server start time; never changes, no lock needed
    pub start_time: Instant,
}

/// Counters collected across all requests.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total HTTP requests since startup
    pub request_count: u64,

    /// Total failed requests since startup
    pub error_count: u64,

    /// Completed pipeline runs (upload through dialogue reply)
    pub transcription_count: u64,

    /// Audio seconds that went through the transcriber
    pub audio_seconds_processed: f64,

    /// Per-endpoint latency and error statistics
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Statistics for a single endpoint, keyed as "METHOD /path".
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Snapshot of the current configuration. Cloning keeps the lock short.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record a completed pipeline run and the audio duration it processed.
    pub fn record_transcription(&self, audio_seconds: f64) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.transcription_count += 1;
        metrics.audio_seconds_processed += audio_seconds;
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();

        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Consistent copy of the metrics for serialization.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            transcription_count: metrics.transcription_count,
            audio_seconds_processed: metrics.audio_seconds_processed,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let state = AppState::new(AppConfig::default());

        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();
        state.record_transcription(2.5);
        state.record_transcription(1.0);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.transcription_count, 2);
        assert!((snapshot.audio_seconds_processed - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn endpoint_metrics_track_latency_and_errors() {
        let state = AppState::new(AppConfig::default());

        state.record_endpoint_request("POST /process-audio/", 100, false);
        state.record_endpoint_request("POST /process-audio/", 300, true);

        let snapshot = state.get_metrics_snapshot();
        let metric = &snapshot.endpoint_metrics["POST /process-audio/"];
        assert_eq!(metric.request_count, 2);
        assert_eq!(metric.average_duration_ms(), 200.0);
        assert_eq!(metric.error_rate(), 0.5);
    }

    #[test]
    fn config_update_rejects_invalid() {
        let state = AppState::new(AppConfig::default());
        let mut bad = AppConfig::default();
        bad.server.port = 0;

        assert!(state.update_config(bad).is_err());
        // Original config untouched
        assert_eq!(state.get_config().server.port, 8080);
    }
}
