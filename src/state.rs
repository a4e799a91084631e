//! # Application State Management
//!
//! Shared state that every HTTP handler and WebSocket connection needs access
//! to: the runtime configuration, the session registry, the recognition
//! engine, and gateway-wide metrics.
//!
//! ## Sharing pattern
//!
//! Everything mutable lives behind `Arc<RwLock<T>>` so multiple requests can
//! read simultaneously while updates (config changes, metric increments) take
//! exclusive access briefly. The engine is `Arc<dyn RecognitionEngine>`:
//! immutable once constructed, so no lock is needed, and the trait object
//! lets the backend be swapped at startup without touching call sites.

use crate::config::AppConfig;
use crate::recognition::RecognitionEngine;
use crate::session::SessionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// The main application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime via the API)
    pub config: Arc<RwLock<AppConfig>>,

    /// All live transcription sessions, keyed by task id
    pub registry: Arc<SessionRegistry>,

    /// The speech recognition backend
    pub engine: Arc<dyn RecognitionEngine>,

    /// Gateway-wide counters, constantly updated by requests and connections
    pub metrics: Arc<RwLock<GatewayMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests and WebSocket connections.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of HTTP errors since server start
    pub error_count: u64,

    /// Current number of open WebSocket connections
    pub websocket_connections: u32,

    /// Total audio and command frames received over WebSocket
    pub frames_received: u64,

    /// Total protocol events sent back to clients
    pub events_emitted: u64,

    /// Total transcription sessions created since server start
    pub sessions_created: u64,

    /// Detailed metrics for each API endpoint (e.g. "GET /health")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-endpoint request statistics.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    /// Number of requests to this specific endpoint
    pub request_count: u64,

    /// Total time spent processing requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    /// Number of errors that occurred for this endpoint
    pub error_count: u64,
}

impl AppState {
    /// Create a new AppState with the given configuration and engine.
    pub fn new(config: AppConfig, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            registry: Arc::new(SessionRegistry::new()),
            engine,
            metrics: Arc::new(RwLock::new(GatewayMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// Cloning releases the read lock immediately so other threads aren't
    /// blocked while the caller works with the snapshot.
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

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    /// Increment the total error counter (called when any request fails).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record timing and outcome for a specific endpoint.
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

    /// A WebSocket connection was opened.
    pub fn websocket_connected(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.websocket_connections += 1;
    }

    /// A WebSocket connection closed. Guards against underflow so a double
    /// disconnect can't wrap the counter.
    pub fn websocket_disconnected(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.websocket_connections > 0 {
            metrics.websocket_connections -= 1;
        }
    }

    /// Count an inbound WebSocket frame (text command or binary audio).
    pub fn record_frame_received(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.frames_received += 1;
    }

    /// Count an outbound protocol event.
    pub fn record_event_emitted(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.events_emitted += 1;
    }

    /// Count a newly created transcription session.
    pub fn record_session_created(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.sessions_created += 1;
    }

    /// Get a consistent snapshot of current metrics for the /metrics endpoint.
    ///
    /// The HashMap clone can be expensive with many endpoints, but it avoids
    /// holding the lock while the HTTP response is serialized.
    pub fn get_metrics_snapshot(&self) -> GatewayMetrics {
        let metrics = self.metrics.read().unwrap();
        GatewayMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            websocket_connections: metrics.websocket_connections,
            frames_received: metrics.frames_received,
            events_emitted: metrics.events_emitted,
            sessions_created: metrics.sessions_created,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    /// Get server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    /// Average response time for this endpoint in milliseconds.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate for this endpoint as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
