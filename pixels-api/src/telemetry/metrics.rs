//! Prometheus Metrics
//!
//! Request, canvas and rate-limit metrics registered on the default
//! registry and exposed at `/metrics` for scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<PixelsMetrics>> = Lazy::new(PixelsMetrics::new);

#[derive(Clone)]
pub struct PixelsMetrics {
    /// labels: method, path, status
    pub http_requests_total: CounterVec,

    /// labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Board and pixel reads - labels: freshness
    pub snapshot_reads_total: CounterVec,

    /// Forced refreshes - labels: outcome (refreshed/contended/error)
    pub cache_refreshes_total: CounterVec,

    /// Gate decisions - labels: route, outcome (admitted/rejected/error)
    pub rate_limit_decisions_total: CounterVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl PixelsMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "pixels_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "pixels_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            snapshot_reads_total: register_counter_vec!(
                "pixels_snapshot_reads_total",
                "Canvas reads by snapshot freshness",
                &["freshness"]
            )
            .map_err(|e| registration_error("snapshot_reads_total", e))?,

            cache_refreshes_total: register_counter_vec!(
                "pixels_cache_refreshes_total",
                "Forced snapshot refreshes by outcome",
                &["outcome"]
            )
            .map_err(|e| registration_error("cache_refreshes_total", e))?,

            rate_limit_decisions_total: register_counter_vec!(
                "pixels_rate_limit_decisions_total",
                "Rate limit gate decisions",
                &["route", "outcome"]
            )
            .map_err(|e| registration_error("rate_limit_decisions_total", e))?,
        })
    }

    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_snapshot_read(&self, freshness: &str) {
        self.snapshot_reads_total
            .with_label_values(&[freshness])
            .inc();
    }

    pub fn record_refresh(&self, outcome: &str) {
        self.cache_refreshes_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_rate_limit(&self, route: &str, outcome: &str) {
        self.rate_limit_decisions_total
            .with_label_values(&[route, outcome])
            .inc();
    }
}

/// Run `f` against the global metrics if they registered.
pub(crate) fn with_metrics(f: impl FnOnce(&PixelsMetrics)) {
    if let Ok(metrics) = METRICS.as_ref() {
        f(metrics);
    }
}

/// Handler for `GET /metrics`. Returns Prometheus text format.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_canvas_metrics() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_snapshot_read("stale");
        metrics.record_snapshot_read("stale");
        let stale = metrics.snapshot_reads_total.with_label_values(&["stale"]);
        assert!(stale.get() >= 2.0);
        metrics.record_refresh("contended");
        Ok(())
    }

    #[test]
    fn test_record_rate_limit() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        metrics.record_rate_limit("set_pixel", "rejected");
        metrics.record_http_request("POST", "/set_pixel", 429, 0.002);
        Ok(())
    }

    #[tokio::test]
    async fn test_metrics_handler_encodes() {
        with_metrics(|m| m.record_refresh("refreshed"));
        let response = metrics_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
