//! Pixels Telemetry
//!
//! Structured logging, OpenTelemetry traces and Prometheus metrics for the
//! HTTP layer. Tracing works without a collector; spans are only exported
//! when an OTLP endpoint is configured.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, PixelsMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig, TelemetryGuard};
