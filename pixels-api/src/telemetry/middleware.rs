//! HTTP request tracing and metrics.
//!
//! Every request gets a server span parented on the caller's W3C
//! `traceparent` header, a latency observation and a completion log line.

use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use opentelemetry::{global, Context};
use opentelemetry_http::HeaderExtractor;
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::metrics::with_metrics;

fn extract_trace_context(headers: &HeaderMap) -> Context {
    global::get_text_map_propagator(|propagator| propagator.extract(&HeaderExtractor(headers)))
}

/// Route template used as the metrics label; unmatched paths collapse to
/// one value to keep label cardinality bounded.
fn route_label(request: &Request) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string())
}

pub async fn observability_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = route_label(&request);

    let span = info_span!(
        "http_request",
        otel.name = %format!("{} {}", method, route),
        otel.kind = "server",
        http.method = %method,
        http.target = %path,
        http.route = %route,
        http.status_code = tracing::field::Empty,
    );
    if let Err(err) = span.set_parent(extract_trace_context(request.headers())) {
        tracing::debug!(error = ?err, "request span not parented on traceparent");
    }

    let response = next.run(request).instrument(span.clone()).await;

    let status = response.status();
    let duration = start.elapsed();
    span.record("http.status_code", status.as_u16());

    with_metrics(|m| {
        m.record_http_request(method.as_str(), &route, status.as_u16(), duration.as_secs_f64())
    });

    tracing::info!(
        parent: &span,
        method = %method,
        path = %path,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        "Request completed"
    );

    response
}
