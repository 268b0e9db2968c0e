//! Per-route rate limit gate.
//!
//! One [`RouteGate`] is attached to each rate-limited route with
//! `route_layer`. Several gates may share one bucket, which is how the two
//! board read routes draw from a single pool.
//!
//! `HEAD` on a gated route reports the caller's quota without spending it.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::RETRY_AFTER, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use pixels_core::Identity;
use pixels_ratelimit::{AdmissionResult, RateLimitBucket, RequestContext};

use crate::constants::{
    HEADER_COOLDOWN_RESET, HEADER_REQUESTS_LIMIT, HEADER_REQUESTS_PERIOD,
    HEADER_REQUESTS_REMAINING, HEADER_REQUESTS_RESET,
};
use crate::error::ApiError;
use crate::telemetry::metrics::with_metrics;

#[derive(Clone)]
pub struct RouteGate {
    /// Stable route identifier used in bucket keys.
    pub route: &'static str,
    pub bucket: Arc<dyn RateLimitBucket>,
    /// When false the gate forwards every request untouched.
    pub enabled: bool,
}

impl RouteGate {
    pub fn new(route: &'static str, bucket: Arc<dyn RateLimitBucket>, enabled: bool) -> Self {
        Self {
            route,
            bucket,
            enabled,
        }
    }
}

impl std::fmt::Debug for RouteGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteGate")
            .field("route", &self.route)
            .field("bucket", self.bucket.config())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Write the `requests-*` headers, plus `cooldown-reset` and `retry-after`
/// when the result is a rejection.
pub fn apply_quota_headers(headers: &mut HeaderMap, result: &AdmissionResult) {
    let mut set = |name: &'static str, value: u64| {
        headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
    };
    set(HEADER_REQUESTS_REMAINING, u64::from(result.remaining));
    set(HEADER_REQUESTS_LIMIT, u64::from(result.limit));
    set(HEADER_REQUESTS_RESET, result.reset_seconds);
    set(HEADER_REQUESTS_PERIOD, result.period_seconds);

    if let Some(retry) = result.retry_after_seconds.filter(|_| !result.admitted) {
        headers.insert(
            HeaderName::from_static(HEADER_COOLDOWN_RESET),
            HeaderValue::from(retry),
        );
        headers.insert(RETRY_AFTER, HeaderValue::from(retry));
    }
}

pub async fn rate_limit_gate(
    State(gate): State<RouteGate>,
    request: Request,
    next: Next,
) -> Response {
    if !gate.enabled {
        return next.run(request).await;
    }

    let identity = request.extensions().get::<Identity>().copied();
    let ctx = RequestContext::new(gate.route, identity.as_ref());

    if request.method() == Method::HEAD {
        return match gate.bucket.inspect(&ctx).await {
            Ok(result) => {
                let mut response = StatusCode::OK.into_response();
                apply_quota_headers(response.headers_mut(), &result);
                response
            }
            Err(err) => ApiError::from(err).into_response(),
        };
    }

    let admission = match gate.bucket.check_and_record(&ctx).await {
        Ok(admission) => admission,
        Err(err) => {
            with_metrics(|m| m.record_rate_limit(gate.route, "error"));
            return ApiError::from(err).into_response();
        }
    };

    if !admission.admitted() {
        with_metrics(|m| m.record_rate_limit(gate.route, "rejected"));
        let mut response =
            ApiError::too_many_requests(admission.result.retry_after_seconds).into_response();
        apply_quota_headers(response.headers_mut(), &admission.result);
        return response;
    }
    with_metrics(|m| m.record_rate_limit(gate.route, "admitted"));

    let mut response = next.run(request).await;

    let failed = response.status().is_client_error();
    let result = gate
        .bucket
        .settle(&admission, failed)
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(
                route = gate.route,
                bucket = %admission.key,
                error = %err,
                "could not settle admission"
            );
            admission.result
        });
    apply_quota_headers(response.headers_mut(), &result);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
        headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_admitted_headers() {
        let mut headers = HeaderMap::new();
        apply_quota_headers(
            &mut headers,
            &AdmissionResult {
                admitted: true,
                remaining: 4,
                limit: 5,
                period_seconds: 10,
                reset_seconds: 7,
                retry_after_seconds: None,
            },
        );
        assert_eq!(header(&headers, "requests-remaining"), Some("4"));
        assert_eq!(header(&headers, "requests-limit"), Some("5"));
        assert_eq!(header(&headers, "requests-reset"), Some("7"));
        assert_eq!(header(&headers, "requests-period"), Some("10"));
        assert!(headers.get("cooldown-reset").is_none());
        assert!(headers.get("retry-after").is_none());
    }

    #[test]
    fn test_rejected_headers_carry_cooldown() {
        let mut headers = HeaderMap::new();
        apply_quota_headers(
            &mut headers,
            &AdmissionResult {
                admitted: false,
                remaining: 0,
                limit: 2,
                period_seconds: 120,
                reset_seconds: 95,
                retry_after_seconds: Some(180),
            },
        );
        assert_eq!(header(&headers, "requests-remaining"), Some("0"));
        assert_eq!(header(&headers, "cooldown-reset"), Some("180"));
        assert_eq!(header(&headers, "retry-after"), Some("180"));
    }
}
