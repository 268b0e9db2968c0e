//! Health Check Endpoints
//!
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - History Store and Fast Store reachability
//!
//! Health endpoints are neither authenticated nor rate limited.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use pixels_core::PixelsResult;
use pixels_storage::{FastStore, HistoryStore};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

const UNREACHABLE: &str = "unreachable";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub history_store: ComponentHealth,
    pub fast_store: ComponentHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    /// The probe's cause is logged; the response only says `unreachable`.
    fn from_probe(component: &'static str, started: Instant, probe: PixelsResult<()>) -> Self {
        match probe {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => {
                tracing::warn!(component, error = %e, "health probe failed");
                Self {
                    status: HealthStatus::Unhealthy,
                    latency_ms: None,
                    error: Some(UNREACHABLE.to_string()),
                }
            }
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct HealthState {
    pub history: Arc<dyn HistoryStore>,
    pub fast: Arc<dyn FastStore>,
    pub start_time: Instant,
}

impl From<&AppState> for HealthState {
    fn from(state: &AppState) -> Self {
        Self {
            history: state.history.clone(),
            fast: state.fast.clone(),
            start_time: state.start_time,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

pub async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let started = Instant::now();
    let history_store =
        ComponentHealth::from_probe("history_store", started, state.history.ping().await);
    let started = Instant::now();
    let fast_store = ComponentHealth::from_probe("fast_store", started, state.fast.ping().await);

    let overall_status = if history_store.status == HealthStatus::Healthy
        && fast_store.status == HealthStatus::Healthy
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    let status_code = if overall_status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        tracing::warn!("readiness probe failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: overall_status,
        message: None,
        details: Some(HealthDetails {
            history_store,
            fast_store,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: HealthState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .with_state(Arc::new(state))
}
