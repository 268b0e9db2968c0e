//! HTTP Routes
//!
//! | Route | Bucket |
//! |-------|--------|
//! | `GET /get_size` | global |
//! | `GET /get_pixels`, `GET /get_pixel` | per caller, one pool for both |
//! | `POST /set_pixel` | per caller, rejected edits handed back |
//! | `/mod/*` | per moderator and route |
//! | `/health/*`, `/metrics` | none |
//!
//! Every gated route also answers `HEAD` with the caller's quota.
//!
//! Layer order, outermost first: CORS, observability, identity, then the
//! per-route gate.

pub mod canvas;
pub mod health;
pub mod moderation;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, MethodRouter},
    Router,
};
use pixels_ratelimit::{
    Bucket, Global, KeyScope, PerIdentity, PrivilegedIdentity, RateLimitBucket, SharedRoutes,
};
use pixels_storage::FastStore;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ApiConfig, LimitSetting};
use crate::constants::{
    CANVAS_READ_POOL, HEADER_CANVAS_FRESHNESS, HEADER_COOLDOWN_RESET, HEADER_REQUESTS_LIMIT,
    HEADER_REQUESTS_PERIOD, HEADER_REQUESTS_REMAINING, HEADER_REQUESTS_RESET, ROUTE_DELETE_PIXEL,
    ROUTE_GET_PIXEL, ROUTE_GET_PIXELS, ROUTE_GET_SIZE, ROUTE_PIXEL_HISTORY, ROUTE_REFRESH_CACHE,
    ROUTE_SET_PIXEL,
};
use crate::error::ApiResult;
use crate::middleware::{identity_middleware, rate_limit_gate, RouteGate};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer. No configured origins means any origin.
pub fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static(HEADER_REQUESTS_REMAINING),
            HeaderName::from_static(HEADER_REQUESTS_LIMIT),
            HeaderName::from_static(HEADER_REQUESTS_RESET),
            HeaderName::from_static(HEADER_REQUESTS_PERIOD),
            HeaderName::from_static(HEADER_COOLDOWN_RESET),
            HeaderName::from_static(HEADER_CANVAS_FRESHNESS),
            header::RETRY_AFTER,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricted origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

// ============================================================================
// RATE LIMIT GATES
// ============================================================================

fn bucket<S: KeyScope + 'static>(
    scope: S,
    setting: &LimitSetting,
    fast: &Arc<dyn FastStore>,
) -> ApiResult<Arc<dyn RateLimitBucket>> {
    Ok(Arc::new(Bucket::new(
        scope,
        setting.bucket_config()?,
        fast.clone(),
    )))
}

fn gated(route: MethodRouter<AppState>, gate: RouteGate) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(gate, rate_limit_gate))
}

/// Makes `HEAD` routable on `POST` routes; the gate answers it before this
/// handler runs. `GET` routes get `HEAD` from axum.
async fn quota_probe() -> StatusCode {
    StatusCode::OK
}

/// One gate per route, built from the configured limits.
struct Gates {
    get_size: RouteGate,
    get_pixels: RouteGate,
    get_pixel: RouteGate,
    set_pixel: RouteGate,
    delete_pixel: RouteGate,
    refresh_cache: RouteGate,
    pixel_history: RouteGate,
}

impl Gates {
    fn build(config: &ApiConfig, fast: &Arc<dyn FastStore>) -> ApiResult<Self> {
        let limits = &config.limits;
        let enabled = config.rate_limit_enabled;

        let canvas_read = bucket(
            SharedRoutes::new(CANVAS_READ_POOL, PerIdentity),
            &limits.canvas_read,
            fast,
        )?;
        let moderation = bucket(PrivilegedIdentity, &limits.moderation, fast)?;

        Ok(Self {
            get_size: RouteGate::new(
                ROUTE_GET_SIZE,
                bucket(Global, &limits.get_size, fast)?,
                enabled,
            ),
            get_pixels: RouteGate::new(ROUTE_GET_PIXELS, canvas_read.clone(), enabled),
            get_pixel: RouteGate::new(ROUTE_GET_PIXEL, canvas_read, enabled),
            set_pixel: RouteGate::new(
                ROUTE_SET_PIXEL,
                bucket(PerIdentity, &limits.set_pixel, fast)?,
                enabled,
            ),
            delete_pixel: RouteGate::new(ROUTE_DELETE_PIXEL, moderation.clone(), enabled),
            refresh_cache: RouteGate::new(ROUTE_REFRESH_CACHE, moderation.clone(), enabled),
            pixel_history: RouteGate::new(ROUTE_PIXEL_HISTORY, moderation, enabled),
        })
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the complete router over `state`.
///
/// # Errors
///
/// Fails when a configured rate limit is invalid.
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    let gates = Gates::build(&state.config, &state.fast)?;
    if !state.config.rate_limit_enabled {
        tracing::warn!("rate limiting is disabled");
    }

    let api = Router::new()
        .route("/get_size", gated(get(canvas::get_size), gates.get_size))
        .route("/get_pixels", gated(get(canvas::get_pixels), gates.get_pixels))
        .route("/get_pixel", gated(get(canvas::get_pixel), gates.get_pixel))
        .route(
            "/set_pixel",
            gated(post(canvas::set_pixel).head(quota_probe), gates.set_pixel),
        )
        .route(
            "/mod/delete_pixel",
            gated(
                post(moderation::delete_pixel).head(quota_probe),
                gates.delete_pixel,
            ),
        )
        .route(
            "/mod/refresh_cache",
            gated(
                post(moderation::refresh_cache).head(quota_probe),
                gates.refresh_cache,
            ),
        )
        .route(
            "/mod/pixel_history",
            gated(get(moderation::pixel_history), gates.pixel_history),
        )
        .layer(from_fn_with_state(state.auth.clone(), identity_middleware))
        .with_state(state.clone());

    let app = api
        .nest("/health", health::create_router(health::HealthState::from(&state)))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(from_fn(observability_middleware)),
        )
        .layer(build_cors_layer(&state.config));

    Ok(app)
}
