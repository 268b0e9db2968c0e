//! Pixels API Server Entry Point
//!
//! Connects both stores, applies the schema, warms the canvas snapshot and
//! serves until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use pixels_api::telemetry::{init_tracer, TelemetryConfig};
use pixels_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbConfig,
    PgHistoryStore, RedisConfig, RedisFastStore,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry = init_tracer(&TelemetryConfig::default())?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env()?;

    let pool = DbConfig::from_env().create_pool()?;
    let history = PgHistoryStore::new(pool);
    history.migrate().await?;

    let fast = RedisFastStore::connect(&RedisConfig::from_env()).await?;

    let state = AppState::new(Arc::new(history), Arc::new(fast), auth_config, api_config);

    // Build the snapshot before taking traffic; a failure here only delays
    // the first build to the first read.
    match state.cache.get_snapshot().await {
        Ok(read) => tracing::info!(freshness = read.freshness.as_str(), "canvas warmed up"),
        Err(err) => tracing::warn!(error = %err, "canvas warm-up failed"),
    }

    let app = create_api_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Pixels API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    telemetry.shutdown();
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("PIXELS_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("PIXELS_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
