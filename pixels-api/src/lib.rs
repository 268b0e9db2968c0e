//! Pixels API - HTTP layer for the shared pixel canvas
//!
//! Binds the canvas cache manager and the rate-limit buckets to concrete
//! stores (PostgreSQL for history, Redis for the snapshot and windows) and
//! serves them over axum. Every route passes bearer-token identity
//! extraction and, when rate limited, a per-route gate that reports quota
//! in response headers.

pub mod macros;
pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod middleware;
pub mod redis_store;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use auth::{generate_jwt_token, validate_jwt_token, AuthConfig, Claims, JwtSecret};
pub use config::{ApiConfig, LimitSetting, RouteLimits};
pub use db::{DbConfig, PgHistoryStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use redis_store::{RedisConfig, RedisFastStore};
pub use routes::create_api_router;
pub use state::{AppState, CanvasManager};
