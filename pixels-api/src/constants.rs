//! Constants for the Pixels API
//!
//! Defaults and wire names used across the HTTP layer.

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Minimum required length for JWT secret keys
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Default JWT clock skew tolerance in seconds
pub const DEFAULT_JWT_CLOCK_SKEW_SECS: i64 = 60;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// RATE LIMIT HEADERS
// ============================================================================

/// Admissions left in the current window
pub const HEADER_REQUESTS_REMAINING: &str = "requests-remaining";

/// Window size in requests
pub const HEADER_REQUESTS_LIMIT: &str = "requests-limit";

/// Seconds until the oldest live entry expires
pub const HEADER_REQUESTS_RESET: &str = "requests-reset";

/// Window length in seconds
pub const HEADER_REQUESTS_PERIOD: &str = "requests-period";

/// Seconds until a rejected caller may retry
pub const HEADER_COOLDOWN_RESET: &str = "cooldown-reset";

/// Freshness of the snapshot a read was served from
pub const HEADER_CANVAS_FRESHNESS: &str = "canvas-freshness";

// ============================================================================
// ROUTE IDENTIFIERS
// ============================================================================
// Stable names used in bucket keys. Renaming one resets its windows.

pub const ROUTE_GET_SIZE: &str = "get_size";
pub const ROUTE_GET_PIXELS: &str = "get_pixels";
pub const ROUTE_GET_PIXEL: &str = "get_pixel";
pub const ROUTE_SET_PIXEL: &str = "set_pixel";
pub const ROUTE_DELETE_PIXEL: &str = "delete_pixel";
pub const ROUTE_REFRESH_CACHE: &str = "refresh_cache";
pub const ROUTE_PIXEL_HISTORY: &str = "pixel_history";

/// Pool shared by both board read routes
pub const CANVAS_READ_POOL: &str = "canvas-read";

// ============================================================================
// STORES
// ============================================================================

/// Default per-call Redis timeout in milliseconds
pub const DEFAULT_REDIS_TIMEOUT_MS: u64 = 500;

/// Default reconnect attempts for the Redis connection manager
pub const DEFAULT_REDIS_RETRIES: usize = 3;
