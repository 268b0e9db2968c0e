//! API Configuration Module
//!
//! Board geometry, sync protocol timing, CORS and per-route rate limits.
//! Configuration is loaded from environment variables with defaults that
//! match the production canvas.

use std::time::Duration;

use pixels_cache::CacheConfig;
use pixels_core::{BoardSize, Rgb};
use pixels_ratelimit::BucketConfig;

use crate::constants::DEFAULT_CORS_MAX_AGE_SECS;
use crate::error::{ApiError, ApiResult};

// ============================================================================
// BUCKET SETTINGS
// ============================================================================

/// Raw limits for one bucket, as configured.
///
/// Kept unvalidated so loading config never fails; [`LimitSetting::bucket_config`]
/// validates when the router is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSetting {
    pub requests: u32,
    pub window_secs: u64,
    pub cooldown_secs: u64,
    pub count_failed_requests: bool,
}

impl LimitSetting {
    pub const fn new(
        requests: u32,
        window_secs: u64,
        cooldown_secs: u64,
        count_failed_requests: bool,
    ) -> Self {
        Self {
            requests,
            window_secs,
            cooldown_secs,
            count_failed_requests,
        }
    }

    /// Parse `requests/window_secs/cooldown_secs`, keeping this setting's
    /// `count_failed_requests`.
    pub fn parse(&self, value: &str) -> Option<Self> {
        let mut parts = value.trim().split('/').map(str::trim);
        let requests = parts.next()?.parse().ok()?;
        let window_secs = parts.next()?.parse().ok()?;
        let cooldown_secs = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            requests,
            window_secs,
            cooldown_secs,
            ..*self
        })
    }

    pub fn bucket_config(&self) -> ApiResult<BucketConfig> {
        BucketConfig::per_seconds(
            self.requests,
            self.window_secs,
            self.cooldown_secs,
            self.count_failed_requests,
        )
        .map_err(|e| ApiError::internal_error(format!("Invalid rate limit setting: {}", e)))
    }
}

/// One setting per bucket the router attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLimits {
    /// `GET /get_size`, shared by every caller.
    pub get_size: LimitSetting,
    /// `GET /get_pixels` and `GET /get_pixel`, one pool per caller.
    pub canvas_read: LimitSetting,
    /// `POST /set_pixel`, per caller; rejected edits are handed back.
    pub set_pixel: LimitSetting,
    /// `/mod/*`, per privileged caller.
    pub moderation: LimitSetting,
}

impl Default for RouteLimits {
    fn default() -> Self {
        Self {
            get_size: LimitSetting::new(5, 10, 20, true),
            canvas_read: LimitSetting::new(8, 10, 60, true),
            set_pixel: LimitSetting::new(2, 120, 180, false),
            moderation: LimitSetting::new(10, 60, 60, true),
        }
    }
}

impl RouteLimits {
    /// Override defaults from `PIXELS_LIMIT_<BUCKET>` variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            get_size: limit_from_env("PIXELS_LIMIT_GET_SIZE", defaults.get_size),
            canvas_read: limit_from_env("PIXELS_LIMIT_CANVAS_READ", defaults.canvas_read),
            set_pixel: limit_from_env("PIXELS_LIMIT_SET_PIXEL", defaults.set_pixel),
            moderation: limit_from_env("PIXELS_LIMIT_MODERATION", defaults.moderation),
        }
    }
}

fn limit_from_env(key: &str, default: LimitSetting) -> LimitSetting {
    let Ok(value) = std::env::var(key) else {
        return default;
    };
    default.parse(&value).unwrap_or_else(|| {
        tracing::warn!(
            key,
            value = %value,
            "expected requests/window_secs/cooldown_secs; using default"
        );
        default
    })
}

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Everything the HTTP layer needs besides store connections and auth.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Canvas
    // ========================================================================
    pub board: BoardSize,

    /// Color of cells with no surviving edit.
    pub background: Rgb,

    // ========================================================================
    // Sync protocol
    // ========================================================================
    /// Age after which another worker's sync lock is reclaimed.
    pub sync_watchdog: Duration,

    pub sync_max_reclaims: u32,

    /// How long a reader with no snapshot waits for another worker's build.
    pub cold_start_wait: Duration,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    pub cors_allow_credentials: bool,

    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    /// Master switch. When off every route is served unmetered.
    pub rate_limit_enabled: bool,

    pub limits: RouteLimits,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            board: BoardSize::default(),
            background: Rgb::WHITE,
            sync_watchdog: Duration::from_secs(10),
            sync_max_reclaims: 3,
            cold_start_wait: Duration::from_millis(5000),
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            rate_limit_enabled: true,
            limits: RouteLimits::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `PIXELS_BOARD_WIDTH` / `PIXELS_BOARD_HEIGHT`: board size (default: 160x90)
    /// - `PIXELS_BACKGROUND`: hex color of empty cells (default: FFFFFF)
    /// - `PIXELS_SYNC_WATCHDOG_SECS`: sync lock watchdog (default: 10)
    /// - `PIXELS_SYNC_MAX_RECLAIMS`: reclaim attempts per read (default: 3)
    /// - `PIXELS_COLD_START_WAIT_MS`: cold start wait (default: 5000)
    /// - `PIXELS_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `PIXELS_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `PIXELS_CORS_MAX_AGE_SECS`: preflight cache duration (default: 86400)
    /// - `PIXELS_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `PIXELS_LIMIT_{GET_SIZE,CANVAS_READ,SET_PIXEL,MODERATION}`:
    ///   `requests/window_secs/cooldown_secs`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let width = env_parse("PIXELS_BOARD_WIDTH").unwrap_or(defaults.board.width);
        let height = env_parse("PIXELS_BOARD_HEIGHT").unwrap_or(defaults.board.height);
        let board = BoardSize::new(width, height).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "invalid board size; using default");
            defaults.board
        });

        let background = std::env::var("PIXELS_BACKGROUND")
            .ok()
            .and_then(|s| s.parse::<Rgb>().ok())
            .unwrap_or(defaults.background);

        let cors_origins = std::env::var("PIXELS_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            board,
            background,
            sync_watchdog: env_parse("PIXELS_SYNC_WATCHDOG_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.sync_watchdog),
            sync_max_reclaims: env_parse("PIXELS_SYNC_MAX_RECLAIMS")
                .unwrap_or(defaults.sync_max_reclaims),
            cold_start_wait: env_parse("PIXELS_COLD_START_WAIT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cold_start_wait),
            cors_origins,
            cors_allow_credentials: std::env::var("PIXELS_CORS_ALLOW_CREDENTIALS")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.cors_allow_credentials),
            cors_max_age_secs: env_parse("PIXELS_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled: std::env::var("PIXELS_RATE_LIMIT_ENABLED")
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(defaults.rate_limit_enabled),
            limits: RouteLimits::from_env(),
        }
    }

    /// Cache manager settings derived from this config.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_board(self.board)
            .with_background(self.background)
            .with_watchdog_timeout(self.sync_watchdog)
            .with_max_reclaim_attempts(self.sync_max_reclaims)
            .with_cold_start_wait(self.cold_start_wait)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_setting_parse() {
        let default = LimitSetting::new(2, 120, 180, false);
        assert_eq!(
            default.parse("4/60/90"),
            Some(LimitSetting::new(4, 60, 90, false))
        );
        assert_eq!(
            default.parse(" 1 / 5 / 0 "),
            Some(LimitSetting::new(1, 5, 0, false))
        );
        assert_eq!(default.parse("4/60"), None);
        assert_eq!(default.parse("4/60/90/1"), None);
        assert_eq!(default.parse("four/60/90"), None);
        assert_eq!(default.parse("-1/60/90"), None);
    }

    #[test]
    fn test_limit_setting_validates_on_build() {
        assert!(LimitSetting::new(0, 10, 0, true).bucket_config().is_err());
        assert!(LimitSetting::new(1, 0, 0, true).bucket_config().is_err());
        assert!(LimitSetting::new(5, u64::MAX, 0, true).bucket_config().is_err());

        let config = LimitSetting::new(2, 120, 180, false).bucket_config().unwrap();
        assert_eq!(config.requests(), 2);
        assert_eq!(config.window(), Duration::from_secs(120));
        assert_eq!(config.cooldown(), Duration::from_secs(180));
        assert!(!config.count_failed_requests());
    }

    #[test]
    fn test_default_route_limits_build() {
        let limits = RouteLimits::default();
        for setting in [
            limits.get_size,
            limits.canvas_read,
            limits.set_pixel,
            limits.moderation,
        ] {
            assert!(setting.bucket_config().is_ok());
        }
        assert!(!limits.set_pixel.count_failed_requests);
    }

    #[test]
    fn test_cache_config_follows_api_config() {
        let config = ApiConfig {
            board: BoardSize::new(16, 9).unwrap(),
            background: Rgb::BLACK,
            sync_watchdog: Duration::from_secs(4),
            sync_max_reclaims: 1,
            cold_start_wait: Duration::from_millis(250),
            ..Default::default()
        };
        let cache = config.cache_config();
        assert_eq!(cache.board, config.board);
        assert_eq!(cache.background, Rgb::BLACK);
        assert_eq!(cache.watchdog_timeout, Duration::from_secs(4));
        assert_eq!(cache.max_reclaim_attempts, 1);
        assert_eq!(cache.cold_start_wait, Duration::from_millis(250));
    }

    #[test]
    fn test_defaults_match_production_canvas() {
        let config = ApiConfig::default();
        assert_eq!(config.board.width, 160);
        assert_eq!(config.board.height, 90);
        assert_eq!(config.background, Rgb::WHITE);
        assert!(config.rate_limit_enabled);
        assert!(config.cors_origins.is_empty());
    }
}
