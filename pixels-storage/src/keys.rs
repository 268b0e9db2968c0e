//! Well-known Fast Store key names.
//!
//! The snapshot lives under one fixed key. Rate-limit keys are derived from
//! `{variant, scope, route}` so every bucket variant gets its own namespace
//! and an absent component is spelled `*`.

/// Key of the packed board snapshot.
pub const SNAPSHOT_KEY: &str = "canvas-cache";

const RATE_LIMIT_PREFIX: &str = "ratelimit";
const ABSENT: &str = "*";

/// The pair of keys backing one rate-limit bucket key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKeys {
    /// Ordered set of live entries.
    pub entries: String,
    /// Cooldown flag.
    pub cooldown: String,
}

pub fn rate_limit_keys(variant: &str, scope: Option<&str>, route: Option<&str>) -> RateLimitKeys {
    let base = format!(
        "{}:{}:{}:{}",
        RATE_LIMIT_PREFIX,
        variant,
        scope.unwrap_or(ABSENT),
        route.unwrap_or(ABSENT)
    );
    RateLimitKeys {
        entries: format!("{}:entries", base),
        cooldown: format!("{}:cooldown", base),
    }
}
