//! Per-bucket limits.

use std::time::Duration;

use pixels_core::{PixelsResult, ValidationError};

/// Limits for one bucket instance.
///
/// Every field is required at construction and validated there, so a
/// bucket can never run with a zero limit or an empty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketConfig {
    requests: u32,
    window: Duration,
    cooldown: Duration,
    count_failed_requests: bool,
}

impl BucketConfig {
    /// # Errors
    ///
    /// `InvalidConfig` when `requests` is zero, `window` is shorter than a
    /// millisecond, or either duration does not fit the stores' signed
    /// millisecond scores.
    pub fn new(
        requests: u32,
        window: Duration,
        cooldown: Duration,
        count_failed_requests: bool,
    ) -> PixelsResult<Self> {
        if requests == 0 {
            return Err(invalid("requests", "must be positive"));
        }
        if window < Duration::from_millis(1) {
            return Err(invalid("window", "must be at least one millisecond"));
        }
        if !fits_millis(window) {
            return Err(invalid("window", "too long"));
        }
        if !fits_millis(cooldown) {
            return Err(invalid("cooldown", "too long"));
        }
        Ok(Self {
            requests,
            window,
            cooldown,
            count_failed_requests,
        })
    }

    /// Shorthand for whole-second settings.
    pub fn per_seconds(
        requests: u32,
        window_secs: u64,
        cooldown_secs: u64,
        count_failed_requests: bool,
    ) -> PixelsResult<Self> {
        Self::new(
            requests,
            Duration::from_secs(window_secs),
            Duration::from_secs(cooldown_secs),
            count_failed_requests,
        )
    }

    /// Maximum admitted requests per window.
    pub fn requests(&self) -> u32 {
        self.requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Penalty applied on breach. Zero disables it.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// When false, admissions whose request ends in a client error are
    /// handed back.
    pub fn count_failed_requests(&self) -> bool {
        self.count_failed_requests
    }
}

fn fits_millis(duration: Duration) -> bool {
    i64::try_from(duration.as_millis()).is_ok()
}

fn invalid(field: &str, reason: &str) -> pixels_core::PixelsError {
    ValidationError::InvalidConfig {
        field: field.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
