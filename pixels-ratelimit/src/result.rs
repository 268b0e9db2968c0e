//! Admission numbers reported to the request gate.

use std::time::Duration;

use pixels_storage::WindowOutcome;

use crate::config::BucketConfig;
use crate::scope::BucketKey;

/// Quota state after one check.
///
/// Maps one to one onto the `requests-*` response headers. Durations are
/// whole seconds rounded up so a client that waits the advertised time is
/// never rejected for being a few milliseconds early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionResult {
    pub admitted: bool,
    pub remaining: u32,
    pub limit: u32,
    pub period_seconds: u64,
    /// Until the oldest live entry expires.
    pub reset_seconds: u64,
    /// Set on rejection: until a retry can succeed.
    pub retry_after_seconds: Option<u64>,
}

impl AdmissionResult {
    pub(crate) fn from_outcome(config: &BucketConfig, outcome: &WindowOutcome) -> Self {
        let limit = config.requests();
        let remaining = if outcome.admitted {
            limit.saturating_sub(outcome.count)
        } else {
            0
        };
        Self {
            admitted: outcome.admitted,
            remaining,
            limit,
            period_seconds: ceil_secs(config.window()),
            reset_seconds: ceil_secs(outcome.reset_after),
            retry_after_seconds: outcome.retry_after.map(ceil_secs),
        }
    }

    /// The same result with one admission handed back.
    pub(crate) fn released(&self) -> Self {
        Self {
            remaining: (self.remaining + 1).min(self.limit),
            ..*self
        }
    }
}

/// An admission decision plus what is needed to settle it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub result: AdmissionResult,
    pub key: BucketKey,
    pub(crate) token: Option<String>,
    pub(crate) provisional: bool,
}

impl Admission {
    pub fn admitted(&self) -> bool {
        self.result.admitted
    }

    /// True when a client-error outcome would hand the admission back.
    pub fn is_provisional(&self) -> bool {
        self.provisional
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}
