//! The singleton control row coordinating snapshot refreshes across workers.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::pixel::Timestamp;

/// Control row shared by every worker through the History Store.
///
/// `last_modified` is bumped by the store on every ledger append, never by
/// cache readers. `sync_lock` holds the claim time of the worker currently
/// rebuilding the snapshot, or `None` when no refresh is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheState {
    pub last_modified: Timestamp,
    pub last_synced: Timestamp,
    pub sync_lock: Option<Timestamp>,
}

impl CacheState {
    /// The snapshot misses at least one ledger mutation.
    pub fn is_stale(&self) -> bool {
        self.last_modified > self.last_synced
    }

    pub fn is_locked(&self) -> bool {
        self.sync_lock.is_some()
    }
}

/// Result of the atomic "swap and tell me what was there" on `sync_lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockClaim {
    /// Store time of the claim. When the claim succeeded this is the value
    /// now held in `sync_lock`; otherwise it is the time of observation.
    pub claimed_at: Timestamp,
    /// The lock value found before the swap.
    pub previous: Option<Timestamp>,
}

impl LockClaim {
    pub fn acquired(&self) -> bool {
        self.previous.is_none()
    }

    /// Age of the competing claim, measured on the store clock.
    pub fn held_for(&self) -> Option<Duration> {
        self.previous.map(|held_since| self.claimed_at - held_since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_staleness_is_strict() {
        let state = CacheState {
            last_modified: at(10),
            last_synced: at(10),
            sync_lock: None,
        };
        assert!(!state.is_stale());

        let state = CacheState {
            last_modified: at(11),
            ..state
        };
        assert!(state.is_stale());
    }

    #[test]
    fn test_lock_claim_age() {
        let free = LockClaim {
            claimed_at: at(5),
            previous: None,
        };
        assert!(free.acquired());
        assert_eq!(free.held_for(), None);

        let held = LockClaim {
            claimed_at: at(30),
            previous: Some(at(5)),
        };
        assert!(!held.acquired());
        assert_eq!(held.held_for(), Some(Duration::seconds(25)));
    }
}
