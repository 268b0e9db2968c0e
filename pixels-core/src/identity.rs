//! Caller identity as seen by the canvas and the rate limiter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A verified caller. Produced by the HTTP layer from a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    /// Moderators get their own, larger quotas and the moderation routes.
    pub privileged: bool,
}

impl Identity {
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id: UserId(user_id),
            privileged: false,
        }
    }

    pub fn moderator(user_id: i64) -> Self {
        Self {
            user_id: UserId(user_id),
            privileged: true,
        }
    }
}
