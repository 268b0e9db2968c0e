//! Error types for canvas operations

use std::fmt;
use thiserror::Error;

/// Which external store an operation was talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// Relational, append-only edit ledger (source of truth).
    History,
    /// Key-value store holding the snapshot and rate-limit bookkeeping.
    Fast,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::History => write!(f, "history store"),
            StoreKind::Fast => write!(f, "fast store"),
        }
    }
}

/// Input validation errors. Raised before any store is touched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Coordinates ({x}, {y}) are outside the {width}x{height} board")]
    OutOfBounds {
        x: i64,
        y: i64,
        width: u16,
        height: u16,
    },

    #[error("Invalid color {value:?}: expected exactly 6 hex digits")]
    InvalidColor { value: String },

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

/// External store failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{store} unavailable during {operation}: {reason}")]
    Unavailable {
        store: StoreKind,
        operation: String,
        reason: String,
    },

    #[error("{store} timed out during {operation}")]
    Timeout { store: StoreKind, operation: String },

    #[error("{store} returned malformed data: {reason}")]
    Corrupt { store: StoreKind, reason: String },
}

impl StoreError {
    pub fn unavailable(store: StoreKind, operation: &str, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            store,
            operation: operation.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn timeout(store: StoreKind, operation: &str) -> Self {
        Self::Timeout {
            store,
            operation: operation.to_string(),
        }
    }

    pub fn corrupt(store: StoreKind, reason: impl fmt::Display) -> Self {
        Self::Corrupt {
            store,
            reason: reason.to_string(),
        }
    }

    /// The store that failed.
    pub fn store(&self) -> StoreKind {
        match self {
            StoreError::Unavailable { store, .. }
            | StoreError::Timeout { store, .. }
            | StoreError::Corrupt { store, .. } => *store,
        }
    }
}

/// Bucket scopes that cannot derive a key for the caller.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("This route requires an authenticated identity")]
    IdentityRequired,

    #[error("This route requires a privileged identity")]
    PrivilegeRequired,
}

/// Master error type for all canvas operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PixelsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Access(#[from] AccessError),

    /// No snapshot has ever been built and one could not be built now.
    #[error("Canvas cache unavailable: {reason}")]
    CacheUnavailable { reason: String },

    #[error("No surviving edit to delete at ({x}, {y})")]
    NothingToDelete { x: i16, y: i16 },
}

impl PixelsError {
    /// True for failures caused by the caller's input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PixelsError::Validation(_) | PixelsError::Access(_) | PixelsError::NothingToDelete { .. }
        )
    }
}

/// Result type for canvas operations.
pub type PixelsResult<T> = Result<T, PixelsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_names_store() {
        let err = StoreError::unavailable(StoreKind::History, "claim_sync_lock", "connection refused");
        assert_eq!(
            err.to_string(),
            "history store unavailable during claim_sync_lock: connection refused"
        );
        assert_eq!(err.store(), StoreKind::History);
    }

    #[test]
    fn test_client_error_classification() {
        let validation: PixelsError = ValidationError::InvalidColor {
            value: "nope".to_string(),
        }
        .into();
        assert!(validation.is_client_error());

        let access: PixelsError = AccessError::PrivilegeRequired.into();
        assert!(access.is_client_error());

        let store: PixelsError = StoreError::timeout(StoreKind::Fast, "admit").into();
        assert!(!store.is_client_error());

        let cold = PixelsError::CacheUnavailable {
            reason: "history store down".to_string(),
        };
        assert!(!cold.is_client_error());
    }
}
