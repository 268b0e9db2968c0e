//! Freshness metadata attached to every snapshot read.
//!
//! Readers never block on another worker's refresh, so a read may return a
//! snapshot that is known to lag the ledger. The tag says which case the
//! caller got instead of hiding it.

use pixels_core::{BoardSnapshot, Coordinates, Rgb};

/// How a snapshot relates to the ledger at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Freshness {
    /// Reflects every ledger mutation seen at read time.
    Fresh,
    /// Another worker is refreshing; this is the previous snapshot.
    Stale,
    /// A refresh was needed but the stores failed; last known good snapshot.
    Degraded,
}

impl Freshness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Degraded => "degraded",
        }
    }
}

/// A whole-board read.
#[derive(Debug, Clone)]
pub struct SnapshotRead {
    pub board: BoardSnapshot,
    pub freshness: Freshness,
}

impl SnapshotRead {
    pub fn fresh(board: BoardSnapshot) -> Self {
        Self {
            board,
            freshness: Freshness::Fresh,
        }
    }

    pub fn stale(board: BoardSnapshot) -> Self {
        Self {
            board,
            freshness: Freshness::Stale,
        }
    }

    pub fn degraded(board: BoardSnapshot) -> Self {
        Self {
            board,
            freshness: Freshness::Degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.freshness == Freshness::Degraded
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.board.into_bytes()
    }
}

/// A single-cell read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRead {
    pub coords: Coordinates,
    pub color: Rgb,
    pub freshness: Freshness,
}
