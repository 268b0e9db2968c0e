//! Cache manager configuration.

use std::time::Duration;

use pixels_core::{BoardSize, Rgb};

/// Configuration for the canvas cache manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Fixed board dimensions.
    pub board: BoardSize,
    /// Color of coordinates with no surviving edit.
    pub background: Rgb,
    /// Age after which a held `sync_lock` is considered abandoned.
    pub watchdog_timeout: Duration,
    /// Upper bound on reclaim attempts within one read.
    pub max_reclaim_attempts: u32,
    /// How long a reader with no snapshot at all waits for another
    /// worker's rebuild before giving up.
    pub cold_start_wait: Duration,
    /// Poll interval while waiting on a cold start.
    pub cold_start_poll: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            board: BoardSize::default(),
            background: Rgb::WHITE,
            watchdog_timeout: Duration::from_secs(10),
            max_reclaim_attempts: 3,
            cold_start_wait: Duration::from_secs(5),
            cold_start_poll: Duration::from_millis(100),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_board(mut self, board: BoardSize) -> Self {
        self.board = board;
        self
    }

    pub fn with_background(mut self, background: Rgb) -> Self {
        self.background = background;
        self
    }

    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    pub fn with_max_reclaim_attempts(mut self, attempts: u32) -> Self {
        self.max_reclaim_attempts = attempts;
        self
    }

    pub fn with_cold_start_wait(mut self, wait: Duration) -> Self {
        self.cold_start_wait = wait;
        self
    }

    pub fn with_cold_start_poll(mut self, poll: Duration) -> Self {
        self.cold_start_poll = poll;
        self
    }
}
