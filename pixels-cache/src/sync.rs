//! Cross-worker snapshot synchronization.
//!
//! Protocol, run by any reader that finds the snapshot stale:
//!
//! 1. Claim `sync_lock` with an atomic test-and-set in the History Store.
//! 2. If the lock was free, rebuild the whole buffer from the ledger, write
//!    it, advance `last_synced` to the claim time and release the lock.
//! 3. If the lock was held and is younger than the watchdog timeout, back
//!    off and let the caller serve what it has.
//! 4. If it is older, the holder is presumed dead: compare-and-swap the
//!    observed claim for a new one. This is the only retry and it is
//!    bounded by `max_reclaim_attempts`.
//!
//! The lock lives in the relational control row, so mutual exclusion holds
//! across processes and survives worker crashes.

use std::time::Duration;

use pixels_core::{BoardSnapshot, PixelsResult, Timestamp};
use pixels_storage::{FastStore, HistoryStore, SNAPSHOT_KEY};
use tracing::{debug, info, warn};

use crate::manager::CanvasCacheManager;

/// Result of one pass of the sync protocol.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// This worker rebuilt the snapshot.
    Refreshed {
        started_at: Timestamp,
        board: BoardSnapshot,
    },
    /// Another worker holds the lock.
    Contended { held_since: Timestamp },
}

impl SyncOutcome {
    pub fn refreshed(&self) -> bool {
        matches!(self, SyncOutcome::Refreshed { .. })
    }
}

enum Acquisition {
    Acquired(Timestamp),
    Held(Timestamp),
}

impl<H, F> CanvasCacheManager<H, F>
where
    H: HistoryStore + ?Sized,
    F: FastStore + ?Sized,
{
    /// Run one pass of the protocol.
    ///
    /// On a store failure after the claim, the lock is released before the
    /// error is returned so another worker can try later.
    pub(crate) async fn synchronize(&self) -> PixelsResult<SyncOutcome> {
        let started_at = match self.acquire_sync_lock().await? {
            Acquisition::Acquired(started_at) => started_at,
            Acquisition::Held(held_since) => return Ok(SyncOutcome::Contended { held_since }),
        };

        let rebuilt = self.rebuild(started_at).await;

        if let Err(err) = self.history.release_sync_lock(started_at).await {
            warn!(error = %err, "failed to release canvas sync lock; the watchdog will reclaim it");
        }

        let board = rebuilt?;
        info!(started_at = %started_at, "canvas snapshot rebuilt");
        Ok(SyncOutcome::Refreshed { started_at, board })
    }

    async fn acquire_sync_lock(&self) -> PixelsResult<Acquisition> {
        let mut claim = self.history.claim_sync_lock().await?;
        let mut attempts = 0u32;

        loop {
            let Some(held_since) = claim.previous else {
                return Ok(Acquisition::Acquired(claim.claimed_at));
            };

            let held_for = (claim.claimed_at - held_since)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if held_for < self.config.watchdog_timeout {
                debug!(
                    held_for_ms = held_for.as_millis() as u64,
                    "canvas refresh already in progress"
                );
                return Ok(Acquisition::Held(held_since));
            }

            if attempts >= self.config.max_reclaim_attempts {
                warn!(attempts, "gave up reclaiming canvas sync lock");
                return Ok(Acquisition::Held(held_since));
            }
            attempts += 1;

            warn!(
                held_since = %held_since,
                held_for_ms = held_for.as_millis() as u64,
                attempt = attempts,
                "reclaiming abandoned canvas sync lock"
            );
            if let Some(claimed_at) = self.history.reclaim_sync_lock(held_since).await? {
                return Ok(Acquisition::Acquired(claimed_at));
            }

            // Someone else moved the lock first; look again.
            claim = self.history.claim_sync_lock().await?;
        }
    }

    /// Write the whole buffer before `last_synced` moves, so no reader can
    /// pair a fresh marker with a partial buffer.
    async fn rebuild(&self, started_at: Timestamp) -> PixelsResult<BoardSnapshot> {
        let pixels = self.history.current_pixels().await?;
        let board =
            BoardSnapshot::from_current(self.config.board, self.config.background, &pixels);
        self.fast.set_bytes(SNAPSHOT_KEY, board.as_bytes()).await?;
        self.history.mark_synced(started_at).await?;
        Ok(board)
    }
}
