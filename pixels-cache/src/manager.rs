//! Canvas Cache Manager.
//!
//! The only component allowed to write the snapshot key or touch the cache
//! control row. Reads go through the staleness check and the sync protocol;
//! writes append to the ledger and then patch the cached buffer in place.

use std::sync::Arc;

use pixels_core::{
    BoardSize, BoardSnapshot, Coordinates, CurrentPixel, NewPixelEdit, PixelEdit, PixelsError,
    PixelsResult, Rgb, UserId,
};
use pixels_storage::{FastStore, HistoryStore, SNAPSHOT_KEY};
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::config::CacheConfig;
use crate::freshness::{PixelRead, SnapshotRead};
use crate::sync::SyncOutcome;

/// Serves the board from the Fast Store and keeps it in step with the ledger.
///
/// # Type Parameters
///
/// - `H`: History Store (ledger and cache control row)
/// - `F`: Fast Store (snapshot buffer)
///
/// Both may be trait objects, e.g.
/// `CanvasCacheManager<dyn HistoryStore, dyn FastStore>`.
pub struct CanvasCacheManager<H, F>
where
    H: HistoryStore + ?Sized,
    F: FastStore + ?Sized,
{
    pub(crate) history: Arc<H>,
    pub(crate) fast: Arc<F>,
    pub(crate) config: CacheConfig,
}

impl<H, F> CanvasCacheManager<H, F>
where
    H: HistoryStore + ?Sized,
    F: FastStore + ?Sized,
{
    pub fn new(history: Arc<H>, fast: Arc<F>, config: CacheConfig) -> Self {
        Self {
            history,
            fast,
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn board_size(&self) -> BoardSize {
        self.config.board
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// Return the whole board, refreshing first if the ledger moved on.
    ///
    /// Never blocks on another worker's refresh: if one is running the
    /// previous snapshot is returned tagged [`Freshness::Stale`]. If the
    /// refresh itself fails the last known snapshot is returned tagged
    /// [`Freshness::Degraded`]. Only a reader with no snapshot at all can
    /// fail, with [`PixelsError::CacheUnavailable`].
    ///
    /// [`Freshness::Stale`]: crate::Freshness::Stale
    /// [`Freshness::Degraded`]: crate::Freshness::Degraded
    pub async fn get_snapshot(&self) -> PixelsResult<SnapshotRead> {
        // Control row first: a "not stale" verdict must cover the bytes served.
        let state = self.history.cache_state().await;
        let cached = self.load_snapshot().await?;
        let state = match state {
            Ok(state) => state,
            Err(err) => return self.serve_degraded(cached, err),
        };

        match cached {
            Some(board) if !state.is_stale() => {
                debug!("canvas snapshot is current");
                Ok(SnapshotRead::fresh(board))
            }
            cached => self.refresh_on_read(cached).await,
        }
    }

    /// Read one cell through [`Self::get_snapshot`].
    pub async fn get_pixel(&self, x: i64, y: i64) -> PixelsResult<PixelRead> {
        let coords = self.config.board.coordinates(x, y)?;
        let read = self.get_snapshot().await?;
        let color = read.board.pixel(coords).unwrap_or(self.config.background);
        Ok(PixelRead {
            coords,
            color,
            freshness: read.freshness,
        })
    }

    /// The surviving edit at a coordinate, straight from the ledger.
    pub async fn pixel_author(&self, x: i64, y: i64) -> PixelsResult<Option<CurrentPixel>> {
        let coords = self.config.board.coordinates(x, y)?;
        self.history.current_pixel(coords).await
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Validate and append an edit, then patch the cached buffer.
    ///
    /// The append is the commit point: a failure there is returned and not
    /// retried. The buffer patch is best effort; if it fails or there is no
    /// buffer yet, the next staleness check rebuilds from the ledger.
    pub async fn set_pixel(
        &self,
        x: i64,
        y: i64,
        color: &str,
        author: UserId,
    ) -> PixelsResult<PixelEdit> {
        let coords = self.config.board.coordinates(x, y)?;
        let color: Rgb = color.parse()?;

        let edit = self
            .history
            .append_edit(NewPixelEdit {
                coords,
                color,
                author,
            })
            .await?;

        self.apply_delta(coords, color).await;
        Ok(edit)
    }

    /// Append a deletion of the most recent surviving edit at a coordinate
    /// and restore the previous color (or background) in the cached buffer.
    pub async fn delete_pixel(&self, x: i64, y: i64, author: UserId) -> PixelsResult<PixelEdit> {
        let coords = self.config.board.coordinates(x, y)?;

        let deletion = self
            .history
            .append_deletion(coords, author)
            .await?
            .ok_or(PixelsError::NothingToDelete {
                x: coords.x,
                y: coords.y,
            })?;

        match self.history.current_pixel(coords).await {
            Ok(current) => {
                let restored = current
                    .map(|pixel| pixel.color)
                    .unwrap_or(self.config.background);
                self.apply_delta(coords, restored).await;
            }
            Err(err) => {
                warn!(x = coords.x, y = coords.y, error = %err, "could not resolve restored color; leaving it to the next refresh");
            }
        }

        Ok(deletion)
    }

    /// Run the sync protocol regardless of staleness.
    pub async fn force_refresh(&self) -> PixelsResult<SyncOutcome> {
        self.synchronize().await
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn refresh_on_read(&self, cached: Option<BoardSnapshot>) -> PixelsResult<SnapshotRead> {
        match self.synchronize().await {
            Ok(SyncOutcome::Refreshed { board, .. }) => Ok(SnapshotRead::fresh(board)),
            Ok(SyncOutcome::Contended { .. }) => match cached {
                Some(board) => Ok(SnapshotRead::stale(board)),
                None => self.wait_for_cold_start().await,
            },
            Err(err) => self.serve_degraded(cached, err),
        }
    }

    /// Read the snapshot, treating a missing or mis-sized buffer as absent.
    async fn load_snapshot(&self) -> PixelsResult<Option<BoardSnapshot>> {
        let Some(bytes) = self.fast.get_bytes(SNAPSHOT_KEY).await? else {
            return Ok(None);
        };
        let found = bytes.len();
        let snapshot = BoardSnapshot::from_bytes(self.config.board, bytes);
        if snapshot.is_none() {
            debug!(
                found,
                expected = BoardSnapshot::expected_len(self.config.board),
                "cached snapshot has the wrong size"
            );
        }
        Ok(snapshot)
    }

    fn serve_degraded(
        &self,
        cached: Option<BoardSnapshot>,
        err: PixelsError,
    ) -> PixelsResult<SnapshotRead> {
        match cached {
            Some(board) => {
                warn!(error = %err, "canvas refresh failed; serving last known snapshot");
                Ok(SnapshotRead::degraded(board))
            }
            None => {
                error!(error = %err, "canvas refresh failed with no snapshot to fall back on");
                Err(PixelsError::CacheUnavailable {
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Another worker holds the lock and there is nothing to serve yet.
    async fn wait_for_cold_start(&self) -> PixelsResult<SnapshotRead> {
        let deadline = Instant::now() + self.config.cold_start_wait;
        loop {
            tokio::time::sleep(self.config.cold_start_poll).await;
            if let Some(board) = self.load_snapshot().await? {
                return Ok(SnapshotRead::fresh(board));
            }
            if Instant::now() >= deadline {
                return Err(PixelsError::CacheUnavailable {
                    reason: "no snapshot has been built yet".to_string(),
                });
            }
        }
    }

    async fn apply_delta(&self, coords: Coordinates, color: Rgb) {
        let offset = BoardSnapshot::offset(self.config.board, coords);
        match self
            .fast
            .set_range(SNAPSHOT_KEY, offset, color.as_bytes())
            .await
        {
            Ok(true) => debug!(x = coords.x, y = coords.y, "patched cached snapshot"),
            Ok(false) => debug!("no cached snapshot; pixel delta skipped"),
            Err(err) => warn!(x = coords.x, y = coords.y, error = %err, "pixel delta failed"),
        }
    }
}

impl<H, F> Clone for CanvasCacheManager<H, F>
where
    H: HistoryStore + ?Sized,
    F: FastStore + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            history: Arc::clone(&self.history),
            fast: Arc::clone(&self.fast),
            config: self.config.clone(),
        }
    }
}
