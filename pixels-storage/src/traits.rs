//! Store traits consumed by the cache manager and the rate limiter.

use std::time::Duration;

use async_trait::async_trait;
use pixels_core::{
    CacheState, Coordinates, CurrentPixel, LockClaim, NewPixelEdit, PixelEdit, PixelsResult,
    Timestamp, UserId,
};

/// Authoritative, append-only ledger of pixel edits.
///
/// Implementations must assign edit order and every timestamp on the store
/// side so workers with skewed clocks agree on both.
///
/// # Cache control row
///
/// The store also owns the singleton `CacheState` row. Every append bumps
/// `last_modified` as part of the same write. The `*_sync_lock` methods are
/// atomic read-modify-writes on that row and are the only cross-worker
/// mutual exclusion the canvas uses.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append an edit and return the stored row.
    async fn append_edit(&self, edit: NewPixelEdit) -> PixelsResult<PixelEdit>;

    /// Append a deletion that removes the most recent surviving edit at
    /// `coords`.
    ///
    /// Returns `None` without writing when nothing survives at `coords`.
    /// Deletions and edits at one coordinate must be serialized so the
    /// removed edit is the one the deletion row records.
    async fn append_deletion(
        &self,
        coords: Coordinates,
        author: UserId,
    ) -> PixelsResult<Option<PixelEdit>>;

    /// The surviving edit for every coordinate that has one.
    async fn current_pixels(&self) -> PixelsResult<Vec<CurrentPixel>>;

    /// The surviving edit at one coordinate.
    async fn current_pixel(&self, coords: Coordinates) -> PixelsResult<Option<CurrentPixel>>;

    /// Read the cache control row.
    async fn cache_state(&self) -> PixelsResult<CacheState>;

    /// Test-and-set on `sync_lock`.
    ///
    /// Writes the store's current time into `sync_lock` if it is empty and
    /// reports the value that was there before. A held lock is left as is,
    /// so its age keeps measuring the original holder.
    async fn claim_sync_lock(&self) -> PixelsResult<LockClaim>;

    /// Compare-and-swap an abandoned lock.
    ///
    /// Replaces `sync_lock` with the store's current time only if it still
    /// equals `observed`, returning the new claim time. `None` means another
    /// worker changed the lock first.
    async fn reclaim_sync_lock(&self, observed: Timestamp) -> PixelsResult<Option<Timestamp>>;

    /// Clear `sync_lock` if it still holds `claimed_at`.
    async fn release_sync_lock(&self, claimed_at: Timestamp) -> PixelsResult<()>;

    /// Record a completed refresh that started at `started_at`.
    /// `last_synced` never moves backwards.
    async fn mark_synced(&self, started_at: Timestamp) -> PixelsResult<()>;

    /// Cheap reachability probe for readiness checks.
    async fn ping(&self) -> PixelsResult<()>;
}

/// One sliding-window admission attempt against a bucket key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRequest {
    /// Ordered set of live entries, scored by expiry time.
    pub entries_key: String,
    /// Cooldown flag, present while the bucket rejects everything.
    pub cooldown_key: String,
    pub limit: u32,
    pub window: Duration,
    /// Zero disables the cooldown penalty.
    pub cooldown: Duration,
    /// Unique member to insert on admission.
    pub token: String,
}

/// What the store observed while running a [`WindowRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowOutcome {
    pub admitted: bool,
    /// Live entries after the attempt, including the one just inserted.
    pub count: u32,
    /// How long the caller must wait before a retry can succeed.
    /// Set only on rejection.
    pub retry_after: Option<Duration>,
    /// Time until the earliest live entry expires; zero when none are live.
    pub reset_after: Duration,
}

/// Fast key-value store with byte buffers, ordered sets and TTLs.
///
/// Every call is a suspension point and may fail with a store error; a
/// timed-out call is reported as a failure, never retried silently.
#[async_trait]
pub trait FastStore: Send + Sync {
    async fn get_bytes(&self, key: &str) -> PixelsResult<Option<Vec<u8>>>;

    async fn set_bytes(&self, key: &str, value: &[u8]) -> PixelsResult<()>;

    /// Overwrite part of an existing buffer.
    ///
    /// Returns `false` without writing when the key does not exist, so a
    /// partial buffer is never created.
    async fn set_range(&self, key: &str, offset: usize, value: &[u8]) -> PixelsResult<bool>;

    /// Atomically: reject if the cooldown flag is present; prune entries
    /// scored at or before now; reject and raise the cooldown flag if the
    /// count reached the limit; otherwise insert `token` scored
    /// `now + window`. Scores use the store's clock.
    async fn admit(&self, request: &WindowRequest) -> PixelsResult<WindowOutcome>;

    /// Same numbers as [`FastStore::admit`] without inserting, pruning or
    /// raising a cooldown.
    async fn inspect(&self, request: &WindowRequest) -> PixelsResult<WindowOutcome>;

    /// Remove one admitted entry. Returns whether it was still present.
    async fn remove_entry(&self, entries_key: &str, token: &str) -> PixelsResult<bool>;

    /// Set a flag that the store evicts after `ttl`.
    async fn set_flag(&self, key: &str, ttl: Duration) -> PixelsResult<()>;

    /// Cheap reachability probe for readiness checks.
    async fn ping(&self) -> PixelsResult<()>;
}
