//! In-memory store implementations.
//!
//! Both stores keep their own clock derived from `tokio::time::Instant`, so
//! tests running with a paused runtime can move store time with
//! `tokio::time::advance`. Each store also exposes a few fault-injection
//! hooks (availability switch, slow rebuild queries, a crashed lock holder)
//! used by the cache and rate-limit test suites.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pixels_core::{
    resolve_current, CacheState, Coordinates, CurrentPixel, LockClaim, NewPixelEdit, PixelEdit,
    PixelsResult, StoreError, StoreKind, Timestamp, UserId, ValidationError,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::traits::{FastStore, HistoryStore, WindowOutcome, WindowRequest};

// ============================================================================
// CLOCK
// ============================================================================

/// Wall-clock anchored at construction, advanced by tokio time.
#[derive(Debug)]
struct StoreClock {
    wall_origin: DateTime<Utc>,
    origin: Instant,
}

impl StoreClock {
    fn new() -> Self {
        Self {
            wall_origin: Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> Timestamp {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }

    fn now_ms(&self) -> i64 {
        self.wall_origin.timestamp_millis() + self.origin.elapsed().as_millis() as i64
    }
}

fn offline(store: StoreKind, operation: &str) -> StoreError {
    StoreError::unavailable(store, operation, "store offline")
}

// ============================================================================
// HISTORY STORE
// ============================================================================

#[derive(Debug)]
struct HistoryState {
    edits: Vec<PixelEdit>,
    next_id: i64,
    cache: CacheState,
    last_issued: Option<Timestamp>,
}

/// In-memory History Store.
///
/// Timestamps are strictly increasing even when tokio time is paused, the
/// same guarantee a relational store gives through its transaction clock.
#[derive(Debug)]
pub struct InMemoryHistoryStore {
    state: Mutex<HistoryState>,
    clock: StoreClock,
    available: AtomicBool,
    rebuild_queries: AtomicUsize,
    rebuild_delay_ms: AtomicU64,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        let clock = StoreClock::new();
        let created = clock.now();
        Self {
            state: Mutex::new(HistoryState {
                edits: Vec::new(),
                next_id: 1,
                cache: CacheState {
                    last_modified: created,
                    last_synced: DateTime::<Utc>::MIN_UTC,
                    sync_lock: None,
                },
                last_issued: Some(created),
            }),
            clock,
            available: AtomicBool::new(true),
            rebuild_queries: AtomicUsize::new(0),
            rebuild_delay_ms: AtomicU64::new(0),
        }
    }
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going away or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of full-board resolution queries served so far.
    pub fn rebuild_queries(&self) -> usize {
        self.rebuild_queries.load(Ordering::SeqCst)
    }

    /// Make every full-board resolution query take `delay`.
    pub fn set_rebuild_delay(&self, delay: Duration) {
        self.rebuild_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Claim the sync lock on behalf of a worker that then dies.
    pub async fn seize_sync_lock(&self) -> Timestamp {
        let mut state = self.state.lock().await;
        let now = self.tick(&mut state);
        state.cache.sync_lock = Some(now);
        now
    }

    /// Every ledger row, in append order.
    pub async fn edits(&self) -> Vec<PixelEdit> {
        self.state.lock().await.edits.clone()
    }

    fn check(&self, operation: &str) -> PixelsResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(offline(StoreKind::History, operation).into())
        }
    }

    fn tick(&self, state: &mut HistoryState) -> Timestamp {
        let now = self.clock.now();
        let issued = match state.last_issued {
            Some(previous) if now <= previous => previous + chrono::Duration::microseconds(1),
            _ => now,
        };
        state.last_issued = Some(issued);
        issued
    }

    fn append(&self, state: &mut HistoryState, edit: NewPixelEdit, deleted: bool) -> PixelEdit {
        let created_at = self.tick(state);
        let row = PixelEdit {
            id: state.next_id,
            coords: edit.coords,
            color: edit.color,
            author: edit.author,
            created_at,
            deleted,
        };
        state.next_id += 1;
        state.edits.push(row.clone());
        if created_at > state.cache.last_modified {
            state.cache.last_modified = created_at;
        }
        row
    }

    fn surviving(state: &HistoryState, coords: Coordinates) -> Option<CurrentPixel> {
        resolve_current(state.edits.iter().filter(|edit| edit.coords == coords))
            .into_iter()
            .next()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append_edit(&self, edit: NewPixelEdit) -> PixelsResult<PixelEdit> {
        self.check("append_edit")?;
        let mut state = self.state.lock().await;
        Ok(self.append(&mut state, edit, false))
    }

    async fn append_deletion(
        &self,
        coords: Coordinates,
        author: UserId,
    ) -> PixelsResult<Option<PixelEdit>> {
        self.check("append_deletion")?;
        let mut state = self.state.lock().await;
        let Some(current) = Self::surviving(&state, coords) else {
            return Ok(None);
        };
        let deletion = NewPixelEdit {
            coords,
            color: current.color,
            author,
        };
        Ok(Some(self.append(&mut state, deletion, true)))
    }

    async fn current_pixels(&self) -> PixelsResult<Vec<CurrentPixel>> {
        self.check("current_pixels")?;
        self.rebuild_queries.fetch_add(1, Ordering::SeqCst);
        let resolved = resolve_current(&self.state.lock().await.edits);
        // Result set is fixed at query time; the delay models its transfer.
        let delay = self.rebuild_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.check("current_pixels")?;
        }
        Ok(resolved)
    }

    async fn current_pixel(&self, coords: Coordinates) -> PixelsResult<Option<CurrentPixel>> {
        self.check("current_pixel")?;
        let state = self.state.lock().await;
        Ok(Self::surviving(&state, coords))
    }

    async fn cache_state(&self) -> PixelsResult<CacheState> {
        self.check("cache_state")?;
        Ok(self.state.lock().await.cache)
    }

    async fn claim_sync_lock(&self) -> PixelsResult<LockClaim> {
        self.check("claim_sync_lock")?;
        let mut state = self.state.lock().await;
        let now = self.tick(&mut state);
        let previous = state.cache.sync_lock;
        if previous.is_none() {
            state.cache.sync_lock = Some(now);
        }
        Ok(LockClaim {
            claimed_at: now,
            previous,
        })
    }

    async fn reclaim_sync_lock(&self, observed: Timestamp) -> PixelsResult<Option<Timestamp>> {
        self.check("reclaim_sync_lock")?;
        let mut state = self.state.lock().await;
        if state.cache.sync_lock != Some(observed) {
            return Ok(None);
        }
        let now = self.tick(&mut state);
        state.cache.sync_lock = Some(now);
        Ok(Some(now))
    }

    async fn release_sync_lock(&self, claimed_at: Timestamp) -> PixelsResult<()> {
        self.check("release_sync_lock")?;
        let mut state = self.state.lock().await;
        if state.cache.sync_lock == Some(claimed_at) {
            state.cache.sync_lock = None;
        }
        Ok(())
    }

    async fn mark_synced(&self, started_at: Timestamp) -> PixelsResult<()> {
        self.check("mark_synced")?;
        let mut state = self.state.lock().await;
        if started_at > state.cache.last_synced {
            state.cache.last_synced = started_at;
        }
        Ok(())
    }

    async fn ping(&self) -> PixelsResult<()> {
        self.check("ping")
    }
}

// ============================================================================
// FAST STORE
// ============================================================================

#[derive(Debug, Default)]
struct FastState {
    buffers: HashMap<String, Vec<u8>>,
    /// Ordered sets as (score_ms, member) pairs.
    sets: HashMap<String, BTreeSet<(i64, String)>>,
    /// Flags with their expiry time in ms.
    flags: HashMap<String, i64>,
}

impl FastState {
    fn flag_remaining(&self, key: &str, now: i64) -> Option<i64> {
        self.flags
            .get(key)
            .map(|expires_at| expires_at - now)
            .filter(|remaining| *remaining > 0)
    }

    fn live_count(&self, key: &str, now: i64) -> u32 {
        self.sets
            .get(key)
            .map(|set| set.iter().filter(|(score, _)| *score > now).count() as u32)
            .unwrap_or(0)
    }

    fn earliest_expiry(&self, key: &str, now: i64) -> i64 {
        self.sets
            .get(key)
            .and_then(|set| set.iter().find(|(score, _)| *score > now))
            .map(|(score, _)| score - now)
            .unwrap_or(0)
    }
}

/// Score offset for a duration; one that overflows a score is a bad request.
fn duration_ms(field: &str, duration: Duration) -> PixelsResult<i64> {
    i64::try_from(duration.as_millis()).map_err(|_| {
        ValidationError::InvalidConfig {
            field: field.to_string(),
            reason: "does not fit a millisecond score".to_string(),
        }
        .into()
    })
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

/// In-memory Fast Store.
///
/// Each operation runs under one lock, which gives the same per-key
/// atomicity a scripted admission has on a real store.
#[derive(Debug)]
pub struct InMemoryFastStore {
    state: Mutex<FastState>,
    clock: StoreClock,
    available: AtomicBool,
    writable: AtomicBool,
}

impl Default for InMemoryFastStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(FastState::default()),
            clock: StoreClock::new(),
            available: AtomicBool::new(true),
            writable: AtomicBool::new(true),
        }
    }
}

impl InMemoryFastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make buffer writes fail while reads keep working.
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Drop a key of any type, as an eviction or a flush would.
    pub async fn evict(&self, key: &str) {
        let mut state = self.state.lock().await;
        state.buffers.remove(key);
        state.sets.remove(key);
        state.flags.remove(key);
    }

    fn check(&self, operation: &str) -> PixelsResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(offline(StoreKind::Fast, operation).into())
        }
    }

    fn check_write(&self, operation: &str) -> PixelsResult<()> {
        self.check(operation)?;
        if self.writable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::unavailable(StoreKind::Fast, operation, "store is read-only").into())
        }
    }
}

#[async_trait]
impl FastStore for InMemoryFastStore {
    async fn get_bytes(&self, key: &str) -> PixelsResult<Option<Vec<u8>>> {
        self.check("get_bytes")?;
        Ok(self.state.lock().await.buffers.get(key).cloned())
    }

    async fn set_bytes(&self, key: &str, value: &[u8]) -> PixelsResult<()> {
        self.check_write("set_bytes")?;
        self.state
            .lock()
            .await
            .buffers
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn set_range(&self, key: &str, offset: usize, value: &[u8]) -> PixelsResult<bool> {
        self.check_write("set_range")?;
        let mut state = self.state.lock().await;
        let Some(buffer) = state.buffers.get_mut(key) else {
            return Ok(false);
        };
        let end = offset + value.len();
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[offset..end].copy_from_slice(value);
        Ok(true)
    }

    async fn admit(&self, request: &WindowRequest) -> PixelsResult<WindowOutcome> {
        self.check("admit")?;
        let mut state = self.state.lock().await;
        let now = self.clock.now_ms();

        if let Some(remaining) = state.flag_remaining(&request.cooldown_key, now) {
            return Ok(WindowOutcome {
                admitted: false,
                count: state.live_count(&request.entries_key, now),
                retry_after: Some(millis(remaining)),
                reset_after: millis(state.earliest_expiry(&request.entries_key, now)),
            });
        }

        let entries = state.sets.entry(request.entries_key.clone()).or_default();
        entries.retain(|(score, _)| *score > now);
        let count = entries.len() as u32;

        if count >= request.limit {
            let retry_ms = if request.cooldown.is_zero() {
                state.earliest_expiry(&request.entries_key, now)
            } else {
                let cooldown_ms = duration_ms("cooldown", request.cooldown)?;
                state
                    .flags
                    .insert(request.cooldown_key.clone(), now.saturating_add(cooldown_ms));
                cooldown_ms
            };
            return Ok(WindowOutcome {
                admitted: false,
                count,
                retry_after: Some(millis(retry_ms)),
                reset_after: millis(state.earliest_expiry(&request.entries_key, now)),
            });
        }

        let expires_at = now.saturating_add(duration_ms("window", request.window)?);
        entries.insert((expires_at, request.token.clone()));
        Ok(WindowOutcome {
            admitted: true,
            count: count + 1,
            retry_after: None,
            reset_after: millis(state.earliest_expiry(&request.entries_key, now)),
        })
    }

    async fn inspect(&self, request: &WindowRequest) -> PixelsResult<WindowOutcome> {
        self.check("inspect")?;
        let state = self.state.lock().await;
        let now = self.clock.now_ms();
        let count = state.live_count(&request.entries_key, now);
        let reset_ms = state.earliest_expiry(&request.entries_key, now);

        let retry_after = match state.flag_remaining(&request.cooldown_key, now) {
            Some(remaining) => Some(millis(remaining)),
            None if count >= request.limit => Some(millis(reset_ms)),
            None => None,
        };
        Ok(WindowOutcome {
            admitted: retry_after.is_none(),
            count,
            retry_after,
            reset_after: millis(reset_ms),
        })
    }

    async fn remove_entry(&self, entries_key: &str, token: &str) -> PixelsResult<bool> {
        self.check("remove_entry")?;
        let mut state = self.state.lock().await;
        let Some(entries) = state.sets.get_mut(entries_key) else {
            return Ok(false);
        };
        let found = entries.iter().find(|(_, member)| member == token).cloned();
        Ok(match found {
            Some(entry) => entries.remove(&entry),
            None => false,
        })
    }

    async fn set_flag(&self, key: &str, ttl: Duration) -> PixelsResult<()> {
        self.check("set_flag")?;
        let expires_at = self.clock.now_ms().saturating_add(duration_ms("ttl", ttl)?);
        self.state
            .lock()
            .await
            .flags
            .insert(key.to_string(), expires_at);
        Ok(())
    }

    async fn ping(&self) -> PixelsResult<()> {
        self.check("ping")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixels_core::Rgb;

    fn request(limit: u32, window_secs: u64, cooldown_secs: u64, token: &str) -> WindowRequest {
        WindowRequest {
            entries_key: "e".to_string(),
            cooldown_key: "c".to_string(),
            limit,
            window: Duration::from_secs(window_secs),
            cooldown: Duration::from_secs(cooldown_secs),
            token: token.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_timestamps_strictly_increase() {
        let store = InMemoryHistoryStore::new();
        let edit = NewPixelEdit {
            coords: Coordinates { x: 0, y: 0 },
            color: Rgb::BLACK,
            author: UserId(1),
        };
        let a = store.append_edit(edit).await.unwrap();
        let b = store.append_edit(edit).await.unwrap();
        assert!(b.created_at > a.created_at);
        assert!(b.id > a.id);

        let state = store.cache_state().await.unwrap();
        assert_eq!(state.last_modified, b.created_at);
        assert!(state.is_stale());
    }

    #[tokio::test]
    async fn test_claim_leaves_held_lock_untouched() {
        let store = InMemoryHistoryStore::new();
        let first = store.claim_sync_lock().await.unwrap();
        assert!(first.acquired());

        let second = store.claim_sync_lock().await.unwrap();
        assert_eq!(second.previous, Some(first.claimed_at));
        assert_eq!(
            store.cache_state().await.unwrap().sync_lock,
            Some(first.claimed_at)
        );
    }

    #[tokio::test]
    async fn test_reclaim_is_compare_and_swap() {
        let store = InMemoryHistoryStore::new();
        let held = store.seize_sync_lock().await;

        let winner = store.reclaim_sync_lock(held).await.unwrap();
        assert!(winner.is_some());
        // A second reclaimer observed the old value and must lose.
        assert_eq!(store.reclaim_sync_lock(held).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_release_only_clears_own_claim() {
        let store = InMemoryHistoryStore::new();
        let stale = store.seize_sync_lock().await;
        let fresh = store.reclaim_sync_lock(stale).await.unwrap().unwrap();

        store.release_sync_lock(stale).await.unwrap();
        assert_eq!(store.cache_state().await.unwrap().sync_lock, Some(fresh));

        store.release_sync_lock(fresh).await.unwrap();
        assert_eq!(store.cache_state().await.unwrap().sync_lock, None);
    }

    #[tokio::test]
    async fn test_deletion_with_nothing_to_delete_appends_nothing() {
        let store = InMemoryHistoryStore::new();
        let result = store
            .append_deletion(Coordinates { x: 1, y: 1 }, UserId(9))
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store.edits().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_history_store_fails() {
        let store = InMemoryHistoryStore::new();
        store.set_available(false);
        let err = store.cache_state().await.unwrap_err();
        assert!(matches!(
            err,
            pixels_core::PixelsError::Store(StoreError::Unavailable {
                store: StoreKind::History,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_set_range_requires_existing_buffer() {
        let store = InMemoryFastStore::new();
        assert!(!store.set_range("buf", 3, &[1, 2, 3]).await.unwrap());
        assert_eq!(store.get_bytes("buf").await.unwrap(), None);

        store.set_bytes("buf", &[0; 9]).await.unwrap();
        assert!(store.set_range("buf", 3, &[1, 2, 3]).await.unwrap());
        assert_eq!(
            store.get_bytes("buf").await.unwrap(),
            Some(vec![0, 0, 0, 1, 2, 3, 0, 0, 0])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_breach_sets_cooldown_without_entry() {
        let store = InMemoryFastStore::new();
        for i in 0..2 {
            let outcome = store.admit(&request(2, 10, 30, &i.to_string())).await.unwrap();
            assert!(outcome.admitted);
        }
        let breach = store.admit(&request(2, 10, 30, "x")).await.unwrap();
        assert!(!breach.admitted);
        assert_eq!(breach.count, 2);
        assert_eq!(breach.retry_after, Some(Duration::from_secs(30)));

        // Entries expire but the flag still rejects.
        tokio::time::advance(Duration::from_secs(11)).await;
        let during = store.admit(&request(2, 10, 30, "y")).await.unwrap();
        assert!(!during.admitted);
        assert_eq!(during.retry_after, Some(Duration::from_secs(19)));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(store.admit(&request(2, 10, 30, "z")).await.unwrap().admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspect_does_not_record() {
        let store = InMemoryFastStore::new();
        store.admit(&request(3, 10, 0, "a")).await.unwrap();
        let first = store.inspect(&request(3, 10, 0, "")).await.unwrap();
        let second = store.inspect(&request(3, 10, 0, "")).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(second.count, 1);
        assert!(second.admitted);
        assert_eq!(second.reset_after, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_remove_entry_by_token() {
        let store = InMemoryFastStore::new();
        store.admit(&request(3, 10, 0, "keep")).await.unwrap();
        store.admit(&request(3, 10, 0, "drop")).await.unwrap();
        assert!(store.remove_entry("e", "drop").await.unwrap());
        assert!(!store.remove_entry("e", "drop").await.unwrap());
        assert_eq!(store.inspect(&request(3, 10, 0, "")).await.unwrap().count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_window_is_refused() {
        let store = InMemoryFastStore::new();
        let err = store.admit(&request(2, u64::MAX, 0, "a")).await.unwrap_err();
        assert!(matches!(
            err,
            pixels_core::PixelsError::Validation(ValidationError::InvalidConfig { .. })
        ));
        assert_eq!(store.inspect(&request(2, 10, 0, "")).await.unwrap().count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_window_still_limits() {
        let store = InMemoryFastStore::new();
        let long = request(2, i64::MAX as u64 / 1000, 0, "a");
        assert!(store.admit(&long).await.unwrap().admitted);
        let second = WindowRequest {
            token: "b".into(),
            ..long.clone()
        };
        assert!(store.admit(&second).await.unwrap().admitted);
        let third = WindowRequest {
            token: "c".into(),
            ..long
        };
        assert!(!store.admit(&third).await.unwrap().admitted);
    }
}
