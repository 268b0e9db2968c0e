//! Store adapters against real PostgreSQL and Redis.
//!
//! Run with `--features live-tests` and `PIXELS_LIVE_TESTS=1`; connection
//! settings come from the usual `PIXELS_DB_*` and `PIXELS_REDIS_*` variables.

#![cfg(feature = "live-tests")]

use std::time::Duration;

use pixels_api::{DbConfig, PgHistoryStore, RedisConfig, RedisFastStore};
use pixels_core::{Coordinates, NewPixelEdit, Rgb, UserId};
use pixels_storage::{rate_limit_keys, FastStore, HistoryStore, WindowRequest};

fn enabled() -> bool {
    std::env::var("PIXELS_LIVE_TESTS").is_ok_and(|v| v == "1")
}

/// Distinct per run so repeated runs do not see each other's rows.
fn run_marker() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

async fn history() -> PgHistoryStore {
    let pool = DbConfig::from_env().create_pool().unwrap();
    let store = PgHistoryStore::new(pool);
    store.migrate().await.unwrap();
    store
}

async fn fast() -> RedisFastStore {
    RedisFastStore::connect(&RedisConfig::from_env()).await.unwrap()
}

#[tokio::test]
async fn test_postgres_deletes_unwind_the_stack() {
    if !enabled() {
        return;
    }
    let store = history().await;
    let marker = run_marker();
    let coords = Coordinates {
        x: (marker % 1000) as i16 + 1000,
        y: ((marker / 1000) % 1000) as i16 + 1000,
    };

    for (author, color) in [(1, Rgb([0xFF, 0, 0])), (2, Rgb([0, 0xFF, 0]))] {
        store
            .append_edit(NewPixelEdit {
                coords,
                color,
                author: UserId(author),
            })
            .await
            .unwrap();
    }

    let before = store.cache_state().await.unwrap();
    let deletion = store
        .append_deletion(coords, UserId(100))
        .await
        .unwrap()
        .unwrap();
    assert!(deletion.deleted);
    assert_eq!(deletion.color, Rgb([0, 0xFF, 0]));
    assert!(store.cache_state().await.unwrap().last_modified >= before.last_modified);

    let current = store.current_pixel(coords).await.unwrap().unwrap();
    assert_eq!(current.author, UserId(1));

    store.append_deletion(coords, UserId(100)).await.unwrap();
    assert!(store.current_pixel(coords).await.unwrap().is_none());
    assert!(store.append_deletion(coords, UserId(100)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_postgres_sync_lock_round_trip() {
    if !enabled() {
        return;
    }
    let store = history().await;

    let mut claim = store.claim_sync_lock().await.unwrap();
    if let Some(previous) = claim.previous {
        let reclaimed = store.reclaim_sync_lock(previous).await.unwrap();
        claim.claimed_at = reclaimed.unwrap_or(claim.claimed_at);
    }

    let contender = store.claim_sync_lock().await.unwrap();
    assert!(!contender.acquired());

    store.mark_synced(claim.claimed_at).await.unwrap();
    store.release_sync_lock(claim.claimed_at).await.unwrap();

    let state = store.cache_state().await.unwrap();
    assert!(state.sync_lock.is_none());
    assert!(state.last_synced >= claim.claimed_at);
}

#[tokio::test]
async fn test_redis_buffers() {
    if !enabled() {
        return;
    }
    let store = fast().await;
    let key = format!("pixels-live-test:{}", run_marker());

    assert!(!store.set_range(&key, 0, b"abc").await.unwrap());
    assert!(store.get_bytes(&key).await.unwrap().is_none());

    store.set_bytes(&key, b"\xFF\xFF\xFF\xFF\xFF\xFF").await.unwrap();
    assert!(store.set_range(&key, 3, b"\x01\x02\x03").await.unwrap());
    assert_eq!(
        store.get_bytes(&key).await.unwrap().unwrap(),
        b"\xFF\xFF\xFF\x01\x02\x03".to_vec()
    );
}

#[tokio::test]
async fn test_redis_window_admission() {
    if !enabled() {
        return;
    }
    let store = fast().await;
    let scope = run_marker().to_string();
    let keys = rate_limit_keys("live", Some(&scope), Some("test"));
    let request = |token: &str| WindowRequest {
        entries_key: keys.entries.clone(),
        cooldown_key: keys.cooldown.clone(),
        limit: 2,
        window: Duration::from_secs(30),
        cooldown: Duration::from_secs(60),
        token: token.to_string(),
    };

    let first = store.admit(&request("a")).await.unwrap();
    assert!(first.admitted);
    assert_eq!(first.count, 1);
    assert!(store.admit(&request("b")).await.unwrap().admitted);

    let peek = store.inspect(&request("c")).await.unwrap();
    assert_eq!(peek.count, 2);

    assert!(store.remove_entry(&keys.entries, "b").await.unwrap());
    assert!(!store.remove_entry(&keys.entries, "b").await.unwrap());
    assert!(store.admit(&request("c")).await.unwrap().admitted);

    let rejected = store.admit(&request("d")).await.unwrap();
    assert!(!rejected.admitted);
    assert_eq!(rejected.retry_after, Some(Duration::from_secs(60)));

    // The cooldown now rejects regardless of the window.
    assert!(store.remove_entry(&keys.entries, "a").await.unwrap());
    assert!(!store.admit(&request("e")).await.unwrap().admitted);

    store.set_flag(&keys.cooldown, Duration::from_millis(1)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.admit(&request("f")).await.unwrap().admitted);
}
