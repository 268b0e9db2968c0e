//! Pixels Cache - Canvas Cache Manager
//!
//! Keeps a packed snapshot of the board in the Fast Store consistent with
//! the append-only ledger in the History Store.
//!
//! The snapshot is stale whenever the ledger's `last_modified` is newer than
//! `last_synced`. A stale read claims the store-side `sync_lock`; the single
//! winner rebuilds the whole buffer while every other worker keeps serving
//! the previous snapshot. A claim older than the watchdog timeout is treated
//! as abandoned and reclaimed (see [`sync`]).

pub mod config;
pub mod freshness;
pub mod manager;
pub mod sync;

pub use config::CacheConfig;
pub use freshness::{Freshness, PixelRead, SnapshotRead};
pub use manager::CanvasCacheManager;
pub use sync::SyncOutcome;
