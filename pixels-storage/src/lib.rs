//! Pixels Storage - Store Interfaces
//!
//! The canvas talks to two external stores:
//!
//! - a **History Store**: relational, append-only ledger of pixel edits plus
//!   the singleton cache control row ([`HistoryStore`])
//! - a **Fast Store**: key-value store with TTLs and ordered sets, holding the
//!   packed board snapshot and all rate-limit bookkeeping ([`FastStore`])
//!
//! Both are async traits so production adapters (PostgreSQL, Redis) and the
//! in-memory implementations in [`memory`] are interchangeable. All
//! cross-worker coordination goes through these stores; nothing here relies
//! on in-process locking for correctness.

pub mod keys;
pub mod memory;
pub mod traits;

pub use keys::{rate_limit_keys, RateLimitKeys, SNAPSHOT_KEY};
pub use memory::{InMemoryFastStore, InMemoryHistoryStore};
pub use traits::{FastStore, HistoryStore, WindowOutcome, WindowRequest};
