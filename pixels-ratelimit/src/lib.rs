//! Pixels Rate Limit - Sliding-Window Buckets
//!
//! Every request against a bucket key inserts one entry scored by its
//! expiry time into an ordered set in the Fast Store. Entries expire one
//! at a time, so the window slides instead of resetting on a boundary. A
//! breach raises a cooldown flag that rejects everything until the store
//! evicts it.
//!
//! Bucket variants differ only in how they derive their key:
//!
//! | Scope | Key |
//! |-------|-----|
//! | [`PerIdentity`] | caller + route |
//! | [`PrivilegedIdentity`] | privileged caller + route |
//! | [`Global`] | route |
//! | [`SharedRoutes`] | inner scope, route replaced by a pool name |

pub mod bucket;
pub mod config;
pub mod result;
pub mod scope;

pub use bucket::{Bucket, RateLimitBucket};
pub use config::BucketConfig;
pub use result::{Admission, AdmissionResult};
pub use scope::{
    BucketKey, Global, KeyScope, PerIdentity, PrivilegedIdentity, RequestContext, SharedRoutes,
};
