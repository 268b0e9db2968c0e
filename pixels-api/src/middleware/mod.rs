//! Request middleware: bearer-token identity and per-route rate limiting.

pub mod gate;
pub mod identity;

pub use gate::{apply_quota_headers, rate_limit_gate, RouteGate};
pub use identity::{identity_middleware, AuthIdentity, ModeratorIdentity};
