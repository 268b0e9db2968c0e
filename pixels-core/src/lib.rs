//! Pixels Core - Domain Types
//!
//! Shared vocabulary for the canvas backend: coordinates and colors,
//! the append-only edit ledger rows, the cache control row, the packed
//! board snapshot, caller identities, and the error taxonomy every other
//! crate in the workspace speaks.

pub mod board;
pub mod cache_state;
pub mod error;
pub mod history;
pub mod identity;
pub mod pixel;

pub use board::{BoardSnapshot, BYTES_PER_CELL};
pub use cache_state::{CacheState, LockClaim};
pub use error::{
    AccessError, PixelsError, PixelsResult, StoreError, StoreKind, ValidationError,
};
pub use history::resolve_current;
pub use identity::{Identity, UserId};
pub use pixel::{BoardSize, Coordinates, CurrentPixel, NewPixelEdit, PixelEdit, Rgb, Timestamp};
