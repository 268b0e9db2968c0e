//! Pixels Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for colors, coordinates, identities and ledger ops
//! - Fixtures wiring the in-memory stores together

// Re-export the in-memory stores from their source crate
pub use pixels_storage::{InMemoryFastStore, InMemoryHistoryStore};

pub use pixels_core::{
    BoardSize, BoardSnapshot, Coordinates, Identity, PixelsError, PixelsResult, Rgb, UserId,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for canvas types.

    use super::*;
    use proptest::prelude::*;

    /// Any 24-bit color.
    pub fn arb_rgb() -> impl Strategy<Value = Rgb> {
        any::<[u8; 3]>().prop_map(Rgb)
    }

    /// A valid color string in random letter case.
    pub fn arb_color_string() -> impl Strategy<Value = String> {
        "[0-9a-fA-F]{6}"
    }

    /// Strings that must be rejected as colors.
    pub fn arb_invalid_color() -> impl Strategy<Value = String> {
        prop_oneof![
            "[0-9a-fA-F]{0,5}",
            "[0-9a-fA-F]{7,10}",
            "#[0-9a-fA-F]{6}",
            "[g-zG-Z]{6}",
        ]
    }

    /// Small boards keep full-buffer assertions cheap.
    pub fn arb_board_size() -> impl Strategy<Value = BoardSize> {
        (1u16..=24, 1u16..=16).prop_map(|(width, height)| BoardSize { width, height })
    }

    /// Coordinates inside `size`.
    pub fn arb_coordinates(size: BoardSize) -> impl Strategy<Value = Coordinates> {
        (0..size.width as i16, 0..size.height as i16).prop_map(|(x, y)| Coordinates { x, y })
    }

    /// Raw request coordinates, in and out of bounds.
    pub fn arb_raw_coordinates(size: BoardSize) -> impl Strategy<Value = (i64, i64)> {
        let w = i64::from(size.width);
        let h = i64::from(size.height);
        (-3..w + 3, -3..h + 3)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        (1i64..10_000).prop_map(UserId)
    }

    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        (arb_user_id(), any::<bool>()).prop_map(|(user_id, privileged)| Identity {
            user_id,
            privileged,
        })
    }

    /// One step against a single coordinate: `Some(color)` sets, `None` deletes.
    pub fn arb_ledger_ops(max_len: usize) -> impl Strategy<Value = Vec<Option<Rgb>>> {
        prop::collection::vec(prop::option::weighted(0.7, arb_rgb()), 0..max_len)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made boards, identities and store pairs.

    use super::*;
    use std::sync::Arc;

    /// An 8x6 board.
    pub fn small_board() -> BoardSize {
        BoardSize {
            width: 8,
            height: 6,
        }
    }

    pub fn user(id: i64) -> Identity {
        Identity::user(id)
    }

    pub fn moderator(id: i64) -> Identity {
        Identity::moderator(id)
    }

    /// A fresh pair of in-memory stores.
    pub fn stores() -> (Arc<InMemoryHistoryStore>, Arc<InMemoryFastStore>) {
        (
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(InMemoryFastStore::new()),
        )
    }

    /// Expected color at `coords` in a raw snapshot buffer.
    pub fn cell(bytes: &[u8], size: BoardSize, coords: Coordinates) -> Rgb {
        let start = BoardSnapshot::offset(size, coords);
        Rgb([bytes[start], bytes[start + 1], bytes[start + 2]])
    }
}
