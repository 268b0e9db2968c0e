//! Packed board snapshot.
//!
//! The snapshot is a flat buffer of `width * height` cells, three bytes per
//! cell in row-major order. A cell's offset is derived from its coordinates
//! so a single pixel can be rewritten with a partial-range write instead of
//! replacing the whole buffer.

use crate::pixel::{BoardSize, Coordinates, CurrentPixel, Rgb};

/// Width of one cell in the packed buffer.
pub const BYTES_PER_CELL: usize = 3;

/// The full board as one byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    size: BoardSize,
    bytes: Vec<u8>,
}

impl BoardSnapshot {
    /// A board where every cell has the background color.
    pub fn blank(size: BoardSize, background: Rgb) -> Self {
        let bytes = background.0.repeat(size.cell_count());
        Self { size, bytes }
    }

    /// Wrap a buffer read back from the store.
    ///
    /// Returns `None` if the buffer does not match the board dimensions,
    /// which happens after a resize or a partial write by something else.
    pub fn from_bytes(size: BoardSize, bytes: Vec<u8>) -> Option<Self> {
        (bytes.len() == Self::expected_len(size)).then_some(Self { size, bytes })
    }

    /// Build a board from resolved ledger state.
    pub fn from_current(size: BoardSize, background: Rgb, pixels: &[CurrentPixel]) -> Self {
        let mut board = Self::blank(size, background);
        for pixel in pixels {
            // Rows outside the current board survive a shrink in the ledger.
            if size.contains(pixel.coords) {
                board.paint(pixel.coords, pixel.color);
            }
        }
        board
    }

    pub fn expected_len(size: BoardSize) -> usize {
        size.cell_count() * BYTES_PER_CELL
    }

    /// Byte offset of a cell. Callers must pass coordinates inside `size`.
    pub fn offset(size: BoardSize, coords: Coordinates) -> usize {
        (coords.y as usize * usize::from(size.width) + coords.x as usize) * BYTES_PER_CELL
    }

    pub fn size(&self) -> BoardSize {
        self.size
    }

    pub fn pixel(&self, coords: Coordinates) -> Option<Rgb> {
        if !self.size.contains(coords) {
            return None;
        }
        let start = Self::offset(self.size, coords);
        let cell = self.bytes.get(start..start + BYTES_PER_CELL)?;
        Some(Rgb([cell[0], cell[1], cell[2]]))
    }

    pub fn paint(&mut self, coords: Coordinates, color: Rgb) {
        if !self.size.contains(coords) {
            return;
        }
        let start = Self::offset(self.size, coords);
        self.bytes[start..start + BYTES_PER_CELL].copy_from_slice(&color.0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserId;
    use chrono::Utc;
    use proptest::prelude::*;

    fn size() -> BoardSize {
        BoardSize::new(4, 3).unwrap()
    }

    #[test]
    fn test_blank_board_uses_background() {
        let board = BoardSnapshot::blank(size(), Rgb::WHITE);
        assert_eq!(board.as_bytes().len(), 36);
        assert!(board.as_bytes().iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn test_offset_is_row_major() {
        let size = size();
        assert_eq!(BoardSnapshot::offset(size, Coordinates { x: 0, y: 0 }), 0);
        assert_eq!(BoardSnapshot::offset(size, Coordinates { x: 1, y: 0 }), 3);
        assert_eq!(BoardSnapshot::offset(size, Coordinates { x: 0, y: 1 }), 12);
        assert_eq!(BoardSnapshot::offset(size, Coordinates { x: 3, y: 2 }), 33);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(BoardSnapshot::from_bytes(size(), vec![0; 35]).is_none());
        assert!(BoardSnapshot::from_bytes(size(), vec![0; 36]).is_some());
    }

    #[test]
    fn test_from_current_paints_resolved_pixels() {
        let coords = Coordinates { x: 2, y: 1 };
        let pixels = vec![
            CurrentPixel {
                coords,
                color: Rgb([1, 2, 3]),
                author: UserId(7),
                placed_at: Utc::now(),
            },
            CurrentPixel {
                coords: Coordinates { x: 9, y: 9 },
                color: Rgb::BLACK,
                author: UserId(7),
                placed_at: Utc::now(),
            },
        ];
        let board = BoardSnapshot::from_current(size(), Rgb::WHITE, &pixels);
        assert_eq!(board.pixel(coords), Some(Rgb([1, 2, 3])));
        assert_eq!(board.pixel(Coordinates { x: 0, y: 0 }), Some(Rgb::WHITE));
        assert_eq!(board.pixel(Coordinates { x: 9, y: 9 }), None);
    }

    proptest! {
        #[test]
        fn prop_paint_touches_exactly_one_cell(x in 0i16..4, y in 0i16..3, color in any::<[u8; 3]>()) {
            let coords = Coordinates { x, y };
            let mut board = BoardSnapshot::blank(size(), Rgb::WHITE);
            board.paint(coords, Rgb(color));
            let start = BoardSnapshot::offset(size(), coords);
            for (i, byte) in board.as_bytes().iter().enumerate() {
                if (start..start + BYTES_PER_CELL).contains(&i) {
                    prop_assert_eq!(*byte, color[i - start]);
                } else {
                    prop_assert_eq!(*byte, 0xFF);
                }
            }
        }
    }
}
