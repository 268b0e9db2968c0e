//! Pixel-level types: colors, coordinates, board dimensions and ledger rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::identity::UserId;

/// Store-assigned timestamp.
pub type Timestamp = DateTime<Utc>;

// ============================================================================
// COLOR
// ============================================================================

/// A 24-bit RGB color.
///
/// Parsed from and rendered as exactly six hex digits (no `#` prefix).
/// Rendering is always uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([0xFF, 0xFF, 0xFF]);
    pub const BLACK: Rgb = Rgb([0x00, 0x00, 0x00]);

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

impl FromStr for Rgb {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidColor {
            value: s.to_string(),
        };
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let mut bytes = [0u8; 3];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| invalid())?;
        Ok(Rgb(bytes))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ============================================================================
// COORDINATES AND BOARD SIZE
// ============================================================================

/// A validated cell position on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i16,
    pub y: i16,
}

/// Fixed board dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSize {
    pub width: u16,
    pub height: u16,
}

impl Default for BoardSize {
    fn default() -> Self {
        Self {
            width: 160,
            height: 90,
        }
    }
}

impl BoardSize {
    /// Create a board size. Both dimensions must fit the ledger's 16-bit coordinates.
    pub fn new(width: u16, height: u16) -> Result<Self, ValidationError> {
        if width == 0 || height == 0 {
            return Err(ValidationError::InvalidConfig {
                field: "board".to_string(),
                reason: format!("dimensions must be positive, got {}x{}", width, height),
            });
        }
        if width > i16::MAX as u16 || height > i16::MAX as u16 {
            return Err(ValidationError::InvalidConfig {
                field: "board".to_string(),
                reason: format!("dimensions must not exceed {}", i16::MAX),
            });
        }
        Ok(Self { width, height })
    }

    /// Validate raw request coordinates against the board bounds.
    pub fn coordinates(&self, x: i64, y: i64) -> Result<Coordinates, ValidationError> {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return Err(ValidationError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(Coordinates {
            x: x as i16,
            y: y as i16,
        })
    }

    pub fn contains(&self, coords: Coordinates) -> bool {
        coords.x >= 0
            && coords.y >= 0
            && (coords.x as u16) < self.width
            && (coords.y as u16) < self.height
    }

    pub fn cell_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

// ============================================================================
// LEDGER ROWS
// ============================================================================

/// One row of the append-only edit ledger.
///
/// A deletion is itself a row with `deleted = true`; its `color` records
/// the color of the edit it removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelEdit {
    /// Store-assigned sequence; defines resolution order.
    pub id: i64,
    pub coords: Coordinates,
    pub color: Rgb,
    pub author: UserId,
    pub created_at: Timestamp,
    pub deleted: bool,
}

/// An edit about to be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewPixelEdit {
    pub coords: Coordinates,
    pub color: Rgb,
    pub author: UserId,
}

/// The resolved, currently visible state of one coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPixel {
    pub coords: Coordinates,
    pub color: Rgb,
    pub author: UserId,
    pub placed_at: Timestamp,
}

impl From<&PixelEdit> for CurrentPixel {
    fn from(edit: &PixelEdit) -> Self {
        Self {
            coords: edit.coords,
            color: edit.color,
            author: edit.author,
            placed_at: edit.created_at,
        }
    }
}
