//! Tile key identifying one cached tile.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Coordinate of a single map tile at one zoom level.
///
/// Used both as the logical lookup key of the cache and, through
/// [`TileKey::index_key`], as the key recorded in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
    /// Zoom level
    pub zoom: u8,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(x: u32, y: u32, zoom: u8) -> Self {
        Self { x, y, zoom }
    }

    /// String form stored in the index: `"{x}.{y}.{zoom}"`.
    ///
    /// # Example
    ///
    /// ```
    /// use tilecache::cache::TileKey;
    ///
    /// assert_eq!(TileKey::new(1, 0, 5).index_key(), "1.0.5");
    /// ```
    pub fn index_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.x, self.y, self.zoom)
    }
}

/// Error parsing a tile key from its `x.y.zoom` form.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid tile '{input}' - expected format like '1024.512.11' (x.y.zoom)")]
pub struct TileKeyParseError {
    input: String,
}

impl FromStr for TileKey {
    type Err = TileKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TileKeyParseError {
            input: s.to_string(),
        };

        let mut parts = s.trim().split('.');
        let x = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let y = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let zoom = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;

        if parts.next().is_some() {
            return Err(err());
        }

        Ok(Self { x, y, zoom })
    }
}
