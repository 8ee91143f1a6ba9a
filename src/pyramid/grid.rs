//! Tile grid addressing for a single pyramid level.
//!
//! Tiles are laid out on a regular grid of `tile_size` pixels starting at the
//! top-left corner. The last column and row are clipped to the level bounds,
//! so edge tiles may be smaller than `tile_size`.

use std::fmt;

use crate::error::PyramidError;

use super::levels::Level;

// =============================================================================
// Tile Address
// =============================================================================

/// Identifies one remote tile and one cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileAddress {
    /// Level index (0 = smallest level)
    pub level: u32,

    /// Tile column (0-indexed from left)
    pub column: u32,

    /// Tile row (0-indexed from top)
    pub row: u32,
}

impl TileAddress {
    /// Create a new tile address.
    pub fn new(level: u32, column: u32, row: u32) -> Self {
        Self { level, column, row }
    }

    /// Level number as the remote pyramid reports it (1-indexed).
    pub fn remote_level(&self) -> u32 {
        self.level + 1
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/{}_{}", self.level, self.column, self.row)
    }
}

// =============================================================================
// Tile Rect
// =============================================================================

/// Pixel rectangle covered by one tile within its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TileRect {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Check whether the pixel `(px, py)` lies inside this rect.
    pub fn contains(&self, px: u32, py: u32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Check whether two rects share at least one pixel.
    pub fn overlaps(&self, other: &TileRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

// =============================================================================
// Tile Grid
// =============================================================================

/// Column/row layout of the tiles covering one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    level: Level,
    tile_size: u32,
    columns: u32,
    rows: u32,
}

impl TileGrid {
    /// Build the grid for `level` with square tiles of `tile_size` pixels.
    pub fn new(level: Level, tile_size: u32) -> Result<Self, PyramidError> {
        if tile_size == 0 {
            return Err(PyramidError::InvalidMetadata(
                "tile size must be positive".to_string(),
            ));
        }
        if level.width == 0 || level.height == 0 {
            return Err(PyramidError::InvalidMetadata(format!(
                "level {} has empty dimensions {}x{}",
                level.index, level.width, level.height
            )));
        }

        Ok(Self {
            level,
            tile_size,
            columns: level.width.div_ceil(tile_size),
            rows: level.height.div_ceil(tile_size),
        })
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of tile columns.
    pub fn columns(&self) -> u32 {
        self.columns
    }

    /// Number of tile rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Total number of tiles in the grid.
    pub fn tile_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Check whether an address belongs to this grid.
    pub fn contains(&self, address: &TileAddress) -> bool {
        address.level as usize == self.level.index
            && address.column < self.columns
            && address.row < self.rows
    }

    /// All tile addresses in row-major order.
    ///
    /// The order is stable for a given grid so progress output is reproducible.
    pub fn addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        let level = self.level.index as u32;
        (0..self.rows)
            .flat_map(move |row| (0..self.columns).map(move |column| TileAddress::new(level, column, row)))
    }

    /// Pixel rectangle covered by `address`, or `None` if it is outside the grid.
    pub fn rect(&self, address: &TileAddress) -> Option<TileRect> {
        if !self.contains(address) {
            return None;
        }

        let x = address.column * self.tile_size;
        let y = address.row * self.tile_size;

        Some(TileRect {
            x,
            y,
            width: self.tile_size.min(self.level.width - x),
            height: self.tile_size.min(self.level.height - y),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
