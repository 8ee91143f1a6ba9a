//! Pyramid model: metadata, levels and tile grids.
//!
//! # Layout
//!
//! ```text
//!  index 0          index 1              ...   index N (full resolution)
//! ┌──┐            ┌────┐                      ┌──────────────┬─────┐
//! │  │            │    │                      │ 0_0          │ 1_0 │
//! └──┘            │    │                      ├──────────────┼─────┤
//!                 └────┘                      │ 0_1          │ 1_1 │
//!                                             └──────────────┴─────┘
//! ```
//!
//! - [`compute_levels`]: derives level sizes by repeated ceiling-halving
//! - [`TileGrid`]: column/row counts, addresses and clipped tile rects
//! - [`Pyramid`]: validated metadata plus its level list

mod grid;
mod levels;

pub use grid::{TileAddress, TileGrid, TileRect};
pub use levels::{compute_levels, Level};

use serde::Deserialize;

use crate::error::PyramidError;

// =============================================================================
// Pyramid Metadata
// =============================================================================

/// Description of a remote tile pyramid as advertised by its scene document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PyramidMetadata {
    /// Full-resolution width in pixels
    pub width: u32,

    /// Full-resolution height in pixels
    pub height: u32,

    /// Edge length of a (non-clipped) tile in pixels
    pub tile_size: u32,

    /// Tile file extension, e.g. `jpg` or `png`
    pub format: String,
}

impl PyramidMetadata {
    pub fn new(width: u32, height: u32, tile_size: u32, format: impl Into<String>) -> Self {
        Self {
            width,
            height,
            tile_size,
            format: format.into(),
        }
    }

    /// Reject zero dimensions, a zero tile size or an empty format.
    pub fn validate(&self) -> Result<(), PyramidError> {
        if self.width == 0 || self.height == 0 {
            return Err(PyramidError::InvalidMetadata(format!(
                "base dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.tile_size == 0 {
            return Err(PyramidError::InvalidMetadata(
                "tile size must be positive".to_string(),
            ));
        }
        if self.format.trim().is_empty() {
            return Err(PyramidError::InvalidMetadata(
                "tile format must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Pyramid
// =============================================================================

/// Validated pyramid metadata together with its derived levels.
#[derive(Debug, Clone)]
pub struct Pyramid {
    metadata: PyramidMetadata,
    levels: Vec<Level>,
}

impl Pyramid {
    /// Validate `metadata` and derive the level list.
    pub fn new(metadata: PyramidMetadata) -> Result<Self, PyramidError> {
        metadata.validate()?;
        let levels = compute_levels(metadata.width, metadata.height)?;
        Ok(Self { metadata, levels })
    }

    pub fn metadata(&self) -> &PyramidMetadata {
        &self.metadata
    }

    /// All levels from smallest to full resolution.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Index of the full-resolution level.
    pub fn max_level(&self) -> usize {
        self.levels.len() - 1
    }

    /// Look up a level by index.
    pub fn level(&self, index: usize) -> Result<Level, PyramidError> {
        self.levels
            .get(index)
            .copied()
            .ok_or(PyramidError::LevelOutOfRange {
                level: index,
                count: self.levels.len(),
            })
    }

    /// Tile grid for the level at `index`.
    pub fn grid(&self, index: usize) -> Result<TileGrid, PyramidError> {
        TileGrid::new(self.level(index)?, self.metadata.tile_size)
    }
}
