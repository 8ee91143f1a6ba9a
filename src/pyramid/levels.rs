//! Level size derivation.
//!
//! Deep-zoom pyramids halve each dimension (rounding up) from one level to the
//! next. The list built here never includes the terminal 1×1 level, and tile
//! URLs always use `index + 1` as the remote level number. For any base larger
//! than 1×1 that is exactly the remote's numbering, where 1×1 is level 0.
//! A 1×1 base is the exception: its single level is index 0 and is still
//! requested as remote level 1, so such a pyramid only stitches against hosts
//! that publish its one tile there.

use crate::error::PyramidError;

/// One resolution step of the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Level {
    /// Position in the level list (0 = smallest, last = full resolution)
    pub index: usize,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,
}

impl Level {
    /// Create a level descriptor.
    pub fn new(index: usize, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
        }
    }

    /// Total pixel count of the level.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Bytes of an RGBA canvas covering the level, if addressable.
    pub fn canvas_bytes(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }

    /// Fail with [`PyramidError::InvalidMetadata`] when the level cannot be
    /// held in one RGBA canvas.
    pub fn check_canvas(&self) -> Result<usize, PyramidError> {
        self.canvas_bytes().ok_or_else(|| {
            PyramidError::InvalidMetadata(format!(
                "level {} is {}x{}, too large for one RGBA canvas",
                self.index, self.width, self.height
            ))
        })
    }
}

/// Derive the ordered level list for a base image size.
///
/// Sizes are collected from full resolution downward while either dimension
/// is still above 1, then reversed so the last entry is `(base_width,
/// base_height)`. A 1×1 base produces a single 1×1 level instead of an empty
/// list.
pub fn compute_levels(base_width: u32, base_height: u32) -> Result<Vec<Level>, PyramidError> {
    if base_width == 0 || base_height == 0 {
        return Err(PyramidError::InvalidMetadata(format!(
            "base dimensions must be positive, got {}x{}",
            base_width, base_height
        )));
    }

    let mut sizes = Vec::new();
    let (mut width, mut height) = (base_width, base_height);

    while width > 1 || height > 1 {
        sizes.push((width, height));
        width = width.div_ceil(2);
        height = height.div_ceil(2);
    }

    if sizes.is_empty() {
        sizes.push((1, 1));
    }

    Ok(sizes
        .into_iter()
        .rev()
        .enumerate()
        .map(|(index, (width, height))| Level::new(index, width, height))
        .collect())
}
