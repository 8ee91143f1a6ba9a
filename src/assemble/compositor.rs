//! Tile compositing onto a level-sized canvas.

use std::path::PathBuf;
use std::sync::Arc;

use image::{imageops, RgbaImage};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::PyramidError;
use crate::fetch::SlotResolver;
use crate::pyramid::{TileAddress, TileGrid, TileRect};

/// Default number of tiles decoded in parallel.
pub const DEFAULT_DECODE_CONCURRENCY: usize = 4;

/// Decodes cached tiles and pastes them into one raster.
///
/// Decoding runs on the blocking pool with at most `max_concurrent_decodes`
/// tiles in flight. Pasting happens on the calling task, so the canvas is
/// never shared.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    max_concurrent_decodes: usize,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new(DEFAULT_DECODE_CONCURRENCY)
    }
}

impl Compositor {
    pub fn new(max_concurrent_decodes: usize) -> Self {
        Self {
            max_concurrent_decodes: max_concurrent_decodes.max(1),
        }
    }

    pub fn max_concurrent_decodes(&self) -> usize {
        self.max_concurrent_decodes
    }

    /// Build the level image from the cached slots of `addresses`.
    ///
    /// Every address must belong to `grid` and have a populated slot. The
    /// canvas is exactly the level's dimensions. Order of `addresses` does not
    /// affect the result. A level too large to address as one RGBA buffer is
    /// rejected with [`PyramidError::InvalidMetadata`].
    pub async fn compose<R>(
        &self,
        grid: &TileGrid,
        addresses: &[TileAddress],
        resolver: Arc<R>,
    ) -> Result<RgbaImage, PyramidError>
    where
        R: SlotResolver + 'static,
    {
        let level = grid.level();
        level.check_canvas()?;
        let mut canvas = RgbaImage::new(level.width, level.height);

        let mut pending = Vec::with_capacity(addresses.len());
        for address in addresses {
            let rect = grid.rect(address).ok_or_else(|| PyramidError::Assembly {
                address: *address,
                message: format!(
                    "address outside the {}x{} grid of level {}",
                    grid.columns(),
                    grid.rows(),
                    level.index
                ),
            })?;
            pending.push((*address, rect));
        }

        debug!(
            level = level.index,
            width = level.width,
            height = level.height,
            tiles = pending.len(),
            "Compositing level"
        );

        let mut queue = pending.into_iter();
        let mut decodes = JoinSet::new();

        loop {
            while decodes.len() < self.max_concurrent_decodes {
                let Some((address, rect)) = queue.next() else {
                    break;
                };
                let path = resolver.slot_path(&address);
                decodes.spawn_blocking(move || {
                    decode_slot(address, path).map(|tile| (address, rect, tile))
                });
            }

            let Some(joined) = decodes.join_next().await else {
                break;
            };

            let (address, rect, tile) =
                joined.map_err(|e| PyramidError::Worker(e.to_string()))??;
            paste_tile(&mut canvas, &tile, address, rect);
        }

        Ok(canvas)
    }
}

/// Read and decode one cache slot.
fn decode_slot(address: TileAddress, path: PathBuf) -> Result<RgbaImage, PyramidError> {
    let data = std::fs::read(&path).map_err(|e| PyramidError::Assembly {
        address,
        message: format!("cache slot {} unreadable: {}", path.display(), e),
    })?;

    let decoded = image::load_from_memory(&data).map_err(|e| PyramidError::Decode {
        address,
        path: path.clone(),
        message: e.to_string(),
    })?;

    Ok(decoded.to_rgba8())
}

/// Copy `tile` into `canvas` at the origin of `rect`.
///
/// Oversized tiles are cropped to the rect. Undersized tiles are pasted
/// as-is, leaving the remainder of the rect transparent.
pub fn paste_tile(canvas: &mut RgbaImage, tile: &RgbaImage, address: TileAddress, rect: TileRect) {
    let (tw, th) = tile.dimensions();

    if tw < rect.width || th < rect.height {
        warn!(
            tile = %address,
            expected_width = rect.width,
            expected_height = rect.height,
            width = tw,
            height = th,
            "Tile smaller than its grid cell"
        );
    }

    if tw > rect.width || th > rect.height {
        let cropped =
            imageops::crop_imm(tile, 0, 0, rect.width.min(tw), rect.height.min(th)).to_image();
        imageops::replace(canvas, &cropped, rect.x as i64, rect.y as i64);
    } else {
        imageops::replace(canvas, tile, rect.x as i64, rect.y as i64);
    }
}
