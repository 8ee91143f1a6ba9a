//! # Pyramid Stitcher
//!
//! Rebuild full-resolution images from remote deep-zoom tile pyramids.
//!
//! Given a pyramid's metadata (base size, tile size, tile format) and the URL
//! its tiles are published under, the engine derives the pyramid levels, lays
//! out the tile grid of one level, downloads the missing tiles into a local
//! cache and composites them into a single raster of the level's exact size.
//!
//! ## Features
//!
//! - **Persistent tile cache**: tiles are written atomically and reused across runs
//! - **Bounded concurrency**: a fixed number of downloads in flight, with cancellation
//! - **Exact edges**: partial edge tiles are clipped, the canvas is never padded
//! - **Scene discovery**: reads the widget's `sceneconfig.json` to find every pyramid
//!
//! ## Architecture
//!
//! - [`pyramid`] - Metadata, level calculation and tile grid addressing
//! - [`fetch`] - Tile sources and the on-disk tile cache
//! - [`assemble`] - Decoding and compositing tiles onto a canvas
//! - [`stitch`] - Per-level orchestration and engine configuration
//! - [`scene`] - Scene document model and download
//! - [`output`] - Encoding the joined image
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use pyramid_stitcher::{PyramidMetadata, SourceLocation, StitchConfig, StitchRequest, Stitcher};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let stitcher = Stitcher::http(&StitchConfig::new("/tmp/tiles"))?;
//!
//!     let request = StitchRequest::new(
//!         SourceLocation::new("page1_files", "https://host/widget/page1_files"),
//!         PyramidMetadata::new(4000, 3000, 254, "jpg"),
//!     );
//!
//!     let output = stitcher.stitch(&request, &CancellationToken::new()).await?;
//!     println!("{} tiles, {} downloaded", output.report.tiles, output.report.downloaded);
//!     Ok(())
//! }
//! ```

pub mod assemble;
pub mod config;
pub mod error;
pub mod fetch;
pub mod output;
pub mod pyramid;
pub mod scene;
pub mod stitch;

// Re-export commonly used types
pub use assemble::{paste_tile, Compositor};
pub use config::Config;
pub use error::{FetchError, OutputError, PyramidError, SceneError, SourceError};
pub use fetch::{
    tile_url, CacheNamespace, EnsureOutcome, HttpTileSource, SlotResolver, SourceLocation,
    TileSource, TileStore,
};
pub use output::{
    clamp_quality, encode_image, is_valid_quality, output_path, save_image, write_image,
    OutputFormat, DEFAULT_JPEG_QUALITY,
};
pub use pyramid::{compute_levels, Level, Pyramid, PyramidMetadata, TileAddress, TileGrid, TileRect};
pub use scene::{
    fetch_scene, folder_matches, normalize_widget_url, PyramidFolder, SceneConfig,
};
pub use stitch::{StitchConfig, StitchOutput, StitchReport, StitchRequest, Stitcher};
