//! Level stitching.
//!
//! [`Stitcher`] ties the pieces together for one level of one pyramid:
//! validate metadata, enumerate the grid, fill the tile cache with bounded
//! concurrency, then composite the cached tiles into a raster.

mod config;
mod service;

pub use config::{
    default_cache_root, StitchConfig, CACHE_DIR_NAME, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_CONCURRENT_FETCHES, DEFAULT_PROGRESS_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};
pub use service::{StitchOutput, StitchReport, StitchRequest, Stitcher};
