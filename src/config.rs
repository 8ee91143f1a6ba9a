//! Command-line configuration for the `pyramid-stitcher` binary.
//!
//! Every option can also be set through an environment variable with the
//! `STITCH_` prefix:
//!
//! - `STITCH_FORMAT` - Output image format (default: the tile format)
//! - `STITCH_NAME` - Only process folders whose name contains this text
//! - `STITCH_LEVEL` - Level index to build (default: full resolution)
//! - `STITCH_FORCE_DOWNLOAD` - Ignore cached tiles
//! - `STITCH_CACHE_DIR` - Tile cache root (default: `{temp}/pyramid-stitcher`)
//! - `STITCH_CONCURRENCY` - Parallel tile downloads (default: 8)
//! - `STITCH_TIMEOUT` - Per-request timeout in seconds (default: 30)
//! - `STITCH_JPEG_QUALITY` - JPEG output quality (default: 90)

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::output::{is_valid_quality, OutputFormat, DEFAULT_JPEG_QUALITY};
use crate::scene::normalize_widget_url;
use crate::stitch::{default_cache_root, StitchConfig, DEFAULT_MAX_CONCURRENT_FETCHES};

// =============================================================================
// Default Values
// =============================================================================

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Upper bound on parallel downloads.
pub const MAX_CONCURRENCY: usize = 64;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pyramid Stitcher - rebuild full images from deep-zoom tile pyramids.
///
/// Reads the scene document published under a viewer widget URL, downloads
/// the tiles of every pyramid folder into a local cache and writes one joined
/// image per folder.
#[derive(Parser, Debug, Clone)]
#[command(name = "pyramid-stitcher")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Widget base URL (the directory holding sceneconfig.json).
    pub url: String,

    /// Output directory.
    pub out: PathBuf,

    // =========================================================================
    // Selection
    // =========================================================================
    /// Output image format (default: use the tile format).
    #[arg(short, long, env = "STITCH_FORMAT")]
    pub format: Option<String>,

    /// Only process folders whose name contains this text (case-insensitive).
    #[arg(short, long, env = "STITCH_NAME")]
    pub name: Option<String>,

    /// Resolution level index (default: the largest level).
    #[arg(short, long, env = "STITCH_LEVEL")]
    pub level: Option<usize>,

    // =========================================================================
    // Fetching
    // =========================================================================
    /// Re-download tiles even when they are cached.
    #[arg(short = 'd', long, default_value_t = false, env = "STITCH_FORCE_DOWNLOAD")]
    pub force_download: bool,

    /// Tile cache directory.
    #[arg(long, env = "STITCH_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum number of parallel tile downloads.
    #[arg(short, long, default_value_t = DEFAULT_MAX_CONCURRENT_FETCHES, env = "STITCH_CONCURRENCY")]
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "STITCH_TIMEOUT")]
    pub timeout: u64,

    // =========================================================================
    // Output
    // =========================================================================
    /// JPEG quality for the joined image (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "STITCH_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        normalize_widget_url(&self.url).map_err(|e| e.to_string())?;

        if self.out.as_os_str().is_empty() {
            return Err("Output directory is required".to_string());
        }

        if let Some(format) = &self.format {
            if OutputFormat::from_extension(format).is_none() {
                return Err(format!(
                    "Unsupported output format '{}'. Use an image extension such as jpg, png, tif, bmp or webp",
                    format
                ));
            }
        }

        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            ));
        }

        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        Ok(())
    }

    /// Tile cache root, falling back to the system temp directory.
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_root)
    }

    /// Engine configuration derived from the command line.
    pub fn stitch_config(&self) -> StitchConfig {
        StitchConfig::new(self.cache_root())
            .with_max_concurrent_fetches(self.concurrency)
            .with_request_timeout(Duration::from_secs(self.timeout))
    }

    /// Output format for a folder whose tiles use `tile_format`.
    pub fn output_format<'a>(&'a self, tile_format: &'a str) -> &'a str {
        self.format.as_deref().unwrap_or(tile_format)
    }
}

// =============================================================================
// Tests
// =============================================================================
