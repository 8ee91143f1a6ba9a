//! Per-level orchestration: fetch every tile of one level, then composite.
//!
//! # Pipeline
//!
//! ```text
//!  StitchRequest
//!       │
//!       ▼
//!  Pyramid::new ──► level ──► TileGrid::addresses()
//!                                   │
//!                 ┌─────────────────┴──────────────────┐
//!                 │  JoinSet window (max_concurrent)   │
//!                 │  TileStore::ensure_cancellable()   │
//!                 │  first failure cancels the rest    │
//!                 └─────────────────┬──────────────────┘
//!                                   ▼
//!                    Compositor::compose(CacheNamespace)
//!                                   │
//!                                   ▼
//!                         StitchOutput { image, report }
//! ```

use std::sync::Arc;

use image::RgbaImage;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assemble::Compositor;
use crate::error::{FetchError, PyramidError, SourceError};
use crate::fetch::{EnsureOutcome, HttpTileSource, SourceLocation, TileSource, TileStore};
use crate::pyramid::{Pyramid, PyramidMetadata, TileGrid};

use super::config::StitchConfig;

// =============================================================================
// Stitch Request
// =============================================================================

/// One level of one pyramid to reconstruct.
#[derive(Debug, Clone)]
pub struct StitchRequest {
    /// Where the pyramid's tiles live
    pub source: SourceLocation,

    /// Advertised pyramid metadata
    pub metadata: PyramidMetadata,

    /// Level index to build (`None` = full resolution)
    pub level: Option<usize>,

    /// Tile extension override (`None` = `metadata.format`)
    pub tile_format: Option<String>,

    /// Re-download tiles even when cached
    pub force_refresh: bool,
}

impl StitchRequest {
    /// Request the full-resolution level using cached tiles where present.
    pub fn new(source: SourceLocation, metadata: PyramidMetadata) -> Self {
        Self {
            source,
            metadata,
            level: None,
            tile_format: None,
            force_refresh: false,
        }
    }

    pub fn with_level(mut self, level: usize) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_tile_format(mut self, format: impl Into<String>) -> Self {
        self.tile_format = Some(format.into());
        self
    }

    pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// Extension used for tile URLs and cache slots.
    pub fn tile_format(&self) -> &str {
        self.tile_format.as_deref().unwrap_or(&self.metadata.format)
    }
}

// =============================================================================
// Stitch Output
// =============================================================================

/// Summary of one stitched level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchReport {
    /// Level index that was built
    pub level: usize,

    /// Canvas width in pixels
    pub width: u32,

    /// Canvas height in pixels
    pub height: u32,

    pub columns: u32,
    pub rows: u32,

    /// Total number of tiles in the level
    pub tiles: usize,

    /// Tiles served from the cache without a network call
    pub cache_hits: usize,

    /// Tiles fetched from the remote during this run
    pub downloaded: usize,
}

/// Assembled raster together with its report.
#[derive(Debug, Clone)]
pub struct StitchOutput {
    pub image: RgbaImage,
    pub report: StitchReport,
}

#[derive(Debug, Default, Clone, Copy)]
struct FetchTally {
    cache_hits: usize,
    downloaded: usize,
}

// =============================================================================
// Stitcher
// =============================================================================

/// Builds level images from a remote pyramid through the local tile cache.
///
/// # Type Parameters
///
/// * `S` - Tile source (e.g. [`HttpTileSource`])
pub struct Stitcher<S: TileSource> {
    store: TileStore<S>,
    compositor: Compositor,
    max_concurrent_fetches: usize,
    progress_interval: usize,
}

impl Stitcher<HttpTileSource> {
    /// Stitcher fetching over HTTP with the timeouts from `config`.
    pub fn http(config: &StitchConfig) -> Result<Self, SourceError> {
        let source = HttpTileSource::new(
            config.request_timeout,
            config.connect_timeout,
            &config.user_agent,
        )?;
        Ok(Self::new(source, config))
    }
}

impl<S: TileSource + 'static> Stitcher<S> {
    pub fn new(source: S, config: &StitchConfig) -> Self {
        Self::with_shared_source(Arc::new(source), config)
    }

    /// Create a stitcher with a source shared with other components.
    pub fn with_shared_source(source: Arc<S>, config: &StitchConfig) -> Self {
        Self {
            store: TileStore::with_shared_source(source, config.cache_root.clone()),
            compositor: Compositor::new(config.max_concurrent_decodes),
            max_concurrent_fetches: config.max_concurrent_fetches.max(1),
            progress_interval: config.progress_interval,
        }
    }

    pub fn store(&self) -> &TileStore<S> {
        &self.store
    }

    pub fn source(&self) -> &Arc<S> {
        self.store.source()
    }

    /// Fetch and composite one level.
    ///
    /// Any fatal error aborts the level; no partial raster is returned.
    /// Cancelling `cancel` aborts in-flight fetches and yields
    /// [`FetchError::Cancelled`].
    pub async fn stitch(
        &self,
        request: &StitchRequest,
        cancel: &CancellationToken,
    ) -> Result<StitchOutput, PyramidError> {
        let pyramid = Pyramid::new(request.metadata.clone())?;
        let level_index = request.level.unwrap_or_else(|| pyramid.max_level());
        let grid = pyramid.grid(level_index)?;
        let level = grid.level();
        let format = request.tile_format();
        level.check_canvas()?;

        info!(
            pyramid = %request.source.name,
            level = level_index,
            width = level.width,
            height = level.height,
            columns = grid.columns(),
            rows = grid.rows(),
            force_refresh = request.force_refresh,
            "Stitching level"
        );

        let tally = self.fetch_level(&grid, request, format, cancel).await?;

        let namespace = Arc::new(self.store.namespace(&request.source, format));
        let addresses: Vec<_> = grid.addresses().collect();

        let image = match self.compositor.compose(&grid, &addresses, namespace).await {
            Ok(image) => image,
            Err(PyramidError::Decode {
                address,
                path,
                message,
            }) => {
                if let Err(e) = self.store.invalidate(address, &request.source, format).await {
                    warn!(tile = %address, error = %e, "Failed to invalidate corrupt tile");
                }
                return Err(PyramidError::Decode {
                    address,
                    path,
                    message,
                });
            }
            Err(e) => return Err(e),
        };

        let report = StitchReport {
            level: level_index,
            width: level.width,
            height: level.height,
            columns: grid.columns(),
            rows: grid.rows(),
            tiles: grid.tile_count(),
            cache_hits: tally.cache_hits,
            downloaded: tally.downloaded,
        };

        info!(
            pyramid = %request.source.name,
            level = level_index,
            tiles = report.tiles,
            cache_hits = report.cache_hits,
            downloaded = report.downloaded,
            "Level stitched"
        );

        Ok(StitchOutput { image, report })
    }

    /// Ensure every tile of `grid` is cached.
    ///
    /// Fetches are spawned only while the window has room. The first failure
    /// cancels a child of `cancel`, stops spawning, and is returned once the
    /// in-flight fetches have drained.
    async fn fetch_level(
        &self,
        grid: &TileGrid,
        request: &StitchRequest,
        format: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchTally, PyramidError> {
        let token = cancel.child_token();
        let total = grid.tile_count();
        let mut pending = grid.addresses();
        let mut fetches: JoinSet<Result<EnsureOutcome, FetchError>> = JoinSet::new();
        let mut first_error: Option<PyramidError> = None;
        let mut tally = FetchTally::default();

        loop {
            while first_error.is_none() && fetches.len() < self.max_concurrent_fetches {
                let Some(address) = pending.next() else {
                    break;
                };
                if token.is_cancelled() {
                    first_error = Some(FetchError::Cancelled { address }.into());
                    break;
                }

                let store = self.store.clone();
                let location = request.source.clone();
                let format = format.to_string();
                let force_refresh = request.force_refresh;
                let token = token.clone();

                fetches.spawn(async move {
                    store
                        .ensure_cancellable(address, &location, &format, force_refresh, &token)
                        .await
                });
            }

            let Some(joined) = fetches.join_next().await else {
                break;
            };

            match joined {
                Ok(Ok(outcome)) => {
                    if outcome.from_cache {
                        tally.cache_hits += 1;
                    } else {
                        tally.downloaded += 1;
                    }

                    let completed = tally.cache_hits + tally.downloaded;
                    if self.progress_interval > 0
                        && completed % self.progress_interval == 0
                        && completed < total
                    {
                        info!(
                            pyramid = %request.source.name,
                            completed,
                            total,
                            cache_hits = tally.cache_hits,
                            downloaded = tally.downloaded,
                            "Fetch progress"
                        );
                    }
                }
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        if e.is_cancelled() {
                            debug!(tile = %e.address(), "Fetch cancelled");
                        } else {
                            warn!(tile = %e.address(), error = %e, "Tile fetch failed, aborting level");
                        }
                        token.cancel();
                        first_error = Some(e.into());
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        warn!(error = %e, "Fetch task failed, aborting level");
                        token.cancel();
                        first_error = Some(PyramidError::Worker(e.to_string()));
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(tally),
        }
    }
}
