//! Tile retrieval and local caching.
//!
//! - [`TileSource`]: raw byte access to a remote URL ([`HttpTileSource`] over reqwest)
//! - [`TileStore`]: cache-aware fetcher with atomic slot writes and force-refresh
//! - [`CacheNamespace`]: deterministic mapping from tile address to cache path

mod source;
mod store;

pub use source::{HttpTileSource, TileSource, DEFAULT_USER_AGENT};
pub use store::{
    tile_url, CacheNamespace, EnsureOutcome, SlotResolver, SourceLocation, TileStore,
};
