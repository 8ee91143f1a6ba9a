//! On-disk tile cache.
//!
//! Every tile lives in its own file under a per-source namespace:
//!
//! ```text
//! {cache_root}/{source_key}/{level}/{column}_{row}.{format}
//! ```
//!
//! `source_key` combines a readable form of the pyramid name with a short
//! SHA-256 digest of its base URL, so the path is reproducible across runs and
//! two hosts never share slots.
//!
//! # Write Protocol
//!
//! Fetched bytes are written to a hidden sibling file and renamed over the
//! slot. A crash mid-write leaves at most a stray `.part` file, never a
//! truncated slot. Slots are not mutated afterwards except by a force-refresh
//! overwrite.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FetchError;
use crate::pyramid::TileAddress;

use super::source::TileSource;

/// Number of hex digits of the base URL digest kept in the source key.
const SOURCE_DIGEST_LEN: usize = 12;

static PART_COUNTER: AtomicU64 = AtomicU64::new(0);

// =============================================================================
// Source Location
// =============================================================================

/// Remote base path of one pyramid instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Human-readable pyramid name (e.g. the scene folder name)
    pub name: String,

    /// Base URL the level directories hang off
    pub base_url: String,
}

impl SourceLocation {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
        }
    }

    /// Stable directory name identifying this source in the cache.
    pub fn cache_key(&self) -> String {
        let digest = hex::encode(Sha256::digest(self.base_url.as_bytes()));
        format!("{}-{}", sanitize(&self.name), &digest[..SOURCE_DIGEST_LEN])
    }
}

/// Build the remote URL of a tile. Levels are 1-indexed on the remote.
pub fn tile_url(base_url: &str, address: &TileAddress, format: &str) -> String {
    format!(
        "{}/{}/{}_{}.{}",
        base_url.trim_end_matches('/'),
        address.remote_level(),
        address.column,
        address.row,
        format
    )
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim_matches('/')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "pyramid".to_string()
    } else {
        cleaned.to_string()
    }
}

// =============================================================================
// Cache Namespace
// =============================================================================

/// Maps a tile address to its local cache path.
pub trait SlotResolver: Send + Sync {
    fn slot_path(&self, address: &TileAddress) -> PathBuf;
}

/// Cache slots of one source and tile format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    directory: PathBuf,
    format: String,
}

impl CacheNamespace {
    pub fn new(root: &Path, location: &SourceLocation, format: &str) -> Self {
        Self {
            directory: root.join(location.cache_key()),
            format: format.to_string(),
        }
    }

    /// Directory holding every level of this source.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn format(&self) -> &str {
        &self.format
    }
}

impl SlotResolver for CacheNamespace {
    fn slot_path(&self, address: &TileAddress) -> PathBuf {
        self.directory
            .join(address.level.to_string())
            .join(format!("{}_{}.{}", address.column, address.row, self.format))
    }
}

// =============================================================================
// Tile Store
// =============================================================================

/// Result of [`TileStore::ensure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureOutcome {
    /// Local path holding the tile bytes
    pub path: PathBuf,

    /// Whether the slot was already populated (no network call was made)
    pub from_cache: bool,
}

/// Cache-aware tile fetcher.
///
/// Cheap to clone; clones share the same source.
pub struct TileStore<S: TileSource> {
    source: Arc<S>,
    root: PathBuf,
}

impl<S: TileSource> Clone for TileStore<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            root: self.root.clone(),
        }
    }
}

impl<S: TileSource> TileStore<S> {
    /// Create a store caching under `root`.
    pub fn new(source: S, root: impl Into<PathBuf>) -> Self {
        Self::with_shared_source(Arc::new(source), root)
    }

    /// Create a store with a source shared with other components.
    pub fn with_shared_source(source: Arc<S>, root: impl Into<PathBuf>) -> Self {
        Self {
            source,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    /// Slot layout for `location` and `format`.
    pub fn namespace(&self, location: &SourceLocation, format: &str) -> CacheNamespace {
        CacheNamespace::new(&self.root, location, format)
    }

    /// Make sure the tile at `address` is present in the cache.
    ///
    /// Returns the existing slot without any network call unless
    /// `force_refresh` is set. Otherwise performs exactly one GET and
    /// atomically replaces the slot with the response body.
    pub async fn ensure(
        &self,
        address: TileAddress,
        location: &SourceLocation,
        format: &str,
        force_refresh: bool,
    ) -> Result<EnsureOutcome, FetchError> {
        self.ensure_cancellable(
            address,
            location,
            format,
            force_refresh,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`ensure`](Self::ensure), aborting the request when `cancel` fires.
    pub async fn ensure_cancellable(
        &self,
        address: TileAddress,
        location: &SourceLocation,
        format: &str,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<EnsureOutcome, FetchError> {
        let path = self.namespace(location, format).slot_path(&address);

        if !force_refresh && slot_is_populated(&path).await {
            debug!(tile = %address, path = %path.display(), "Tile cache hit");
            return Ok(EnsureOutcome {
                path,
                from_cache: true,
            });
        }

        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled { address });
        }

        let url = tile_url(&location.base_url, &address, format);

        let data = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled { address });
            }

            result = self.source.get(&url) => {
                result.map_err(|e| FetchError::from_source(address, &url, e))?
            }
        };

        write_atomic(&path, &data)
            .await
            .map_err(|e| FetchError::Cache {
                address,
                path: path.clone(),
                message: e.to_string(),
            })?;

        debug!(
            tile = %address,
            url = %url,
            bytes = data.len(),
            refreshed = force_refresh,
            "Tile fetched"
        );

        Ok(EnsureOutcome {
            path,
            from_cache: false,
        })
    }

    /// Delete the cached slot for `address`.
    ///
    /// Returns `true` if a file was removed. Missing slots are not an error.
    pub async fn invalidate(
        &self,
        address: TileAddress,
        location: &SourceLocation,
        format: &str,
    ) -> Result<bool, FetchError> {
        let path = self.namespace(location, format).slot_path(&address);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(tile = %address, path = %path.display(), "Tile slot invalidated");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FetchError::Cache {
                address,
                path,
                message: e.to_string(),
            }),
        }
    }
}

async fn slot_is_populated(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn part_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = PART_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}-{}.part", name, std::process::id(), seq))
}

async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let part = part_path(path);
    let result = async {
        let mut file = fs::File::create(&part).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&part, path).await
    }
    .await;

    if result.is_err() {
        let _ = fs::remove_file(&part).await;
    }
    result
}

// =============================================================================
// Tests
// =============================================================================
