use std::path::PathBuf;

use thiserror::Error;

use crate::pyramid::TileAddress;

/// Transport-level errors returned by a [`TileSource`](crate::fetch::TileSource).
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Remote answered with a non-success HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
}

/// Errors that can occur while ensuring a single tile is present in the cache.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Remote answered with a non-success HTTP status (e.g. 404 for a missing tile)
    #[error("Tile {address}: HTTP status {status} from {url}")]
    Status {
        address: TileAddress,
        url: String,
        status: u16,
    },

    /// Network or connection error
    #[error("Tile {address}: connection error fetching {url}: {message}")]
    Connection {
        address: TileAddress,
        url: String,
        message: String,
    },

    /// Request exceeded the configured timeout
    #[error("Tile {address}: request to {url} timed out")]
    Timeout { address: TileAddress, url: String },

    /// Local cache I/O failed (directory creation, write or rename)
    #[error("Tile {address}: cache I/O error at {}: {message}", path.display())]
    Cache {
        address: TileAddress,
        path: PathBuf,
        message: String,
    },

    /// Fetch was aborted by the shared cancellation signal
    #[error("Tile {address}: fetch cancelled")]
    Cancelled { address: TileAddress },
}

impl FetchError {
    /// Attach a tile address and URL to a transport error.
    pub fn from_source(address: TileAddress, url: &str, err: SourceError) -> Self {
        let url = url.to_string();
        match err {
            SourceError::Status(status) => FetchError::Status {
                address,
                url,
                status,
            },
            SourceError::Connection(message) => FetchError::Connection {
                address,
                url,
                message,
            },
            SourceError::Timeout => FetchError::Timeout { address, url },
        }
    }

    /// The tile this error refers to.
    pub fn address(&self) -> TileAddress {
        match self {
            FetchError::Status { address, .. }
            | FetchError::Connection { address, .. }
            | FetchError::Timeout { address, .. }
            | FetchError::Cache { address, .. }
            | FetchError::Cancelled { address } => *address,
        }
    }

    /// Whether this error was caused by cancellation rather than a real failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

/// Errors produced by the pyramid engine for one level.
#[derive(Debug, Clone, Error)]
pub enum PyramidError {
    /// Non-positive dimensions, tile size or an empty format
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Requested level does not exist in the pyramid
    #[error("Level {level} out of range: pyramid has {count} levels")]
    LevelOutOfRange { level: usize, count: usize },

    /// A tile could not be fetched into the cache
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Cached bytes are not a decodable image
    #[error("Decode error for tile {address} at {}: {message}", path.display())]
    Decode {
        address: TileAddress,
        path: PathBuf,
        message: String,
    },

    /// A tile expected in the cache is missing at composition time
    #[error("Assembly error for tile {address}: {message}")]
    Assembly {
        address: TileAddress,
        message: String,
    },

    /// A fetch or decode task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Errors loading the scene configuration document.
#[derive(Debug, Clone, Error)]
pub enum SceneError {
    /// Scene document could not be fetched
    #[error("Failed to fetch scene document {url}: {message}")]
    Http { url: String, message: String },

    /// Scene document is not valid JSON or does not match the expected shape
    #[error("Failed to parse scene document: {0}")]
    Parse(String),

    /// A view mode has neither `pageFolders` nor `pyramidFolder`
    #[error("View mode {index} has no pyramid folder")]
    MissingFolder { index: usize },

    /// Widget URL is not a valid absolute URL
    #[error("Invalid widget URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Errors writing the assembled image.
#[derive(Debug, Clone, Error)]
pub enum OutputError {
    /// Encoder rejected the image or the format is unsupported
    #[error("Encode error for {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },

    /// Output file could not be created or written
    #[error("I/O error for {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}
