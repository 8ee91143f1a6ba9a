use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use crate::error::SourceError;

/// Default User-Agent sent with tile requests.
pub const DEFAULT_USER_AGENT: &str = concat!("pyramid-stitcher/", env!("CARGO_PKG_VERSION"));

/// Trait for retrieving raw tile bytes from a remote location.
///
/// This abstraction keeps the cache and scheduler independent of the HTTP
/// client so they can be exercised against in-memory sources. Implementations
/// must be thread-safe.
#[async_trait]
pub trait TileSource: Send + Sync {
    /// Fetch the full body at `url`.
    ///
    /// Non-success responses must be reported as [`SourceError::Status`].
    async fn get(&self, url: &str) -> Result<Bytes, SourceError>;
}

/// HTTP-backed implementation of [`TileSource`].
#[derive(Debug, Clone)]
pub struct HttpTileSource {
    client: Client,
}

impl HttpTileSource {
    /// Build a client with the given per-request and connect timeouts.
    pub fn new(
        request_timeout: Duration,
        connect_timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| SourceError::Connection(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// The underlying client, shared for non-tile requests such as the scene document.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl TileSource for HttpTileSource {
    async fn get(&self, url: &str) -> Result<Bytes, SourceError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        response.bytes().await.map_err(map_reqwest_error)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else {
        SourceError::Connection(err.to_string())
    }
}
