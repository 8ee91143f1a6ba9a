use std::path::PathBuf;
use std::time::Duration;

use crate::assemble::DEFAULT_DECODE_CONCURRENCY;
use crate::fetch::DEFAULT_USER_AGENT;

/// Default number of tile fetches in flight.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 8;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of completed fetches between progress log lines.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

/// Name of the cache directory created under the system temp directory.
pub const CACHE_DIR_NAME: &str = "pyramid-stitcher";

/// Engine configuration.
///
/// Passed explicitly to [`Stitcher`](super::Stitcher); there is no global
/// cache location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StitchConfig {
    /// Directory holding every cached tile
    pub cache_root: PathBuf,

    /// Maximum tile fetches in flight for one level
    pub max_concurrent_fetches: usize,

    /// Maximum tiles decoded in parallel during composition
    pub max_concurrent_decodes: usize,

    /// Timeout for a whole tile request
    pub request_timeout: Duration,

    /// Timeout for establishing a connection
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Log progress every this many completed fetches (0 disables)
    pub progress_interval: usize,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            max_concurrent_decodes: DEFAULT_DECODE_CONCURRENCY,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl StitchConfig {
    /// Default configuration caching under `cache_root`.
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
            ..Default::default()
        }
    }

    pub fn with_max_concurrent_fetches(mut self, n: usize) -> Self {
        self.max_concurrent_fetches = n;
        self
    }

    pub fn with_max_concurrent_decodes(mut self, n: usize) -> Self {
        self.max_concurrent_decodes = n;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_root.as_os_str().is_empty() {
            return Err("cache root must not be empty".to_string());
        }
        if self.max_concurrent_fetches == 0 {
            return Err("max_concurrent_fetches must be at least 1".to_string());
        }
        if self.max_concurrent_decodes == 0 {
            return Err("max_concurrent_decodes must be at least 1".to_string());
        }
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be positive".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be positive".to_string());
        }
        Ok(())
    }
}

/// `{system temp}/pyramid-stitcher`.
pub fn default_cache_root() -> PathBuf {
    std::env::temp_dir().join(CACHE_DIR_NAME)
}
