//! Task descriptor and tunables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DownloadError, Result};

pub const DEFAULT_CHUNK_SIZE: u64 = 1024 * 1024;
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;
pub const DEFAULT_DIGEST_BUFFER_SIZE: usize = 1024 * 1024;
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const USER_AGENT: &str = concat!("chunkdl/", env!("CARGO_PKG_VERSION"));

/// What to download and where. Built once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    pub concurrency: usize,
    pub expected_sha256: Option<String>,
    /// Reuse complete chunk sinks left behind by an earlier failed run.
    pub resume: bool,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: Option<PathBuf>) -> Self {
        let url = url.into();
        let destination = destination.unwrap_or_else(|| PathBuf::from(file_name_from_url(&url)));
        DownloadTask {
            url,
            destination,
            concurrency: DEFAULT_CONCURRENCY,
            expected_sha256: None,
            resume: false,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_expected_sha256(mut self, digest: impl Into<String>) -> Self {
        self.expected_sha256 = Some(digest.into());
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// `<destination>.part`: the staged file renamed onto the destination.
    pub fn staging_path(&self) -> PathBuf {
        with_suffix(&self.destination, ".part")
    }

    /// `<destination>.parts/`: one sink file per chunk.
    pub fn chunk_dir(&self) -> PathBuf {
        with_suffix(&self.destination, ".parts")
    }

    /// `<destination>.json`
    pub fn metadata_path(&self) -> PathBuf {
        with_suffix(&self.destination, ".json")
    }
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Last non-empty path segment of the URL, or `file`.
pub fn file_name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "file".to_string())
}

/// Bounded retry with attempt-indexed exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_factor: f64,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff_factor: 1.5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts,
            backoff_factor: 1.0,
            base_delay: Duration::ZERO,
        }
    }

    /// Wait after failed attempt `attempt` (0-based): `base_delay * factor^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Knobs shared by every download run by one `Downloader`.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub chunk_size: u64,
    pub buffer_size: usize,
    pub digest_buffer_size: usize,
    /// Longest silence tolerated while waiting for a GET's headers or its next body bytes.
    pub range_timeout: Duration,
    /// Total deadline of the HEAD probe.
    pub probe_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub retry: RetryPolicy,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        DownloaderConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            digest_buffer_size: DEFAULT_DIGEST_BUFFER_SIZE,
            range_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            user_agent: USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl DownloaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DownloadError::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.buffer_size == 0 || self.digest_buffer_size == 0 {
            return Err(DownloadError::InvalidConfig("buffer sizes must be > 0".into()));
        }
        if self.range_timeout.is_zero() || self.probe_timeout.is_zero() {
            return Err(DownloadError::InvalidConfig("timeouts must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(DownloadError::InvalidConfig("max_attempts must be >= 1".into()));
        }
        if !(self.retry.backoff_factor.is_finite() && self.retry.backoff_factor >= 1.0) {
            return Err(DownloadError::InvalidConfig("backoff_factor must be >= 1".into()));
        }
        Ok(())
    }
}
