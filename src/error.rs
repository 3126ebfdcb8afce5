//! Error types for chunkdl.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::utils::multierr::MultiError;

pub type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("resource unavailable at {url}: {reason}")]
    ResourceUnavailable { url: String, reason: String },

    #[error("chunk fetch exhausted: {0}")]
    ChunkFetchExhausted(MultiError<ChunkError>),

    #[error("size mismatch{}: expected {expected} bytes, got {actual}", chunk_label(.chunk))]
    SizeMismatch {
        expected: u64,
        actual: u64,
        chunk: Option<usize>,
    },

    #[error("sha256 mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("{context} ({}): {source}", .path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("download worker panicked: {0}")]
    WorkerPanicked(String),
}

fn chunk_label(chunk: &Option<usize>) -> String {
    match chunk {
        Some(index) => format!(" in chunk {index}"),
        None => String::new(),
    }
}

impl DownloadError {
    pub(crate) fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        DownloadError::Io {
            context,
            path: path.into(),
            source,
        }
    }

    /// Indices of the chunks that exhausted their retries, if that is what failed.
    pub fn failed_chunks(&self) -> Vec<usize> {
        match self {
            DownloadError::ChunkFetchExhausted(errs) => errs.errors().iter().map(|e| e.index).collect(),
            _ => Vec::new(),
        }
    }
}

/// Why a single chunk gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("chunk {index} failed after {attempts} attempt(s): {reason}")]
pub struct ChunkError {
    pub index: usize,
    pub attempts: u32,
    pub reason: String,
}

/// Failure of one HTTP exchange. Only ever seen inside the fetch retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("server ignored the Range header")]
    RangeIgnored,

    #[error("body ended after {received} of {expected} bytes")]
    ShortBody { expected: u64, received: u64 },

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Status(code) => is_retryable_status(*code),
            TransportError::RangeIgnored => false,
            _ => true,
        }
    }
}

/// 5xx plus 408 and 429 are transient; every other client error is permanent.
pub fn is_retryable_status(code: u16) -> bool {
    code >= 500 || code == 408 || code == 429
}
