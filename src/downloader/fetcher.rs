use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::downloader::planer::ChunkRange;
use crate::error::{ChunkError, DownloadError, Result, TransportError};
use crate::http::{BodyStream, HttpSource};
use crate::progress::ProgressState;

/// Outcome of one chunk after its retries settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub index: usize,
    pub bytes_written: u64,
    pub success: bool,
    pub error: Option<ChunkError>,
}

impl ChunkResult {
    pub(crate) fn ok(index: usize, bytes_written: u64) -> Self {
        ChunkResult {
            index,
            bytes_written,
            success: true,
            error: None,
        }
    }

    pub(crate) fn failed(index: usize, attempts: u32, reason: String) -> Self {
        ChunkResult {
            index,
            bytes_written: 0,
            success: false,
            error: Some(ChunkError {
                index,
                attempts,
                reason,
            }),
        }
    }
}

/// A failed attempt is either worth retrying (transport) or fatal (local disk).
#[derive(Debug)]
pub(crate) enum AttemptError {
    Transport(TransportError),
    Local(DownloadError),
}

impl From<TransportError> for AttemptError {
    fn from(e: TransportError) -> Self {
        AttemptError::Transport(e)
    }
}

impl From<DownloadError> for AttemptError {
    fn from(e: DownloadError) -> Self {
        AttemptError::Local(e)
    }
}

/// Fetches one byte range into its own sink file, retrying transient failures.
pub struct RangeFetcher<S> {
    source: Arc<S>,
    retry: RetryPolicy,
    buffer_size: usize,
    idle_timeout: Option<Duration>,
    ranges_ignored: AtomicBool,
}

impl<S: HttpSource> RangeFetcher<S> {
    pub fn new(source: Arc<S>, retry: RetryPolicy, buffer_size: usize) -> Self {
        RangeFetcher {
            source,
            retry,
            buffer_size,
            idle_timeout: None,
            ranges_ignored: AtomicBool::new(false),
        }
    }

    /// Fail an attempt when the response or the next body piece takes longer than `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Set once any ranged GET came back as a plain 200.
    pub fn ranges_ignored(&self) -> bool {
        self.ranges_ignored.load(Ordering::Acquire)
    }

    /// Exhausted retries come back as an unsuccessful [`ChunkResult`];
    /// only local I/O failures are returned as `Err`.
    ///
    /// A 200 reply means the server sends the whole resource for every range.
    /// The body is dropped unread and the chunk fails without retrying, leaving
    /// the whole-resource path to [`RangeFetcher::fetch_whole`].
    pub async fn fetch(
        &self,
        url: &str,
        range: &ChunkRange,
        sink: &Path,
        progress: &ProgressState,
    ) -> Result<ChunkResult> {
        self.run(url, Target::Range(*range), sink, progress).await
    }

    /// Rangeless GET of the whole resource, reported as chunk 0.
    /// `expected_size` turns an early end of body into a retryable failure.
    pub async fn fetch_whole(
        &self,
        url: &str,
        expected_size: Option<u64>,
        sink: &Path,
        progress: &ProgressState,
    ) -> Result<ChunkResult> {
        self.run(url, Target::Whole { expected_size }, sink, progress).await
    }

    async fn run(
        &self,
        url: &str,
        target: Target,
        sink: &Path,
        progress: &ProgressState,
    ) -> Result<ChunkResult> {
        let index = target.index();
        // bytes already credited to progress; retries only add beyond this mark
        let mut reported = 0u64;
        let mut attempts = 0;
        let mut last_err = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay(attempt - 1)).await;
            }
            attempts = attempt + 1;

            match self.attempt(url, &target, sink, progress, &mut reported).await {
                Ok(written) => {
                    debug!(chunk = index, attempt = attempts, written, "chunk fetched");
                    return Ok(ChunkResult::ok(index, written));
                }
                Err(AttemptError::Local(e)) => return Err(e),
                Err(AttemptError::Transport(e)) => {
                    warn!(chunk = index, attempt = attempts, error = %e, "chunk attempt failed");
                    let retryable = e.is_retryable();
                    last_err = Some(e);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let reason = last_err.map_or_else(|| "no attempt made".to_string(), |e| e.to_string());
        Ok(ChunkResult::failed(index, attempts, reason))
    }

    async fn attempt(
        &self,
        url: &str,
        target: &Target,
        sink: &Path,
        progress: &ProgressState,
        reported: &mut u64,
    ) -> std::result::Result<u64, AttemptError> {
        // recreate so a failed attempt never leaves stale bytes behind
        let mut file = tokio::fs::File::create(sink)
            .await
            .map_err(|e| DownloadError::io("create chunk sink", sink, e))?;

        let response = self.within(self.source.get(url, target.range())).await??;
        let (limit, expected) = match (target, response.status) {
            (Target::Range(range), 206) => (Some(range.len()), Some(range.len())),
            (Target::Range(_), 200) => {
                self.ranges_ignored.store(true, Ordering::Release);
                return Err(TransportError::RangeIgnored.into());
            }
            (Target::Whole { expected_size }, 200) => (None, *expected_size),
            (_, status) => return Err(TransportError::Status(status).into()),
        };

        let written = self
            .drain(response.body, &mut file, sink, limit, |total| {
                if total > *reported {
                    progress.add(total - *reported);
                    *reported = total;
                }
            })
            .await?;

        if let Some(expected) = expected {
            if written < expected {
                return Err(TransportError::ShortBody {
                    expected,
                    received: written,
                }
                .into());
            }
        }
        Ok(written)
    }

    /// Copy at most `limit` bytes of `body` into `file` in `buffer_size` increments.
    /// `on_written` sees the running total after every increment.
    async fn drain(
        &self,
        mut body: BodyStream,
        file: &mut tokio::fs::File,
        path: &Path,
        limit: Option<u64>,
        mut on_written: impl FnMut(u64),
    ) -> std::result::Result<u64, AttemptError> {
        let mut written = 0u64;

        while let Some(chunk) = self.within(body.next()).await? {
            let chunk = chunk?;
            let mut data = &chunk[..];
            if let Some(limit) = limit {
                let room = (limit - written).min(data.len() as u64) as usize;
                data = &data[..room];
            }

            for piece in data.chunks(self.buffer_size.max(1)) {
                file.write_all(piece)
                    .await
                    .map_err(|e| DownloadError::io("write sink", path, e))?;
                written += piece.len() as u64;
                on_written(written);
            }

            if limit.is_some_and(|limit| written >= limit) {
                break;
            }
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io("flush sink", path, e))?;
        Ok(written)
    }

    async fn within<F: Future>(&self, fut: F) -> std::result::Result<F::Output, TransportError> {
        match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| TransportError::Timeout),
            None => Ok(fut.await),
        }
    }
}

enum Target {
    Range(ChunkRange),
    Whole { expected_size: Option<u64> },
}

impl Target {
    fn index(&self) -> usize {
        match self {
            Target::Range(range) => range.index,
            Target::Whole { .. } => 0,
        }
    }

    fn range(&self) -> Option<&ChunkRange> {
        match self {
            Target::Range(range) => Some(range),
            Target::Whole { .. } => None,
        }
    }
}
