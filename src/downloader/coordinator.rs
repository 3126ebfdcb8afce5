use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::checksum;
use crate::config::{DownloadTask, DownloaderConfig};
use crate::downloader::assemble::{self, cleanup_chunk_dir, discard};
use crate::downloader::executor::{self, ChunkJobs, ChunkManifest};
use crate::downloader::fetcher::RangeFetcher;
use crate::downloader::planer::Planer;
use crate::downloader::probe::{self, ResourceInfo};
use crate::downloader::single;
use crate::error::{ChunkError, DownloadError, Result};
use crate::http::{HttpSource, ReqwestSource};
use crate::metadata::DownloadMetadata;
use crate::progress::ProgressState;
use crate::utils::multierr::MultiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Planning,
    Fetching,
    Reassembling,
    Verifying,
    Done,
    Failed,
}

impl DownloadPhase {
    /// Legal moves. `Planning -> Verifying` is the hand-off from the single-stream
    /// path, `Fetching -> Verifying` the switch to it when ranges turn out to be ignored.
    pub fn can_advance_to(self, next: DownloadPhase) -> bool {
        use DownloadPhase::*;
        matches!(
            (self, next),
            (Planning, Fetching)
                | (Planning, Verifying)
                | (Fetching, Verifying)
                | (Fetching, Reassembling)
                | (Reassembling, Verifying)
                | (Verifying, Done)
        ) || (next == Failed && !matches!(self, Done | Failed))
    }
}

/// Which path produced the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Chunked { chunks: usize },
    SingleStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub metadata: DownloadMetadata,
    pub strategy: Strategy,
    pub phases: Vec<DownloadPhase>,
}

struct PhaseTracker {
    history: Vec<DownloadPhase>,
}

impl PhaseTracker {
    fn new() -> Self {
        PhaseTracker {
            history: vec![DownloadPhase::Planning],
        }
    }

    fn current(&self) -> DownloadPhase {
        *self.history.last().unwrap_or(&DownloadPhase::Planning)
    }

    fn advance(&mut self, next: DownloadPhase) {
        debug_assert!(
            self.current().can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.current(),
            next
        );
        info!(from = ?self.current(), to = ?next, "download phase");
        self.history.push(next);
    }
}

/// Drives one download from probe to metadata sidecar.
pub struct Downloader<S> {
    source: Arc<S>,
    config: DownloaderConfig,
}

impl Downloader<ReqwestSource> {
    pub fn with_config(config: DownloaderConfig) -> Result<Self> {
        let source = Arc::new(ReqwestSource::new(&config)?);
        Downloader::new(source, config)
    }
}

impl<S: HttpSource> Downloader<S> {
    pub fn new(source: Arc<S>, config: DownloaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Downloader { source, config })
    }

    /// Download `task` to its destination and write `<destination>.json`.
    ///
    /// On failure nothing is placed at the destination. Chunk sinks of a failed
    /// chunked fetch are kept for diagnostics and for `resume`.
    pub async fn download(&self, task: &DownloadTask, progress: Arc<ProgressState>) -> Result<DownloadReport> {
        let mut phases = PhaseTracker::new();
        match self.run(task, progress, &mut phases).await {
            Ok((metadata, strategy)) => {
                phases.advance(DownloadPhase::Done);
                Ok(DownloadReport {
                    metadata,
                    strategy,
                    phases: phases.history,
                })
            }
            Err(err) => {
                phases.advance(DownloadPhase::Failed);
                error!(url = %task.url, error = %err, "download failed");
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        task: &DownloadTask,
        progress: Arc<ProgressState>,
        phases: &mut PhaseTracker,
    ) -> Result<(DownloadMetadata, Strategy)> {
        let info = probe::probe(&*self.source, &task.url).await?;
        progress.reset(info.total_size);

        if let Some(parent) = task.destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io("create destination directory", parent, e))?;
        }

        let staging = task.staging_path();
        let fetcher = Arc::new(
            RangeFetcher::new(
                Arc::clone(&self.source),
                self.config.retry.clone(),
                self.config.buffer_size,
            )
            .with_idle_timeout(self.config.range_timeout),
        );

        let concurrency = task.concurrency.max(1);
        let strategy = if !info.supports_ranges || concurrency == 1 || info.total_size == 0 {
            single::fetch_single(&fetcher, &task.url, &info, &staging, &progress).await?;
            Strategy::SingleStream
        } else {
            phases.advance(DownloadPhase::Fetching);
            match self
                .fetch_chunked(task, &info, Arc::clone(&fetcher), &progress, &staging, phases)
                .await?
            {
                Some(chunks) => Strategy::Chunked { chunks },
                None => {
                    warn!(url = %task.url, "server ignores Range requests, switching to a single stream");
                    cleanup_chunk_dir(&task.chunk_dir()).await;
                    progress.reset(info.total_size);
                    single::fetch_single(&fetcher, &task.url, &info, &staging, &progress).await?;
                    Strategy::SingleStream
                }
            }
        };

        phases.advance(DownloadPhase::Verifying);
        let digest = match checksum::verify_file(
            &staging,
            task.expected_sha256.as_deref(),
            self.config.digest_buffer_size,
        )
        .await
        {
            Ok(digest) => digest,
            Err(err) => {
                discard(&staging).await;
                return Err(err);
            }
        };

        assemble::commit(&staging, &task.destination).await?;
        let size = file_size(&task.destination).await?;

        let metadata = DownloadMetadata {
            url: task.url.clone(),
            file: task.destination.display().to_string(),
            size,
            sha256: digest,
        };
        metadata.write_sidecar(&task.metadata_path()).await?;
        info!(file = %metadata.file, size, sha256 = %metadata.sha256, "saved");
        Ok((metadata, strategy))
    }

    /// `Ok(None)` when the server answered a ranged GET with the whole resource.
    async fn fetch_chunked(
        &self,
        task: &DownloadTask,
        info: &ResourceInfo,
        fetcher: Arc<RangeFetcher<S>>,
        progress: &Arc<ProgressState>,
        staging: &Path,
        phases: &mut PhaseTracker,
    ) -> Result<Option<usize>> {
        let ranges = Planer::new(self.config.chunk_size).plan(info.total_size);
        let chunk_dir = task.chunk_dir();
        let manifest = ChunkManifest {
            url: task.url.clone(),
            total_size: info.total_size,
            chunk_size: self.config.chunk_size,
            validator: info.validator.clone(),
        };
        executor::prepare_chunk_dir(&chunk_dir, &manifest, task.resume).await?;
        info!(chunks = ranges.len(), workers = task.concurrency, "chunked download");

        let jobs = ChunkJobs {
            fetcher: Arc::clone(&fetcher),
            url: Arc::from(task.url.as_str()),
            chunk_dir: chunk_dir.clone(),
            progress: Arc::clone(progress),
            resume: task.resume,
        };
        let results = executor::execute_chunks(jobs, &ranges, task.concurrency).await?;
        if fetcher.ranges_ignored() {
            return Ok(None);
        }

        let mut failures: Vec<ChunkError> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                r.error.clone().unwrap_or_else(|| ChunkError {
                    index: r.index,
                    attempts: 0,
                    reason: "no result".into(),
                })
            })
            .collect();
        failures.sort_by_key(|e| e.index);
        if let Some(errs) = MultiError::from_failures(failures) {
            return Err(DownloadError::ChunkFetchExhausted(errs));
        }

        let written: u64 = results.iter().map(|r| r.bytes_written).sum();
        if results.len() != ranges.len() || written != info.total_size {
            return Err(DownloadError::SizeMismatch {
                expected: info.total_size,
                actual: written,
                chunk: None,
            });
        }

        phases.advance(DownloadPhase::Reassembling);
        assemble::reassemble(&ranges, &chunk_dir, staging).await?;
        cleanup_chunk_dir(&chunk_dir).await;
        Ok(Some(ranges.len()))
    }
}

async fn file_size(path: &Path) -> Result<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| DownloadError::io("stat download", path, e))
}
