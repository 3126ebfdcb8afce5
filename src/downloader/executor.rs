use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::downloader::fetcher::{ChunkResult, RangeFetcher};
use crate::downloader::planer::ChunkRange;
use crate::error::{DownloadError, Result, TransportError};
use crate::http::HttpSource;
use crate::progress::ProgressState;
use crate::utils::worker_pool::WorkerPool;

const MANIFEST_FILE: &str = "manifest.json";

/// Sink file owned by exactly one chunk. The bounds are part of the name so a
/// sink cut for a different plan never matches.
pub fn sink_path(chunk_dir: &Path, range: &ChunkRange) -> PathBuf {
    chunk_dir.join(format!("part-{:05}-{}-{}.tmp", range.index, range.start, range.end))
}

/// What the sinks in a chunk directory were cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkManifest {
    pub url: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub validator: Option<String>,
}

async fn read_manifest(chunk_dir: &Path) -> Option<ChunkManifest> {
    let raw = tokio::fs::read(chunk_dir.join(MANIFEST_FILE)).await.ok()?;
    serde_json::from_slice(&raw).ok()
}

/// Make `chunk_dir` ready for `manifest`.
///
/// With `resume`, a directory whose manifest matches is kept as is. Anything
/// else is wiped and restarted under the new manifest.
pub async fn prepare_chunk_dir(chunk_dir: &Path, manifest: &ChunkManifest, resume: bool) -> Result<()> {
    if resume {
        match read_manifest(chunk_dir).await {
            Some(found) if &found == manifest => {
                debug!(dir = %chunk_dir.display(), "resuming from existing chunk sinks");
                return Ok(());
            }
            Some(_) => info!(dir = %chunk_dir.display(), "chunk sinks belong to another download, discarding"),
            None => {}
        }
    }

    match tokio::fs::remove_dir_all(chunk_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(DownloadError::io("clear chunk directory", chunk_dir, e)),
    }
    tokio::fs::create_dir_all(chunk_dir)
        .await
        .map_err(|e| DownloadError::io("create chunk directory", chunk_dir, e))?;

    let path = chunk_dir.join(MANIFEST_FILE);
    let body = serde_json::to_vec_pretty(manifest)
        .map_err(|e| DownloadError::io("serialize chunk manifest", &path, std::io::Error::other(e)))?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| DownloadError::io("write chunk manifest", &path, e))
}

pub struct ChunkJobs<S> {
    pub fetcher: Arc<RangeFetcher<S>>,
    pub url: Arc<str>,
    pub chunk_dir: PathBuf,
    pub progress: Arc<ProgressState>,
    /// Keep sinks that already hold the full range.
    pub resume: bool,
}

async fn reusable_sink(sink: &Path, range: &ChunkRange) -> bool {
    match tokio::fs::metadata(sink).await {
        Ok(meta) => meta.is_file() && meta.len() == range.len(),
        Err(_) => false,
    }
}

async fn execute_chunk<S: HttpSource>(jobs: &ChunkJobs<S>, range: ChunkRange) -> Result<ChunkResult> {
    // another worker already learned the server answers ranges with the whole body
    if jobs.fetcher.ranges_ignored() {
        return Ok(ChunkResult::failed(range.index, 0, TransportError::RangeIgnored.to_string()));
    }

    let sink = sink_path(&jobs.chunk_dir, &range);
    if jobs.resume && reusable_sink(&sink, &range).await {
        debug!(chunk = range.index, "reusing completed sink");
        jobs.progress.add(range.len());
        return Ok(ChunkResult::ok(range.index, range.len()));
    }
    jobs.fetcher
        .fetch(&jobs.url, &range, &sink, &jobs.progress)
        .await
}

/// Run every range through a pool of `concurrency` workers and wait for all of them.
///
/// A chunk that exhausts its retries does not stop its siblings. A local I/O
/// failure in any worker is returned once the pool has drained.
pub async fn execute_chunks<S: HttpSource>(
    jobs: ChunkJobs<S>,
    ranges: &[ChunkRange],
    concurrency: usize,
) -> Result<Vec<ChunkResult>> {
    let pool = WorkerPool::new(concurrency);
    debug!(chunks = ranges.len(), workers = pool.workers(), "dispatching chunks");

    let jobs = Arc::new(jobs);
    let outcomes = pool
        .run(ranges.to_vec(), move |range| {
            let jobs = Arc::clone(&jobs);
            async move { execute_chunk(&jobs, range).await }
        })
        .await
        .map_err(|e| DownloadError::WorkerPanicked(e.to_string()))?;

    outcomes.into_iter().collect()
}
