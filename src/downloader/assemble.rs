//! Ordered concatenation of chunk sinks and atomic placement.

use std::io::ErrorKind;
use std::path::Path;

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::downloader::executor::sink_path;
use crate::downloader::planer::ChunkRange;
use crate::error::{DownloadError, Result};

/// Concatenate every chunk sink into `staging` in ascending index order.
///
/// Each sink must hold exactly its range's byte count. On failure the staged
/// file is removed and the sinks are left in place.
pub async fn reassemble(ranges: &[ChunkRange], chunk_dir: &Path, staging: &Path) -> Result<u64> {
    match concat(ranges, chunk_dir, staging).await {
        Ok(total) => Ok(total),
        Err(err) => {
            discard(staging).await;
            Err(err)
        }
    }
}

async fn concat(ranges: &[ChunkRange], chunk_dir: &Path, staging: &Path) -> Result<u64> {
    let mut ordered = ranges.to_vec();
    ordered.sort_by_key(|r| r.index);

    let mut out = tokio::fs::File::create(staging)
        .await
        .map_err(|e| DownloadError::io("create staging file", staging, e))?;

    let mut total = 0u64;
    for range in &ordered {
        let sink = sink_path(chunk_dir, range);
        let mut part = tokio::fs::File::open(&sink)
            .await
            .map_err(|e| DownloadError::io("open chunk sink", &sink, e))?;
        let copied = tokio::io::copy(&mut part, &mut out)
            .await
            .map_err(|e| DownloadError::io("append chunk", staging, e))?;
        if copied != range.len() {
            return Err(DownloadError::SizeMismatch {
                expected: range.len(),
                actual: copied,
                chunk: Some(range.index),
            });
        }
        total += copied;
    }

    out.flush()
        .await
        .map_err(|e| DownloadError::io("flush staging file", staging, e))?;
    out.sync_all()
        .await
        .map_err(|e| DownloadError::io("sync staging file", staging, e))?;
    debug!(chunks = ordered.len(), bytes = total, "reassembled");
    Ok(total)
}

/// Rename the staged file onto the destination, replacing any previous file.
pub async fn commit(staging: &Path, destination: &Path) -> Result<()> {
    tokio::fs::rename(staging, destination)
        .await
        .map_err(|e| DownloadError::io("place download", destination, e))
}

/// Best-effort removal of a transient file.
pub async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove transient file"),
    }
}

/// Best-effort removal of the chunk sink directory.
pub async fn cleanup_chunk_dir(chunk_dir: &Path) {
    match tokio::fs::remove_dir_all(chunk_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %chunk_dir.display(), error = %e, "could not remove chunk sinks"),
    }
}
