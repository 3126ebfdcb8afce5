use std::path::Path;

use tracing::info;

use crate::downloader::assemble::discard;
use crate::downloader::fetcher::RangeFetcher;
use crate::downloader::probe::ResourceInfo;
use crate::error::{DownloadError, Result};
use crate::http::HttpSource;
use crate::progress::ProgressState;
use crate::utils::multierr::MultiError;

/// Sequential whole-resource download into `staging`.
///
/// Used when the server does not take ranges, the size is unknown, or only one
/// worker was requested. Returns the number of bytes written.
pub async fn fetch_single<S: HttpSource>(
    fetcher: &RangeFetcher<S>,
    url: &str,
    info: &ResourceInfo,
    staging: &Path,
    progress: &ProgressState,
) -> Result<u64> {
    info!(url, total_size = info.total_size, "single stream download");
    let expected = (info.total_size > 0).then_some(info.total_size);

    let result = match fetcher.fetch_whole(url, expected, staging, progress).await {
        Ok(result) => result,
        Err(e) => {
            discard(staging).await;
            return Err(e);
        }
    };

    if let Some(err) = result.error {
        discard(staging).await;
        return Err(DownloadError::ChunkFetchExhausted(MultiError::new(vec![err])));
    }

    if let Some(expected) = expected {
        if result.bytes_written != expected {
            discard(staging).await;
            return Err(DownloadError::SizeMismatch {
                expected,
                actual: result.bytes_written,
                chunk: None,
            });
        }
    }
    Ok(result.bytes_written)
}
