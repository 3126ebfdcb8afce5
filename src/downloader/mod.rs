pub mod assemble;
pub mod coordinator;
pub mod executor;
pub mod fetcher;
pub mod planer;
pub mod probe;
pub mod single;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

pub use coordinator::{DownloadPhase, DownloadReport, Downloader, Strategy};

use crate::config::{DownloadTask, DownloaderConfig};
use crate::error::Result;
use crate::progress::ProgressState;

/// Download `task` over the network with the given configuration.
pub async fn download(
    task: &DownloadTask,
    config: DownloaderConfig,
    progress: Arc<ProgressState>,
) -> Result<DownloadReport> {
    let downloader = Downloader::with_config(config)?;
    downloader.download(task, progress).await
}
