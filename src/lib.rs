//! Fetch one HTTP(S) resource into a local file using concurrent byte-range
//! requests, with ordered reassembly, SHA-256 verification and a JSON sidecar.
//!
//! The pipeline: [`downloader::probe`] learns the size and range support,
//! [`downloader::planer`] tiles the size into fixed chunks, a
//! [`utils::worker_pool::WorkerPool`] runs [`downloader::fetcher::RangeFetcher`]
//! for each chunk, [`downloader::assemble`] concatenates the sinks in index
//! order and places the result atomically, and [`checksum`] verifies it.
//! Servers without range support go through [`downloader::single`].

pub mod checksum;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod metadata;
pub mod progress;
pub mod utils;

pub use config::{DownloadTask, DownloaderConfig, RetryPolicy};
pub use downloader::{DownloadPhase, DownloadReport, Downloader, Strategy, download};
pub use error::{DownloadError, Result};
pub use metadata::DownloadMetadata;
pub use progress::{ProgressSnapshot, ProgressState};
