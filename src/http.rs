//! The HTTP capability the downloader is written against.
//!
//! [`HttpSource`] is the whole surface the pipeline needs: a metadata request
//! and a (possibly ranged) streaming GET. [`ReqwestSource`] is the production
//! implementation; tests plug in an in-memory one.

use std::future::Future;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header;

use crate::config::DownloaderConfig;
use crate::downloader::planer::ChunkRange;
use crate::error::{DownloadError, Result, TransportError};

pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

/// What a HEAD request revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadInfo {
    pub status: u16,
    pub content_length: Option<u64>,
    pub accept_ranges: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

pub struct GetResponse {
    pub status: u16,
    pub body: BodyStream,
}

pub trait HttpSource: Send + Sync + 'static {
    /// Metadata-only request, following redirects.
    fn head(
        &self,
        url: &str,
    ) -> impl Future<Output = std::result::Result<HeadInfo, TransportError>> + Send;

    /// GET, restricted to `range` when one is given.
    fn get(
        &self,
        url: &str,
        range: Option<&ChunkRange>,
    ) -> impl Future<Output = std::result::Result<GetResponse, TransportError>> + Send;
}

pub fn range_header(range: &ChunkRange) -> String {
    format!("bytes={}-{}", range.start, range.end)
}

/// `reqwest`-backed source. Redirects follow reqwest's default policy.
///
/// Body reads time out after `range_timeout` of silence, not after a total
/// deadline, so a slow but steady transfer is never cut off.
#[derive(Debug, Clone)]
pub struct ReqwestSource {
    client: reqwest::Client,
    config: DownloaderConfig,
}

impl ReqwestSource {
    pub fn new(config: &DownloaderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.range_timeout)
            .build()
            .map_err(|e| DownloadError::InvalidConfig(format!("http client: {e}")))?;
        Ok(ReqwestSource {
            client,
            config: config.clone(),
        })
    }
}

fn map_reqwest_err(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

impl HttpSource for ReqwestSource {
    async fn head(&self, url: &str) -> std::result::Result<HeadInfo, TransportError> {
        let response = self
            .client
            .head(url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let headers = response.headers();
        let content_length = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };

        Ok(HeadInfo {
            status: response.status().as_u16(),
            content_length,
            accept_ranges: text(header::ACCEPT_RANGES),
            etag: text(header::ETAG),
            last_modified: text(header::LAST_MODIFIED),
        })
    }

    async fn get(
        &self,
        url: &str,
        range: Option<&ChunkRange>,
    ) -> std::result::Result<GetResponse, TransportError> {
        let mut request = self.client.get(url);
        if let Some(range) = range {
            request = request.header(header::RANGE, range_header(range));
        }
        let response = request.send().await.map_err(map_reqwest_err)?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_err))
            .boxed();
        Ok(GetResponse { status, body })
    }
}
