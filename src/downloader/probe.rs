use tracing::debug;

use crate::error::{DownloadError, Result};
use crate::http::{HeadInfo, HttpSource};

/// Size and range capability of the remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    /// 0 when the server did not send a usable Content-Length.
    pub total_size: u64,
    pub supports_ranges: bool,
    /// ETag, else Last-Modified. Identifies the version chunk sinks were cut from.
    pub validator: Option<String>,
}

impl From<&HeadInfo> for ResourceInfo {
    fn from(head: &HeadInfo) -> Self {
        ResourceInfo {
            total_size: head.content_length.unwrap_or(0),
            supports_ranges: head
                .accept_ranges
                .as_deref()
                .is_some_and(|v| v.to_ascii_lowercase().contains("bytes")),
            validator: head.etag.clone().or_else(|| head.last_modified.clone()),
        }
    }
}

/// HEAD the URL. Transport failures and non-2xx statuses are both fatal here.
pub async fn probe<S: HttpSource>(source: &S, url: &str) -> Result<ResourceInfo> {
    let head = source
        .head(url)
        .await
        .map_err(|e| DownloadError::ResourceUnavailable {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !(200..300).contains(&head.status) {
        return Err(DownloadError::ResourceUnavailable {
            url: url.to_string(),
            reason: format!("HTTP status {}", head.status),
        });
    }

    let info = ResourceInfo::from(&head);
    debug!(url, total_size = info.total_size, supports_ranges = info.supports_ranges, "probed resource");
    Ok(info)
}
