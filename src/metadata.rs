use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::with_suffix;
use crate::error::{DownloadError, Result};

/// Provenance record written next to a finished download as `<file>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadMetadata {
    pub url: String,
    pub file: String,
    pub size: u64,
    pub sha256: String,
}

impl DownloadMetadata {
    /// Write pretty JSON to `path` via a `.part` file and a rename.
    pub async fn write_sidecar(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_vec_pretty(self).map_err(|e| {
            DownloadError::io("serialize metadata", path, std::io::Error::other(e))
        })?;
        let staged = with_suffix(path, ".part");
        tokio::fs::write(&staged, &body)
            .await
            .map_err(|e| DownloadError::io("write metadata", &staged, e))?;
        tokio::fs::rename(&staged, path)
            .await
            .map_err(|e| DownloadError::io("place metadata", path, e))
    }

    pub async fn read_sidecar(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| DownloadError::io("read metadata", path, e))?;
        serde_json::from_slice(&data).map_err(|e| {
            DownloadError::io(
                "parse metadata",
                path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            )
        })
    }
}
