//! SHA-256 of a file on disk.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::{DownloadError, Result};

/// Stream `path` through SHA-256 in `buffer_size` reads, returning lowercase hex.
pub async fn sha256_file(path: &Path, buffer_size: usize) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DownloadError::io("open for digest", path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];
    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| DownloadError::io("read for digest", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Case-insensitive hex comparison, ignoring surrounding whitespace.
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

/// Compute the digest and compare it against `expected` when one is given.
pub async fn verify_file(path: &Path, expected: Option<&str>, buffer_size: usize) -> Result<String> {
    let actual = sha256_file(path, buffer_size).await?;
    if let Some(expected) = expected {
        if !digests_match(expected, &actual) {
            return Err(DownloadError::IntegrityMismatch {
                expected: expected.trim().to_ascii_lowercase(),
                actual,
            });
        }
    }
    Ok(actual)
}
