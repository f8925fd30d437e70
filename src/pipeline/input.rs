//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! pdfium can load a document from a byte slice, so URLs are downloaded into
//! memory rather than to a temp file. The `%PDF` magic bytes are checked
//! before pdfium ever sees the data so callers get a meaningful error
//! instead of a pdfium parse failure.

use crate::error::ActError;
use std::path::PathBuf;
use tracing::{debug, info};

/// PDF bytes plus a display name (path or URL) for error messages.
#[derive(Debug, Clone)]
pub struct PdfInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes.
///
/// URLs are downloaded with `timeout_secs`; anything else is read as a
/// local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<PdfInput, ActError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Reject anything that does not start with `%PDF`.
pub fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), ActError> {
    if bytes.starts_with(b"%PDF") {
        Ok(())
    } else {
        Err(ActError::NotAPdf {
            source_name: name.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        })
    }
}

async fn read_local(path_str: &str) -> Result<PdfInput, ActError> {
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ActError::PermissionDenied { path: path.clone() },
        _ => ActError::FileNotFound { path: path.clone() },
    })?;

    check_pdf_magic(path_str, &bytes)?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());

    Ok(PdfInput {
        name: path_str.to_string(),
        bytes,
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<PdfInput, ActError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ActError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ActError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ActError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(ActError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ActError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    check_pdf_magic(url, &bytes)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(PdfInput {
        name: url.to_string(),
        bytes,
    })
}
