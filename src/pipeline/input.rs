//! Input resolution: turn a user-supplied path or URL into a [`SourceDocument`].
//!
//! Forms live on disk as often as they live behind a link on a government
//! site, so both are accepted. Downloads are held in memory: a scanned form
//! is a few megabytes at most, and the document is base64-encoded for the
//! model request anyway.

use crate::document::SourceDocument;
use crate::error::FormEaseError;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a document.
///
/// URLs are downloaded; anything else is read as a local file.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<SourceDocument, FormEaseError> {
    if input.trim().is_empty() {
        return Err(FormEaseError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Read a local file, mapping I/O failures to actionable errors.
async fn resolve_local(path_str: &str) -> Result<SourceDocument, FormEaseError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(FormEaseError::FileNotFound { path });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(FormEaseError::PermissionDenied { path });
        }
        Err(_) => return Err(FormEaseError::FileNotFound { path }),
    };

    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let doc = SourceDocument::from_bytes(&bytes, name.as_deref())?;
    debug!(
        "Resolved local document: {} ({}, {} bytes)",
        path.display(),
        doc.mime_type(),
        bytes.len()
    );
    Ok(doc)
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<SourceDocument, FormEaseError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| FormEaseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            FormEaseError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            FormEaseError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(FormEaseError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = extract_filename(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| FormEaseError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let doc = SourceDocument::from_bytes(&bytes, Some(&filename))?;
    info!("Downloaded {} ({}, {} bytes)", filename, doc.mime_type(), bytes.len());
    Ok(doc)
}

/// Extract a reasonable file name from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}
