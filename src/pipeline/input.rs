//! Input resolution: turn a user-supplied path or URL into document bytes.
//!
//! ## Why load into memory?
//!
//! Both the page counter and the renderers work from a byte slice, and the
//! buffer is shared read-only across the whole pass. Loading once up front
//! means an unreadable file or a failed download is reported before any
//! page work starts. Format detection happens later, on the bytes, so a
//! misleading file extension never matters.

use crate::error::OcrError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Document bytes plus the display name they came from.
#[derive(Debug, Clone)]
pub struct LoadedInput {
    pub bytes: Vec<u8>,
    /// File name used in batch responses (`filename` field).
    pub filename: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL.
pub async fn load_input(input: &str, timeout_secs: u64) -> Result<LoadedInput, OcrError> {
    if input.trim().is_empty() {
        return Err(OcrError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        load_local(Path::new(input)).await
    }
}

async fn load_local(path: &Path) -> Result<LoadedInput, OcrError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => OcrError::Internal(format!("Failed to read '{}': {}", path.display(), e)),
    })?;

    debug!("Loaded {} bytes from {}", bytes.len(), path.display());
    Ok(LoadedInput {
        bytes,
        filename: local_filename(path),
    })
}

fn local_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<LoadedInput, OcrError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OcrError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_err = |e: reqwest::Error| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            OcrError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_err)?;

    if !response.status().is_success() {
        return Err(OcrError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_err)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(LoadedInput {
        bytes: bytes.to_vec(),
        filename: extract_filename(url),
    })
}

/// Last path segment of the URL when it looks like a file name.
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url() {
        assert_eq!(extract_filename("https://example.com/a/scan.png"), "scan.png");
        assert_eq!(extract_filename("https://example.com/a/"), "downloaded");
        assert_eq!(extract_filename("https://example.com/report"), "downloaded");
    }

    #[tokio::test]
    async fn loads_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7 fake").unwrap();

        let loaded = load_input(file.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(loaded.bytes, b"%PDF-1.7 fake");
        assert_eq!(
            loaded.filename,
            file.path().file_name().unwrap().to_string_lossy()
        );
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = load_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = load_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, OcrError::InvalidInput { .. }));
    }
}
