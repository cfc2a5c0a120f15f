//! Input resolution: normalise a user-supplied path or URL to a local file.
//!
//! pdfium opens documents by path, so URL inputs are downloaded into a
//! `TempDir` that lives as long as the [`ResolvedInput`]. The `%PDF` magic
//! bytes are checked before returning so callers get a meaningful error
//! instead of a pdfium parse failure.

use crate::error::ExtractionError;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL; the PDF lives in a temp directory that is removed
    /// when this value is dropped.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the PDF regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractionError> {
    let input = input.trim();
    if input.is_empty() || (input.contains("://") && !is_url(input)) {
        return Err(ExtractionError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, ExtractionError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(ExtractionError::FileNotFound { path });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(ExtractionError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ExtractionError::PermissionDenied { path });
        }
        Err(_) => return Err(ExtractionError::FileNotFound { path }),
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, ExtractionError> {
    info!("Downloading PDF from: {}", url);
    let failed = |reason: String| ExtractionError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ExtractionError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    let temp_dir = TempDir::new().map_err(|e| ExtractionError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(filename_from_url(url));

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(ExtractionError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| ExtractionError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", bytes.len(), file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last path segment of the URL if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "downloaded.pdf".to_string())
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
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://arxiv.org/pdf/2401.00001v1.pdf"), "2401.00001v1.pdf");
        assert_eq!(filename_from_url("https://example.com/download"), "downloaded.pdf");
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn test_rejects_other_schemes() {
        let err = resolve_input("ftp://example.com/a.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidInput { .. }));
        let err = resolve_input("   ", 5).await.unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, ExtractionError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_not_a_pdf() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"PK\x03\x04 zip archive").unwrap();
        let err = resolve_input(f.path().to_str().unwrap(), 5).await.unwrap_err();
        match err {
            ExtractionError::NotAPdf { magic, .. } => assert_eq!(&magic, b"PK\x03\x04"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_pdf_resolves() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"%PDF-1.7\n").unwrap();
        let resolved = resolve_input(f.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(resolved.path(), f.path());
    }
}
