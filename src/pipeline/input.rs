//! Input resolution and validation: turn a user-supplied path or URL into a
//! local PDF that is safe to hand to pdfium.
//!
//! Local files must have a `.pdf` extension, fit under the size limit and
//! start with the `%PDF` magic bytes. Downloads are checked for size and
//! magic bytes (URLs such as `/pdf/1706.03762` often have no extension).
//! Everything here runs before the first page is touched, so a rejected
//! input means the run never starts.

use crate::error::MagnifierError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input: either a local path or a downloaded temp file.
pub enum ResolvedInput {
    Local(PathBuf),
    /// The `TempDir` keeps the download alive until the run is done.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Downloaded { path, .. } => path,
        }
    }

    /// File stem used for the image-cache directory and export file name.
    pub fn document_name(&self) -> String {
        document_name(self.path())
    }
}

/// File stem of `path`, or `document` when there is none.
pub fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}

/// Document name for a raw input string, before it is resolved.
pub fn input_document_name(input: &str) -> String {
    if is_url(input) {
        document_name(Path::new(&filename_from_url(input)))
    } else {
        document_name(Path::new(input))
    }
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve and validate the input.
pub async fn resolve_input(
    input: &str,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedInput, MagnifierError> {
    if input.trim().is_empty() {
        return Err(MagnifierError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, max_bytes, timeout_secs).await
    } else {
        validate_local(Path::new(input), max_bytes).map(ResolvedInput::Local)
    }
}

/// Check a local file: extension, size, readability, magic bytes.
pub fn validate_local(path: &Path, max_bytes: u64) -> Result<PathBuf, MagnifierError> {
    let path = path.to_path_buf();

    let has_pdf_ext = path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !has_pdf_ext {
        return Err(MagnifierError::NotPdfExtension { path });
    }

    let meta = match std::fs::metadata(&path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(MagnifierError::PermissionDenied { path });
        }
        Err(_) => return Err(MagnifierError::FileNotFound { path }),
    };
    if !meta.is_file() {
        return Err(MagnifierError::FileNotFound { path });
    }
    if meta.len() > max_bytes {
        return Err(MagnifierError::FileTooLarge {
            path,
            size: meta.len(),
            limit: max_bytes,
        });
    }

    let mut f = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(MagnifierError::PermissionDenied { path });
        }
        Err(_) => return Err(MagnifierError::FileNotFound { path }),
    };
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(MagnifierError::NotAPdf { path, magic });
    }

    debug!("Validated local PDF: {} ({} bytes)", path.display(), meta.len());
    Ok(path)
}

async fn download_url(
    url: &str,
    max_bytes: u64,
    timeout_secs: u64,
) -> Result<ResolvedInput, MagnifierError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| MagnifierError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            MagnifierError::DownloadTimeout {
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

    let filename = filename_from_url(url);
    let temp_dir = TempDir::new().map_err(|e| MagnifierError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(MagnifierError::FileTooLarge {
                path: file_path,
                size: len,
                limit: max_bytes,
            });
        }
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    if bytes.len() as u64 > max_bytes {
        return Err(MagnifierError::FileTooLarge {
            path: file_path,
            size: bytes.len() as u64,
            limit: max_bytes,
        });
    }
    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(MagnifierError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| MagnifierError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded to: {}", file_path.display());
    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Last URL path segment, with `.pdf` appended when it has no extension.
fn filename_from_url(url: &str) -> String {
    let last = reqwest::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
    });

    match last {
        Some(name) if !name.is_empty() && name.to_ascii_lowercase().ends_with(".pdf") => name,
        Some(name) if !name.is_empty() => format!("{name}.pdf"),
        _ => "downloaded.pdf".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(bytes)
            .unwrap();
        path
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn accepts_valid_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "Book.PDF", b"%PDF-1.7\n...");
        assert_eq!(validate_local(&path, 1024).unwrap(), path);
    }

    #[test]
    fn rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.txt", b"%PDF-1.7");
        assert!(matches!(
            validate_local(&path, 1024),
            Err(MagnifierError::NotPdfExtension { .. })
        ));
    }

    #[test]
    fn rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "big.pdf", &[b'%'; 64]);
        match validate_local(&path, 32) {
            Err(MagnifierError::FileTooLarge { size, limit, .. }) => {
                assert_eq!(size, 64);
                assert_eq!(limit, 32);
            }
            other => panic!("expected FileTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "fake.pdf", b"PK\x03\x04zip");
        assert!(matches!(
            validate_local(&path, 1024),
            Err(MagnifierError::NotAPdf { .. })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        assert!(matches!(
            validate_local(Path::new("/definitely/not/here.pdf"), 1024),
            Err(MagnifierError::FileNotFound { .. })
        ));
    }

    #[test]
    fn document_name_is_stem() {
        assert_eq!(document_name(Path::new("/x/annual report.pdf")), "annual report");
        assert_eq!(document_name(Path::new("/")), "document");
    }

    #[test]
    fn filename_from_url_variants() {
        assert_eq!(filename_from_url("https://h/a/b/report.pdf"), "report.pdf");
        assert_eq!(filename_from_url("https://arxiv.org/pdf/1706.03762"), "1706.03762.pdf");
        assert_eq!(filename_from_url("https://h/"), "downloaded.pdf");
        assert_eq!(input_document_name("https://h/a/ledger.pdf"), "ledger");
        assert_eq!(input_document_name("scans/ledger 1887.pdf"), "ledger 1887");
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        assert!(matches!(
            resolve_input("  ", 10, 1).await,
            Err(MagnifierError::InvalidInput { .. })
        ));
    }
}
