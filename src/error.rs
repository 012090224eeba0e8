//! Error types for the edgequake-magnifier library.
//!
//! Three layers of failure, each with its own type:
//!
//! * [`MagnifierError`]: **Fatal**, the run cannot start (bad input file,
//!   invalid page range, provider not configured). Returned as `Err` from the
//!   top-level `extract*` functions.
//!
//! * [`RasterizationError`], [`ClassificationError`], [`ExtractionError`]:
//!   returned by the adapters at the edge of the pipeline. They never leave
//!   [`crate::pipeline::page::PagePipeline`] or the run orchestrator.
//!
//! * [`PageError`]: **Non-fatal**, what an absorbed adapter failure turns
//!   into. Stored on [`crate::output::PageOutcome`] and collected in
//!   [`crate::output::RunResult::failed_pages`] so callers can see which stage
//!   failed on which page.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-magnifier library.
#[derive(Debug, Error)]
pub enum MagnifierError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The file name does not end in `.pdf`.
    #[error("Please provide a PDF file: '{path}' does not have a .pdf extension")]
    NotPdfExtension { path: PathBuf },

    /// The file is larger than the configured limit.
    #[error("File '{path}' is {size} bytes; the limit is {limit} bytes")]
    FileTooLarge { path: PathBuf, size: u64, limit: u64 },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// The requested range is not `1 <= start <= end <= total`.
    #[error("Invalid page range {start}-{end} (document has {total} pages)")]
    InvalidPageRange {
        start: usize,
        end: usize,
        total: usize,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// A vision provider could not be created (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the results file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialising results to CSV or JSON failed.
    #[error("Failed to export results: {0}")]
    ExportFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDFium is normally downloaded automatically on first run.\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A page could not be rendered to an image.
#[derive(Debug, Clone, Error)]
pub enum RasterizationError {
    #[error("page {page} is out of range (document has {total} pages)")]
    OutOfRange { page: usize, total: usize },

    #[error("pdfium could not render page {page}: {detail}")]
    Render { page: usize, detail: String },

    #[error("could not write page image '{path}': {detail}")]
    Cache { path: PathBuf, detail: String },
}

/// The classifier call did not produce a usable answer.
///
/// A model that answers with something other than yes/no is *not* an error:
/// that is a negative classification. These variants cover the cases where
/// no answer came back at all.
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("classifier provider error: {0}")]
    Provider(String),

    #[error("classifier call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// The extractor call failed or its response did not match the schema.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("extractor provider error: {0}")]
    Provider(String),

    #[error("extractor call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("extractor response failed schema validation: {0}")]
    Schema(String),
}

/// A non-fatal failure on a single page.
///
/// Every variant means "this page contributed no records"; the variant says
/// which stage was responsible.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    #[error("Page {page}: could not read page image: {detail}")]
    ImageReadFailed { page: usize, detail: String },

    #[error("Page {page}: marker detection failed: {detail}")]
    ClassificationFailed { page: usize, detail: String },

    #[error("Page {page}: marker extraction failed: {detail}")]
    ExtractionFailed { page: usize, detail: String },
}

impl PageError {
    /// The 1-based page the error refers to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::ImageReadFailed { page, .. }
            | PageError::ClassificationFailed { page, .. }
            | PageError::ExtractionFailed { page, .. } => *page,
        }
    }

    /// Short stage name, used in CLI output.
    pub fn stage(&self) -> &'static str {
        match self {
            PageError::RenderFailed { .. } => "render",
            PageError::ImageReadFailed { .. } => "image",
            PageError::ClassificationFailed { .. } => "detect",
            PageError::ExtractionFailed { .. } => "extract",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_range_display() {
        let e = MagnifierError::InvalidPageRange {
            start: 5,
            end: 3,
            total: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("5-3"), "got: {msg}");
        assert!(msg.contains("10 pages"), "got: {msg}");
    }

    #[test]
    fn file_too_large_mentions_limit() {
        let e = MagnifierError::FileTooLarge {
            path: PathBuf::from("big.pdf"),
            size: 60,
            limit: 50,
        };
        assert!(e.to_string().contains("limit is 50"));
    }

    #[test]
    fn page_error_reports_page_and_stage() {
        let e = PageError::ExtractionFailed {
            page: 7,
            detail: "bad json".into(),
        };
        assert_eq!(e.page(), 7);
        assert_eq!(e.stage(), "extract");
        assert!(e.to_string().starts_with("Page 7"));
    }

    #[test]
    fn page_error_serialises() {
        let e = PageError::RenderFailed {
            page: 2,
            detail: "corrupt".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: PageError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
