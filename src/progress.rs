//! Progress events and cooperative cancellation for a run.
//!
//! The orchestrator is headless: it reports what it is doing through
//! [`RunProgressCallback`] and never prints anything itself. The CLI's
//! progress bar is one implementation; a test recorder is another.
//!
//! # Ordering guarantees
//!
//! `on_page_complete` fires exactly once per started page, in ascending page
//! order, with monotonically non-decreasing counters, even when pages are
//! processed concurrently, because results are consumed in page order.
//!
//! # Example
//!
//! ```rust
//! use edgequake_magnifier::{ExtractionConfig, RunProgress, RunProgressCallback};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl RunProgressCallback for Printer {
//!     fn on_page_complete(&self, progress: &RunProgress) {
//!         eprintln!(
//!             "{}/{} pages, {} markers",
//!             progress.pages_processed, progress.total_pages, progress.records_found
//!         );
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::PageError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Snapshot emitted after each page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    /// 1-based page that just finished.
    pub page_id: usize,
    /// Pages finished so far in this run.
    pub pages_processed: usize,
    /// Pages in the requested range.
    pub total_pages: usize,
    /// Records accumulated so far.
    pub records_found: usize,
    /// Records contributed by `page_id`.
    pub page_records: usize,
}

/// Receives run events. All methods default to no-ops.
///
/// Implementations must be `Send + Sync`; with `concurrency > 1`,
/// `on_page_start` may be called from several tasks at once.
pub trait RunProgressCallback: Send + Sync {
    /// Called once, after the page range has been validated.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called when work on a page begins.
    fn on_page_start(&self, page_id: usize, total_pages: usize) {
        let _ = (page_id, total_pages);
    }

    /// Called when a page failure was absorbed. Precedes that page's
    /// `on_page_complete`.
    fn on_page_warning(&self, error: &PageError) {
        let _ = error;
    }

    /// Called exactly once per started page.
    fn on_page_complete(&self, progress: &RunProgress) {
        let _ = progress;
    }

    /// Called once after the last page (or after cancellation).
    fn on_run_complete(&self, pages_attempted: usize, records_found: usize) {
        let _ = (pages_attempted, records_found);
    }
}

/// Type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn RunProgressCallback>;

/// Cloneable flag for stopping a run between pages.
///
/// Pages already in flight finish normally; pages not yet started are
/// skipped and do not count as attempted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
