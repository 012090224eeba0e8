//! The run orchestrator: drive the page pipeline across a page range.
//!
//! Pages are processed in ascending order. With `concurrency > 1` up to N
//! pages are in flight at once, but results are consumed through an ordered
//! buffer (`StreamExt::buffered`), so records, progress events and tallies
//! always follow page order.
//!
//! Nothing that goes wrong on a page stops the run. A rasterisation failure
//! is recorded as [`PageError::RenderFailed`]; everything after that is
//! absorbed inside [`PagePipeline::process_page`].

use crate::error::{MagnifierError, PageError};
use crate::output::{PageOutcome, RunResult};
use crate::pipeline::cache::Rasterizer;
use crate::pipeline::input::document_name;
use crate::pipeline::page::PagePipeline;
use crate::pipeline::render::PageRenderer;
use crate::progress::{CancelToken, ProgressCallback, RunProgress};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A source PDF ready to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: PathBuf,
    /// File stem; names the image-cache directory.
    pub name: String,
    pub page_count: usize,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, page_count: usize) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            page_count,
        }
    }

    /// Open `path`, asking `renderer` for the page count.
    pub async fn open(path: &Path, renderer: &dyn PageRenderer) -> Result<Self, MagnifierError> {
        let page_count = renderer.page_count(path).await?;
        Ok(Self::new(path, document_name(path), page_count))
    }
}

/// Runs the page pipeline over a closed page range.
pub struct RunOrchestrator {
    rasterizer: Rasterizer,
    pipeline: PagePipeline,
    concurrency: usize,
    page_delay: Duration,
    progress: Option<ProgressCallback>,
    cancel: Option<CancelToken>,
}

impl RunOrchestrator {
    pub fn new(rasterizer: Rasterizer, pipeline: PagePipeline) -> Self {
        Self {
            rasterizer,
            pipeline,
            concurrency: 1,
            page_delay: Duration::ZERO,
            progress: None,
            cancel: None,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_progress(mut self, cb: Option<ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    pub fn with_cancel(mut self, token: Option<CancelToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Process pages `start..=end` (1-based, inclusive) of `document`.
    ///
    /// # Errors
    /// Only [`MagnifierError::InvalidPageRange`], before any page is touched.
    pub async fn run_range(
        &self,
        document: &Document,
        start: usize,
        end: usize,
    ) -> Result<RunResult, MagnifierError> {
        if start < 1 || start > end || end > document.page_count {
            return Err(MagnifierError::InvalidPageRange {
                start,
                end,
                total: document.page_count,
            });
        }

        let total = end - start + 1;
        let run_start = Instant::now();
        info!(
            "Processing pages {}-{} of '{}' ({} pages)",
            start, end, document.name, total
        );
        if let Some(ref cb) = self.progress {
            cb.on_run_start(total);
        }

        let mut result = RunResult::default();
        let mut outcomes = stream::iter(start..=end)
            .map(|page| self.process_one(document, page, total))
            .buffered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            let Some(outcome) = outcome else {
                result.cancelled = true;
                continue;
            };

            let page_id = outcome.page_id;
            let page_records = outcome.records.len();
            if let (Some(cb), Some(err)) = (&self.progress, &outcome.error) {
                cb.on_page_warning(err);
            }
            result.push(outcome);

            if let Some(ref cb) = self.progress {
                cb.on_page_complete(&RunProgress {
                    page_id,
                    pages_processed: result.pages_attempted,
                    total_pages: total,
                    records_found: result.records.len(),
                    page_records,
                });
            }

            if !self.page_delay.is_zero() && page_id < end {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        result.duration_ms = run_start.elapsed().as_millis() as u64;
        if result.cancelled {
            info!(
                "Run cancelled after {}/{} pages",
                result.pages_attempted, total
            );
        }
        info!(
            "Run complete: {} markers on {} pages ({} pages attempted, {} failed) in {}ms",
            result.records.len(),
            result.pages_with_marker,
            result.pages_attempted,
            result.failed_pages.len(),
            result.duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_run_complete(result.pages_attempted, result.records.len());
        }
        Ok(result)
    }

    /// Rasterise and process one page. `None` means the page was skipped
    /// because the run was cancelled before it started.
    async fn process_one(
        &self,
        document: &Document,
        page: usize,
        total: usize,
    ) -> Option<PageOutcome> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            debug!("Page {}: skipped, run cancelled", page);
            return None;
        }
        if let Some(ref cb) = self.progress {
            cb.on_page_start(page, total);
        }

        let started = Instant::now();
        let image_path = match self.rasterizer.render(&document.path, page).await {
            Ok(path) => path,
            Err(e) => {
                let err = PageError::RenderFailed {
                    page,
                    detail: e.to_string(),
                };
                warn!("{}", err);
                let mut outcome = PageOutcome::failed(err);
                outcome.duration_ms = started.elapsed().as_millis() as u64;
                return Some(outcome);
            }
        };

        let mut outcome = self.pipeline.process_page(&image_path, page).await;
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        Some(outcome)
    }
}
