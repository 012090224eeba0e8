//! Result types: marker records, the extractor's schema, and run tallies.

use crate::error::PageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The page-number label printed on a scanned page.
///
/// Front matter is usually numbered with roman numerals, body pages with
/// integers. Models answer with whichever they read, so both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageLabel {
    Number(i64),
    Text(String),
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageLabel::Number(n) => write!(f, "{n}"),
            PageLabel::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PageLabel {
    fn from(n: i64) -> Self {
        PageLabel::Number(n)
    }
}

impl From<&str> for PageLabel {
    fn from(s: &str) -> Self {
        PageLabel::Text(s.to_string())
    }
}

/// One magnifier item as returned by the extractor model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerItem {
    pub cycle_id: i64,
    #[serde(default)]
    pub page_number: Option<PageLabel>,
    /// The text that follows the magnifier symbol.
    pub text_after_symbol: String,
}

/// The extractor's structured answer for one page.
///
/// This is the schema the model is asked to follow. Deserialisation is the
/// validation step: a response that does not fit is rejected as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPage {
    pub magnifier_items: Vec<MarkerItem>,
}

impl MarkerPage {
    pub fn is_empty(&self) -> bool {
        self.magnifier_items.is_empty()
    }
}

/// One transcribed marker instance.
///
/// Only the page pipeline creates these, and nothing mutates them afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// 1-based physical position of the page in the PDF.
    pub page_id: usize,
    /// Distinguishes markers on the same page; not unique across pages.
    pub cycle_id: i64,
    /// Label printed on the page, which may differ from `page_id`.
    pub page_number: Option<PageLabel>,
    pub text: String,
    pub has_marker: bool,
}

impl MarkerRecord {
    pub(crate) fn from_item(page_id: usize, item: MarkerItem) -> Self {
        Self {
            page_id,
            cycle_id: item.cycle_id,
            page_number: item.page_number,
            text: item.text_after_symbol,
            has_marker: true,
        }
    }
}

/// What happened to a single page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-based page number.
    pub page_id: usize,
    /// The classifier answered "yes".
    pub marker_detected: bool,
    /// Records in extraction order. Empty on any failure.
    pub records: Vec<MarkerRecord>,
    /// Wall-clock time spent on this page.
    pub duration_ms: u64,
    /// Set when an adapter failure was absorbed on this page.
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub(crate) fn empty(page_id: usize) -> Self {
        Self {
            page_id,
            marker_detected: false,
            records: Vec::new(),
            duration_ms: 0,
            error: None,
        }
    }

    pub(crate) fn failed(error: PageError) -> Self {
        Self {
            error: Some(error.clone()),
            ..Self::empty(error.page())
        }
    }
}

/// Per-page summary kept on [`RunResult`] (records live in `RunResult::records`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page_id: usize,
    pub marker_detected: bool,
    pub record_count: usize,
    pub duration_ms: u64,
}

/// Accumulated state of one processing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Page order, then extraction order within a page.
    pub records: Vec<MarkerRecord>,
    /// Pages started. Equals `end - start + 1` unless the run was cancelled.
    pub pages_attempted: usize,
    /// Distinct pages that contributed at least one record.
    pub pages_with_marker: usize,
    /// Pages the classifier flagged, including ones where extraction found nothing.
    pub pages_flagged: usize,
    /// Absorbed per-page failures, in page order.
    pub failed_pages: Vec<PageError>,
    pub pages: Vec<PageSummary>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl RunResult {
    /// Append one page's outcome. Outcomes must arrive in page order.
    pub(crate) fn push(&mut self, outcome: PageOutcome) {
        self.pages_attempted += 1;
        if outcome.marker_detected {
            self.pages_flagged += 1;
        }
        if !outcome.records.is_empty() {
            self.pages_with_marker += 1;
        }
        self.pages.push(PageSummary {
            page_id: outcome.page_id,
            marker_detected: outcome.marker_detected,
            record_count: outcome.records.len(),
            duration_ms: outcome.duration_ms,
        });
        if let Some(err) = outcome.error {
            self.failed_pages.push(err);
        }
        self.records.extend(outcome.records);
    }

    /// Total markers found; the number shown in the final summary.
    pub fn marker_count(&self) -> usize {
        self.records.len()
    }
}

/// Basic facts about a source PDF, available without any model calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// File stem; names the image-cache directory and default export file.
    pub name: String,
    pub page_count: usize,
    pub file_size: u64,
    pub title: Option<String>,
    pub author: Option<String>,
}
