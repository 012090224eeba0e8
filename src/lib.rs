//! # edgequake-magnifier
//!
//! Find and transcribe magnifier markers in scanned PDFs using vision
//! language models.
//!
//! Scanned books and ledgers often carry a small magnifying-glass glyph in
//! the margin, followed by a short note. This crate rasterises each page,
//! asks a cheap vision model whether the glyph is present at all, and only
//! for flagged pages asks a stronger model to transcribe every instance into
//! a structured record.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      validate local file (.pdf, ≤ 50 MiB, %PDF) or download URL
//!  ├─ 2. Rasterize  render page via pdfium, cache as data/<name>/images/page_<n>.png
//!  ├─ 3. Classify   yes/no vision call (gemini-2.0-flash by default)
//!  ├─ 4. Extract    structured vision call, only when step 3 said yes
//!  ├─ 5. Aggregate  records in page order + per-page tallies
//!  └─ 6. Export     CSV (or JSON)
//! ```
//!
//! A failure on one page never stops the run: the page contributes no
//! records, a warning is logged and the failure is listed in
//! [`RunResult::failed_pages`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_magnifier::{extract_markers, ExtractionConfig, PageRange};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Needs GEMINI_API_KEY and OPENAI_API_KEY for the default providers.
//!     let config = ExtractionConfig::builder()
//!         .pages(PageRange::Range(1, 20))
//!         .build()?;
//!     let result = extract_markers("ledger.pdf", &config).await?;
//!     for r in &result.records {
//!         println!("page {} #{}: {}", r.page_id, r.cycle_id, r.text);
//!     }
//!     eprintln!(
//!         "{} markers found on {} pages",
//!         result.marker_count(),
//!         result.pages_with_marker
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `magnifier` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-magnifier = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageRange};
pub use error::{
    ClassificationError, ExtractionError, MagnifierError, PageError, RasterizationError,
};
pub use export::{default_export_name, ExportFormat};
pub use orchestrator::{Document, RunOrchestrator};
pub use output::{
    DocumentInfo, MarkerItem, MarkerPage, MarkerRecord, PageLabel, PageOutcome, PageSummary,
    RunResult,
};
pub use pipeline::cache::{ImageCache, Rasterizer};
pub use pipeline::classify::{Classification, MarkerClassifier, VisionClassifier};
pub use pipeline::extract::{MarkerExtractor, VisionExtractor};
pub use pipeline::page::PagePipeline;
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{CancelToken, ProgressCallback, RunProgress, RunProgressCallback};
pub use run::{extract_markers, extract_sync, extract_to_file, extract_with, inspect, write_export};
