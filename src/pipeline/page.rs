//! The page pipeline: one page image in, zero or more records out.
//!
//! `process_page` never fails. Image I/O errors, classifier errors and
//! extractor errors all become "no markers on this page" plus a `warn!` and a
//! [`PageError`] on the returned [`PageOutcome`]. Detection failure is
//! treated as a negative classification: the run keeps moving
//! and the extractor (the expensive call) is skipped.

use crate::error::PageError;
use crate::output::{MarkerRecord, PageOutcome};
use crate::pipeline::classify::MarkerClassifier;
use crate::pipeline::extract::MarkerExtractor;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Classifier and extractor wired together for single pages.
#[derive(Clone)]
pub struct PagePipeline {
    classifier: Arc<dyn MarkerClassifier>,
    extractor: Arc<dyn MarkerExtractor>,
}

impl PagePipeline {
    pub fn new(classifier: Arc<dyn MarkerClassifier>, extractor: Arc<dyn MarkerExtractor>) -> Self {
        Self {
            classifier,
            extractor,
        }
    }

    /// Process the cached image of page `page_id` (1-based).
    pub async fn process_page(&self, image_path: &Path, page_id: usize) -> PageOutcome {
        let start = Instant::now();
        let mut outcome = self.run(image_path, page_id).await;
        outcome.duration_ms = start.elapsed().as_millis() as u64;
        if let Some(ref err) = outcome.error {
            warn!("{}", err);
        }
        outcome
    }

    async fn run(&self, image_path: &Path, page_id: usize) -> PageOutcome {
        let image = match tokio::fs::read(image_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return PageOutcome::failed(PageError::ImageReadFailed {
                    page: page_id,
                    detail: format!("{}: {}", image_path.display(), e),
                })
            }
        };

        match self.classifier.classify(&image).await {
            Ok(c) if c.found => {}
            Ok(_) => {
                debug!("Page {}: no marker", page_id);
                return PageOutcome::empty(page_id);
            }
            Err(e) => {
                return PageOutcome::failed(PageError::ClassificationFailed {
                    page: page_id,
                    detail: e.to_string(),
                })
            }
        }

        debug!("Page {}: marker detected, extracting", page_id);
        let mut outcome = PageOutcome {
            marker_detected: true,
            ..PageOutcome::empty(page_id)
        };

        match self.extractor.extract(&image).await {
            Ok(page) => {
                outcome.records = page
                    .magnifier_items
                    .into_iter()
                    .map(|item| MarkerRecord::from_item(page_id, item))
                    .collect();
                if outcome.records.is_empty() {
                    debug!("Page {}: marker detected but no items extracted", page_id);
                }
            }
            Err(e) => {
                outcome.error = Some(PageError::ExtractionFailed {
                    page: page_id,
                    detail: e.to_string(),
                });
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassificationError, ExtractionError};
    use crate::output::{MarkerItem, MarkerPage, PageLabel};
    use crate::pipeline::classify::Classification;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Answer {
        Found(bool),
        Fail,
    }

    struct FixedClassifier(Answer);

    #[async_trait]
    impl MarkerClassifier for FixedClassifier {
        async fn classify(&self, _image: &[u8]) -> Result<Classification, ClassificationError> {
            match self.0 {
                Answer::Found(found) => Ok(Classification { found }),
                Answer::Fail => Err(ClassificationError::Provider("503".into())),
            }
        }
    }

    struct CountingExtractor {
        calls: AtomicUsize,
        result: Result<MarkerPage, ExtractionError>,
    }

    #[async_trait]
    impl MarkerExtractor for CountingExtractor {
        async fn extract(&self, _image: &[u8]) -> Result<MarkerPage, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn two_items() -> MarkerPage {
        MarkerPage {
            magnifier_items: vec![
                MarkerItem {
                    cycle_id: 1,
                    page_number: Some(PageLabel::Text("i".into())),
                    text_after_symbol: "see note".into(),
                },
                MarkerItem {
                    cycle_id: 2,
                    page_number: None,
                    text_after_symbol: String::new(),
                },
            ],
        }
    }

    fn setup(
        answer: Answer,
        result: Result<MarkerPage, ExtractionError>,
    ) -> (PagePipeline, Arc<CountingExtractor>, tempfile::TempDir, PathBuf) {
        let extractor = Arc::new(CountingExtractor {
            calls: AtomicUsize::new(0),
            result,
        });
        let pipeline = PagePipeline::new(Arc::new(FixedClassifier(answer)), extractor.clone());
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("page_4.png");
        std::fs::write(&image, b"\x89PNG\r\n\x1a\nfake").unwrap();
        (pipeline, extractor, dir, image)
    }

    #[tokio::test]
    async fn negative_skips_extractor() {
        let (pipeline, extractor, _dir, image) = setup(Answer::Found(false), Ok(two_items()));
        let outcome = pipeline.process_page(&image, 4).await;
        assert!(outcome.records.is_empty());
        assert!(!outcome.marker_detected);
        assert!(outcome.error.is_none());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn classifier_error_behaves_like_negative() {
        let (pipeline, extractor, _dir, image) = setup(Answer::Fail, Ok(two_items()));
        let outcome = pipeline.process_page(&image, 4).await;
        assert!(outcome.records.is_empty());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            outcome.error,
            Some(PageError::ClassificationFailed { page: 4, .. })
        ));
    }

    #[tokio::test]
    async fn positive_maps_items_to_records() {
        let (pipeline, extractor, _dir, image) = setup(Answer::Found(true), Ok(two_items()));
        let outcome = pipeline.process_page(&image, 4).await;

        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert!(outcome.marker_detected);
        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.records.iter().all(|r| r.page_id == 4 && r.has_marker));
        assert_eq!(outcome.records[0].cycle_id, 1);
        assert_eq!(outcome.records[0].text, "see note");
        assert_eq!(outcome.records[1].cycle_id, 2);
    }

    #[tokio::test]
    async fn schema_failure_yields_no_records() {
        let (pipeline, _extractor, _dir, image) = setup(
            Answer::Found(true),
            Err(ExtractionError::Schema("missing field".into())),
        );
        let outcome = pipeline.process_page(&image, 4).await;
        assert!(outcome.records.is_empty());
        assert!(outcome.marker_detected);
        assert!(matches!(
            outcome.error,
            Some(PageError::ExtractionFailed { page: 4, .. })
        ));
    }

    #[tokio::test]
    async fn empty_extraction_is_not_an_error() {
        let (pipeline, _extractor, _dir, image) =
            setup(Answer::Found(true), Ok(MarkerPage::default()));
        let outcome = pipeline.process_page(&image, 4).await;
        assert!(outcome.records.is_empty());
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn unreadable_image_is_absorbed() {
        let (pipeline, extractor, dir, _image) = setup(Answer::Found(true), Ok(two_items()));
        let outcome = pipeline
            .process_page(&dir.path().join("missing.png"), 9)
            .await;
        assert!(outcome.records.is_empty());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            outcome.error,
            Some(PageError::ImageReadFailed { page: 9, .. })
        ));
    }
}
