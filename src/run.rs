//! Library entry points.
//!
//! [`extract_markers`] is the whole run: resolve the input, build both
//! adapters, open the PDF and hand the page range to the orchestrator.
//! [`extract_with`] is the same run with caller-supplied adapters, which is
//! how tests and embedders swap in their own renderer or models.

use crate::config::{
    ExtractionConfig, DEFAULT_CLASSIFIER_MODEL, DEFAULT_CLASSIFIER_PROVIDER,
    DEFAULT_EXTRACTOR_MODEL, DEFAULT_EXTRACTOR_PROVIDER,
};
use crate::error::MagnifierError;
use crate::export::{self, ExportFormat};
use crate::orchestrator::{Document, RunOrchestrator};
use crate::output::{DocumentInfo, RunResult};
use crate::pipeline::cache::{ImageCache, Rasterizer};
use crate::pipeline::classify::{MarkerClassifier, VisionClassifier};
use crate::pipeline::extract::{MarkerExtractor, VisionExtractor};
use crate::pipeline::input;
use crate::pipeline::page::PagePipeline;
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Find every magnifier marker in a PDF file or URL.
///
/// # Returns
/// `Ok(RunResult)` whenever the run started, even if individual pages
/// failed (see `result.failed_pages`) or the run was cancelled.
///
/// # Errors
/// Only for fatal problems: unreadable or invalid input, a page range that
/// does not fit the document, or a provider that cannot be constructed.
pub async fn extract_markers(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<RunResult, MagnifierError> {
    let renderer = Arc::new(PdfiumRenderer::new(
        config.max_rendered_pixels,
        config.password.clone(),
    ));
    extract_markers_with_renderer(input_str.as_ref(), renderer, config).await
}

/// Input, page count and page range are all checked before any provider is
/// built, so those errors surface even without API keys.
async fn extract_markers_with_renderer(
    input_str: &str,
    renderer: Arc<dyn PageRenderer>,
    config: &ExtractionConfig,
) -> Result<RunResult, MagnifierError> {
    info!("Starting extraction: {}", input_str);

    let resolved =
        input::resolve_input(input_str, config.max_file_bytes, config.download_timeout_secs)
            .await?;
    let (document, start, end) = open_document(
        resolved.path(),
        &resolved.document_name(),
        renderer.as_ref(),
        config,
    )
    .await?;

    let classifier = build_classifier(config)?;
    let extractor = build_extractor(config)?;

    run_document(&document, start, end, renderer, classifier, extractor, config).await
}

/// Run over an already-validated PDF with the given adapters.
///
/// `document_name` names the image-cache directory under `config.cache_dir`.
pub async fn extract_with(
    pdf: &Path,
    document_name: &str,
    renderer: Arc<dyn PageRenderer>,
    classifier: Arc<dyn MarkerClassifier>,
    extractor: Arc<dyn MarkerExtractor>,
    config: &ExtractionConfig,
) -> Result<RunResult, MagnifierError> {
    let (document, start, end) =
        open_document(pdf, document_name, renderer.as_ref(), config).await?;
    run_document(&document, start, end, renderer, classifier, extractor, config).await
}

async fn open_document(
    pdf: &Path,
    document_name: &str,
    renderer: &dyn PageRenderer,
    config: &ExtractionConfig,
) -> Result<(Document, usize, usize), MagnifierError> {
    let page_count = renderer.page_count(pdf).await?;
    info!("PDF has {} pages", page_count);
    let (start, end) = config.pages.resolve(page_count)?;
    Ok((Document::new(pdf, document_name, page_count), start, end))
}

async fn run_document(
    document: &Document,
    start: usize,
    end: usize,
    renderer: Arc<dyn PageRenderer>,
    classifier: Arc<dyn MarkerClassifier>,
    extractor: Arc<dyn MarkerExtractor>,
    config: &ExtractionConfig,
) -> Result<RunResult, MagnifierError> {
    let cache = ImageCache::new(&config.cache_dir, &document.name);
    debug!("Image cache: {}", cache.dir().display());

    let orchestrator = RunOrchestrator::new(
        Rasterizer::new(renderer, cache, config.dpi),
        PagePipeline::new(classifier, extractor),
    )
    .with_concurrency(config.concurrency)
    .with_page_delay(Duration::from_millis(config.page_delay_ms))
    .with_progress(config.progress_callback.clone())
    .with_cancel(config.cancel.clone());

    orchestrator.run_range(document, start, end).await
}

/// Run and write the results to `output_path`.
///
/// The file is written to a temp file next to the target and renamed into
/// place, so a crash never leaves a truncated export behind.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    format: ExportFormat,
    config: &ExtractionConfig,
) -> Result<RunResult, MagnifierError> {
    let result = extract_markers(input_str, config).await?;
    write_export(&result, output_path.as_ref(), format)?;
    Ok(result)
}

/// Atomically write `result` to `path` in `format`.
pub fn write_export(
    result: &RunResult,
    path: &Path,
    format: ExportFormat,
) -> Result<(), MagnifierError> {
    let bytes = export::render(result, format)?;
    let write_err = |source: std::io::Error| MagnifierError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    info!(
        "Wrote {} records to {} ({})",
        result.records.len(),
        path.display(),
        format
    );
    Ok(())
}

/// Synchronous wrapper around [`extract_markers`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<RunResult, MagnifierError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MagnifierError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_markers(input_str, config))
}

/// Read basic facts about a PDF without any model calls.
///
/// Does not require an API key. Size limit, download timeout, render limits
/// and the password come from `config`.
pub async fn inspect(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
) -> Result<DocumentInfo, MagnifierError> {
    let resolved = input::resolve_input(
        input_str.as_ref(),
        config.max_file_bytes,
        config.download_timeout_secs,
    )
    .await?;
    let path = resolved.path();
    let file_size = tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    let meta = PdfiumRenderer::new(config.max_rendered_pixels, config.password.clone())
        .metadata(path)
        .await?;

    Ok(DocumentInfo {
        name: resolved.document_name(),
        page_count: meta.page_count,
        file_size,
        title: meta.title,
        author: meta.author,
    })
}

// ── Provider resolution ──────────────────────────────────────────────────

fn build_classifier(config: &ExtractionConfig) -> Result<Arc<dyn MarkerClassifier>, MagnifierError> {
    let provider = resolve_provider(
        config.classifier.as_ref(),
        (config.classifier_provider.as_str(), config.classifier_model.as_str()),
        (DEFAULT_CLASSIFIER_PROVIDER, DEFAULT_CLASSIFIER_MODEL),
        env_pair("EDGEQUAKE_CLASSIFIER_PROVIDER", "EDGEQUAKE_CLASSIFIER_MODEL"),
    )?;

    let mut classifier = VisionClassifier::new(provider)
        .with_options(config.temperature, config.classifier_max_tokens)
        .with_timeout(config.api_timeout_secs.map(Duration::from_secs));
    if let Some(ref prompt) = config.classifier_prompt {
        classifier = classifier.with_prompt(prompt.as_str());
    }
    Ok(Arc::new(classifier))
}

fn build_extractor(config: &ExtractionConfig) -> Result<Arc<dyn MarkerExtractor>, MagnifierError> {
    let provider = resolve_provider(
        config.extractor.as_ref(),
        (config.extractor_provider.as_str(), config.extractor_model.as_str()),
        (DEFAULT_EXTRACTOR_PROVIDER, DEFAULT_EXTRACTOR_MODEL),
        env_pair("EDGEQUAKE_EXTRACTOR_PROVIDER", "EDGEQUAKE_EXTRACTOR_MODEL"),
    )?;

    let mut extractor = VisionExtractor::new(provider)
        .with_options(config.temperature, config.extractor_max_tokens)
        .with_timeout(config.api_timeout_secs.map(Duration::from_secs));
    if let Some(ref prompt) = config.extractor_prompt {
        extractor = extractor.with_prompt(prompt.as_str());
    }
    Ok(Arc::new(extractor))
}

/// Both variables set and non-empty.
fn env_pair(provider_var: &str, model_var: &str) -> Option<(String, String)> {
    match (std::env::var(provider_var), std::env::var(model_var)) {
        (Ok(p), Ok(m)) if !p.is_empty() && !m.is_empty() => Some((p, m)),
        _ => None,
    }
}

/// Pick the provider/model pair for one adapter.
///
/// A pair the caller changed from the defaults always wins. Otherwise the
/// environment pair, when present, replaces the defaults.
fn select_provider(
    configured: (&str, &str),
    defaults: (&str, &str),
    env: Option<(String, String)>,
) -> (String, String) {
    match env {
        Some(pair) if configured == defaults => pair,
        _ => (configured.0.to_string(), configured.1.to_string()),
    }
}

fn resolve_provider(
    prebuilt: Option<&Arc<dyn LLMProvider>>,
    configured: (&str, &str),
    defaults: (&str, &str),
    env: Option<(String, String)>,
) -> Result<Arc<dyn LLMProvider>, MagnifierError> {
    if let Some(provider) = prebuilt {
        return Ok(Arc::clone(provider));
    }

    let (name, model) = select_provider(configured, defaults, env);
    debug!("Creating provider {}/{}", name, model);
    ProviderFactory::create_llm_provider(&name, &model).map_err(|e| {
        MagnifierError::ProviderNotConfigured {
            provider: name.clone(),
            hint: format!(
                "{e}\nSet the API key for '{name}' (e.g. OPENAI_API_KEY or GEMINI_API_KEY) \
                 or choose another provider."
            ),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageRange;
    use crate::error::RasterizationError;
    use crate::output::MarkerRecord;
    use async_trait::async_trait;
    use image::DynamicImage;

    struct OnePage;

    #[async_trait]
    impl PageRenderer for OnePage {
        async fn page_count(&self, _pdf: &Path) -> Result<usize, MagnifierError> {
            Ok(1)
        }

        async fn render_page(
            &self,
            _pdf: &Path,
            page: usize,
            _dpi: u32,
        ) -> Result<DynamicImage, RasterizationError> {
            Err(RasterizationError::Render {
                page,
                detail: "not rendered in this test".into(),
            })
        }
    }

    fn write_pdf(dir: &Path, bytes: usize) -> std::path::PathBuf {
        let path = dir.join("book.pdf");
        let mut content = b"%PDF-1.4\n".to_vec();
        content.resize(bytes.max(content.len()), b' ');
        std::fs::write(&path, content).unwrap();
        path
    }

    const DEFAULTS: (&str, &str) = ("gemini", "gemini-2.0-flash");

    #[test]
    fn env_pair_replaces_defaults() {
        let chosen = select_provider(
            DEFAULTS,
            DEFAULTS,
            Some(("openai".into(), "gpt-4o".into())),
        );
        assert_eq!(chosen, ("openai".to_string(), "gpt-4o".to_string()));
    }

    #[test]
    fn explicit_choice_beats_env_pair() {
        let chosen = select_provider(
            ("anthropic", "claude-sonnet-4-20250514"),
            DEFAULTS,
            Some(("openai".into(), "gpt-4o".into())),
        );
        assert_eq!(chosen.0, "anthropic");
    }

    #[test]
    fn defaults_without_env() {
        let chosen = select_provider(DEFAULTS, DEFAULTS, None);
        assert_eq!(chosen, ("gemini".to_string(), "gemini-2.0-flash".to_string()));
    }

    #[test]
    fn write_export_is_atomic_and_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("doc_magnifier_results.csv");
        let result = RunResult {
            records: vec![MarkerRecord {
                page_id: 1,
                cycle_id: 1,
                page_number: Some("i".into()),
                text: "see note".into(),
                has_marker: true,
            }],
            ..Default::default()
        };

        write_export(&result, &path, ExportFormat::Csv).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "page_id,cycle_id,page_number,text,has_marker\n1,1,i,see note,true\n"
        );
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn missing_input_fails_before_provider_lookup() {
        let config = ExtractionConfig::default();
        let err = extract_markers("/definitely/not/here.pdf", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, MagnifierError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn page_range_is_checked_before_providers() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_pdf(dir.path(), 64);
        let config = ExtractionConfig {
            pages: PageRange::Range(5, 5),
            cache_dir: dir.path().join("data"),
            classifier_provider: "no-such-provider".into(),
            extractor_provider: "no-such-provider".into(),
            ..Default::default()
        };

        let err = extract_markers_with_renderer(pdf.to_str().unwrap(), Arc::new(OnePage), &config)
            .await
            .unwrap_err();
        assert!(
            matches!(err, MagnifierError::InvalidPageRange { start: 5, end: 5, total: 1 }),
            "{err}"
        );
    }

    #[tokio::test]
    async fn valid_range_then_reports_missing_provider() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_pdf(dir.path(), 64);
        let config = ExtractionConfig {
            pages: PageRange::Range(1, 1),
            cache_dir: dir.path().join("data"),
            classifier_provider: "no-such-provider".into(),
            ..Default::default()
        };

        let err = extract_markers_with_renderer(pdf.to_str().unwrap(), Arc::new(OnePage), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, MagnifierError::ProviderNotConfigured { .. }), "{err}");
    }

    #[tokio::test]
    async fn inspect_uses_configured_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = write_pdf(dir.path(), 2048);
        let config = ExtractionConfig {
            max_file_bytes: 1024,
            ..Default::default()
        };

        let err = inspect(pdf.to_str().unwrap(), &config).await.unwrap_err();
        assert!(
            matches!(err, MagnifierError::FileTooLarge { size: 2048, limit: 1024, .. }),
            "{err}"
        );
    }
}
