//! Configuration types for a marker-extraction run.
//!
//! Every knob lives in [`ExtractionConfig`], built through
//! [`ExtractionConfigBuilder`]. The builder clamps numeric inputs to sane
//! ranges and `build()` rejects combinations that cannot work.

use crate::error::MagnifierError;
use crate::progress::{CancelToken, ProgressCallback};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Default input size limit: 50 MiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Default classifier: a cheap, fast vision model for a yes/no question.
pub const DEFAULT_CLASSIFIER_PROVIDER: &str = "gemini";
pub const DEFAULT_CLASSIFIER_MODEL: &str = "gemini-2.0-flash";

/// Default extractor: a model that follows JSON schemas reliably.
pub const DEFAULT_EXTRACTOR_PROVIDER: &str = "openai";
pub const DEFAULT_EXTRACTOR_MODEL: &str = "gpt-4o-2024-08-06";

/// Configuration for a marker-extraction run.
///
/// # Example
/// ```rust
/// use edgequake_magnifier::{ExtractionConfig, PageRange};
///
/// let config = ExtractionConfig::builder()
///     .dpi(200)
///     .pages(PageRange::Range(3, 15))
///     .cache_dir("data")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Rendering DPI. Range: 72–400. Default: 200.
    ///
    /// Margin glyphs are small; 200 DPI keeps them legible to the classifier.
    pub dpi: u32,

    /// Maximum rendered edge in pixels. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Pages processed at once. Default: 1 (strictly sequential).
    ///
    /// Hosted model calls are billed and rate-limited, so parallelism is
    /// opt-in. Results are always aggregated in page order.
    pub concurrency: usize,

    /// Which pages to process. Default: all.
    pub pages: PageRange,

    /// Root of the page-image cache. Default: `data`.
    ///
    /// Images land in `<cache_dir>/<document-name>/images/page_<n>.png` and
    /// are reused by later runs on the same document.
    pub cache_dir: PathBuf,

    /// Largest accepted input file in bytes. Default: 50 MiB.
    pub max_file_bytes: u64,

    /// Provider name for the classifier (e.g. "gemini", "openai").
    pub classifier_provider: String,
    pub classifier_model: String,

    /// Provider name for the extractor.
    pub extractor_provider: String,
    pub extractor_model: String,

    /// Pre-constructed classifier provider. Takes precedence over the name.
    pub classifier: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed extractor provider. Takes precedence over the name.
    pub extractor: Option<Arc<dyn LLMProvider>>,

    /// Custom classifier prompt. If None, uses the built-in yes/no prompt.
    pub classifier_prompt: Option<String>,

    /// Custom extractor prompt. If None, uses the built-in schema prompt.
    pub extractor_prompt: Option<String>,

    /// Sampling temperature for both adapters. Default: 0.0.
    pub temperature: f32,

    /// Output budget for the classifier; it only needs one word. Default: 8.
    pub classifier_max_tokens: usize,

    /// Output budget for the extractor. Default: 1000.
    pub extractor_max_tokens: usize,

    /// Optional per-call timeout. Default: none.
    ///
    /// An expired call is treated like any other adapter failure: the page
    /// contributes no records and the run moves on.
    pub api_timeout_secs: Option<u64>,

    /// Pause between pages, in milliseconds. Default: 0.
    pub page_delay_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-page progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// Checked before each page; when cancelled no further pages start.
    pub cancel: Option<CancelToken>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 4000,
            concurrency: 1,
            pages: PageRange::default(),
            cache_dir: PathBuf::from("data"),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            classifier_provider: DEFAULT_CLASSIFIER_PROVIDER.to_string(),
            classifier_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            extractor_provider: DEFAULT_EXTRACTOR_PROVIDER.to_string(),
            extractor_model: DEFAULT_EXTRACTOR_MODEL.to_string(),
            classifier: None,
            extractor: None,
            classifier_prompt: None,
            extractor_prompt: None,
            temperature: 0.0,
            classifier_max_tokens: 8,
            extractor_max_tokens: 1000,
            api_timeout_secs: None,
            page_delay_ms: 0,
            password: None,
            download_timeout_secs: 120,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("pages", &self.pages)
            .field("cache_dir", &self.cache_dir)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("classifier_provider", &self.classifier_provider)
            .field("classifier_model", &self.classifier_model)
            .field("extractor_provider", &self.extractor_provider)
            .field("extractor_model", &self.extractor_model)
            .field("classifier", &self.classifier.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("extractor", &self.extractor.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("page_delay_ms", &self.page_delay_ms)
            .finish()
    }
}

impl ExtractionConfig {
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.config, f)
    }
}

impl ExtractionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn pages(mut self, pages: PageRange) -> Self {
        self.config.pages = pages;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn max_file_bytes(mut self, n: u64) -> Self {
        self.config.max_file_bytes = n;
        self
    }

    pub fn classifier_provider(mut self, name: impl Into<String>) -> Self {
        self.config.classifier_provider = name.into();
        self
    }

    pub fn classifier_model(mut self, model: impl Into<String>) -> Self {
        self.config.classifier_model = model.into();
        self
    }

    pub fn extractor_provider(mut self, name: impl Into<String>) -> Self {
        self.config.extractor_provider = name.into();
        self
    }

    pub fn extractor_model(mut self, model: impl Into<String>) -> Self {
        self.config.extractor_model = model.into();
        self
    }

    pub fn classifier(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.classifier = Some(provider);
        self
    }

    pub fn extractor(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.extractor = Some(provider);
        self
    }

    pub fn classifier_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.classifier_prompt = Some(prompt.into());
        self
    }

    pub fn extractor_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extractor_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn classifier_max_tokens(mut self, n: usize) -> Self {
        self.config.classifier_max_tokens = n;
        self
    }

    pub fn extractor_max_tokens(mut self, n: usize) -> Self {
        self.config.extractor_max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn page_delay_ms(mut self, ms: u64) -> Self {
        self.config.page_delay_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.config.cancel = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, MagnifierError> {
        let c = &self.config;
        if let PageRange::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(MagnifierError::InvalidConfig(format!(
                    "page range must satisfy 1 <= start <= end, got {start}-{end}"
                )));
            }
        }
        if c.max_file_bytes == 0 {
            return Err(MagnifierError::InvalidConfig(
                "max_file_bytes must be > 0".into(),
            ));
        }
        if c.classifier_max_tokens == 0 || c.extractor_max_tokens == 0 {
            return Err(MagnifierError::InvalidConfig(
                "max tokens must be > 0".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(MagnifierError::InvalidConfig(
                "api timeout must be > 0 seconds".into(),
            ));
        }
        Ok(self.config)
    }
}

/// The pages of a document to process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageRange {
    /// Every page (default).
    #[default]
    All,
    /// A closed, 1-based range `[start, end]`.
    Range(usize, usize),
}

impl PageRange {
    /// Resolve to concrete `(start, end)` bounds for a document.
    ///
    /// Out-of-range requests are an error; nothing is clipped.
    pub fn resolve(&self, total_pages: usize) -> Result<(usize, usize), MagnifierError> {
        let (start, end) = match *self {
            PageRange::All => (1, total_pages),
            PageRange::Range(s, e) => (s, e),
        };
        if start < 1 || start > end || end > total_pages {
            return Err(MagnifierError::InvalidPageRange {
                start,
                end,
                total: total_pages,
            });
        }
        Ok((start, end))
    }
}

/// Parses `all`, `N` or `A-B` (1-based, inclusive).
impl FromStr for PageRange {
    type Err = MagnifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "all" {
            return Ok(PageRange::All);
        }

        let parse = |v: &str| {
            v.trim().parse::<usize>().map_err(|_| {
                MagnifierError::InvalidConfig(format!(
                    "invalid page selection '{s}' (expected all, N or A-B)"
                ))
            })
        };
        let (start, end) = match s.split_once('-') {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let n = parse(&s)?;
                (n, n)
            }
        };
        if start == 0 || start > end {
            return Err(MagnifierError::InvalidConfig(format!(
                "page range must satisfy 1 <= start <= end, got {start}-{end}"
            )));
        }
        Ok(PageRange::Range(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.dpi, 200);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(c.classifier_model, "gemini-2.0-flash");
        assert_eq!(c.extractor_provider, "openai");
        assert_eq!(c.cache_dir, PathBuf::from("data"));
        assert!(c.api_timeout_secs.is_none());
    }

    #[test]
    fn builder_clamps_inputs() {
        let c = ExtractionConfig::builder()
            .dpi(1000)
            .concurrency(0)
            .temperature(5.0)
            .build()
            .unwrap();
        assert_eq!(c.dpi, 400);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn builder_rejects_inverted_range() {
        let err = ExtractionConfig::builder()
            .pages(PageRange::Range(5, 2))
            .build()
            .unwrap_err();
        assert!(matches!(err, MagnifierError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_start() {
        assert!(ExtractionConfig::builder()
            .pages(PageRange::Range(0, 2))
            .build()
            .is_err());
    }

    #[test]
    fn resolve_all_covers_document() {
        assert_eq!(PageRange::All.resolve(12).unwrap(), (1, 12));
    }

    #[test]
    fn resolve_checks_bounds() {
        assert_eq!(PageRange::Range(3, 3).resolve(5).unwrap(), (3, 3));
        assert!(PageRange::Range(4, 6).resolve(5).is_err());
        assert!(PageRange::Range(0, 1).resolve(5).is_err());
        assert!(PageRange::Range(3, 2).resolve(5).is_err());
    }

    #[test]
    fn resolve_empty_document_is_invalid() {
        assert!(PageRange::All.resolve(0).is_err());
    }

    #[test]
    fn page_range_from_str() {
        assert_eq!("all".parse::<PageRange>().unwrap(), PageRange::All);
        assert_eq!(" ALL ".parse::<PageRange>().unwrap(), PageRange::All);
        assert_eq!("7".parse::<PageRange>().unwrap(), PageRange::Range(7, 7));
        assert_eq!("3-15".parse::<PageRange>().unwrap(), PageRange::Range(3, 15));
        for bad in ["0", "5-2", "x", "1-", "1,3"] {
            assert!(bad.parse::<PageRange>().is_err(), "{bad}");
        }
    }
}
