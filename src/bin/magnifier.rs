//! CLI binary for edgequake-magnifier.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, shows progress and writes the export file.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_magnifier::pipeline::input::input_document_name;
use edgequake_magnifier::{
    default_export_name, extract_markers, inspect, write_export, CancelToken, ExportFormat,
    ExtractionConfig, PageError, PageRange, ProgressCallback, RunProgress, RunProgressCallback,
    RunResult,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one ✓/✗ line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    warnings: Mutex<HashMap<usize, String>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            warnings: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_id: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl RunProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Scanning");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scanning {total_pages} pages for markers…"))
        ));
    }

    fn on_page_start(&self, page_id: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_id, Instant::now());
        }
        self.bar.set_message(format!("page {page_id}"));
    }

    fn on_page_warning(&self, error: &PageError) {
        if let Ok(mut m) = self.warnings.lock() {
            m.insert(error.page(), error.to_string());
        }
    }

    fn on_page_complete(&self, p: &RunProgress) {
        let secs = dim(&format!("{:.1}s", self.elapsed_secs(p.page_id)));
        let warning = self
            .warnings
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&p.page_id));

        let line = match warning {
            Some(msg) => {
                let msg: String = msg.lines().next().unwrap_or_default().chars().take(80).collect();
                format!(
                    "  {} Page {:>3}  {}  {}",
                    red("✗"),
                    p.page_id,
                    red(&msg),
                    secs
                )
            }
            None if p.page_records > 0 => format!(
                "  {} Page {:>3}  {}  {}",
                green("✓"),
                p.page_id,
                bold(&format!("{} markers", p.page_records)),
                secs
            ),
            None => format!(
                "  {} Page {:>3}  {}  {}",
                green("✓"),
                p.page_id,
                dim("no markers"),
                secs
            ),
        };
        self.bar.println(line);
        self.bar.set_position(p.pages_processed as u64);
    }

    fn on_run_complete(&self, _pages_attempted: usize, _records_found: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan a whole document; writes ledger_magnifier_results.csv
  magnifier ledger.pdf

  # A page range, results as JSON
  magnifier --pages 3-15 --format json ledger.pdf -o results.json

  # Print the full run result to stdout
  magnifier --json --pages 1-5 ledger.pdf

  # Inspect the PDF (no API key needed)
  magnifier --inspect-only ledger.pdf

  # Use OpenAI for both stages
  magnifier --classifier-provider openai --classifier-model gpt-4o-mini ledger.pdf

PIPELINE:
  Each page is rendered once and cached under <cache-dir>/<name>/images/.
  A classifier model answers yes/no for the magnifier glyph; only pages
  answered "yes" go to the extractor model. Pages that fail are logged and
  skipped; Ctrl-C stops after the pages in flight and still writes results.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY                  Key for the default classifier (gemini)
  OPENAI_API_KEY                  Key for the default extractor (openai)
  EDGEQUAKE_CLASSIFIER_PROVIDER   Classifier provider (with ..._MODEL)
  EDGEQUAKE_CLASSIFIER_MODEL      Classifier model
  EDGEQUAKE_EXTRACTOR_PROVIDER    Extractor provider (with ..._MODEL)
  EDGEQUAKE_EXTRACTOR_MODEL       Extractor model
  PDFIUM_LIB_PATH                 Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR           Override the default pdfium cache directory
  MAGNIFIER_*                     Any flag below, e.g. MAGNIFIER_DPI=300
"#;

/// Find magnifier markers in scanned PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "magnifier",
    version,
    about = "Find and transcribe magnifier markers in scanned PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Results file. Default: <name>_magnifier_results.<format>
    #[arg(short, long, env = "MAGNIFIER_OUTPUT")]
    output: Option<PathBuf>,

    /// Results file format.
    #[arg(long, env = "MAGNIFIER_FORMAT", value_enum, default_value = "csv")]
    format: FormatArg,

    /// Print the full run result as JSON to stdout instead of writing a file.
    #[arg(long, env = "MAGNIFIER_JSON")]
    json: bool,

    /// Page selection: all, 5, or 3-15.
    #[arg(long, env = "MAGNIFIER_PAGES", default_value = "all")]
    pages: String,

    /// Rendering DPI (72–400).
    #[arg(long, env = "MAGNIFIER_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Pages processed at once.
    #[arg(short, long, env = "MAGNIFIER_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Pause between pages in milliseconds.
    #[arg(long, env = "MAGNIFIER_DELAY_MS", default_value_t = 0)]
    delay_ms: u64,

    /// Root of the page-image cache.
    #[arg(long, env = "MAGNIFIER_CACHE_DIR", default_value = "data")]
    cache_dir: PathBuf,

    /// Classifier provider: gemini, openai, anthropic, ollama…
    #[arg(long, env = "MAGNIFIER_CLASSIFIER_PROVIDER")]
    classifier_provider: Option<String>,

    /// Classifier model ID.
    #[arg(long, env = "MAGNIFIER_CLASSIFIER_MODEL")]
    classifier_model: Option<String>,

    /// Extractor provider.
    #[arg(long, env = "MAGNIFIER_EXTRACTOR_PROVIDER")]
    extractor_provider: Option<String>,

    /// Extractor model ID.
    #[arg(long, env = "MAGNIFIER_EXTRACTOR_MODEL")]
    extractor_model: Option<String>,

    /// Text file with a custom classifier prompt.
    #[arg(long, env = "MAGNIFIER_CLASSIFIER_PROMPT")]
    classifier_prompt: Option<PathBuf>,

    /// Text file with a custom extractor prompt.
    #[arg(long, env = "MAGNIFIER_EXTRACTOR_PROMPT")]
    extractor_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "MAGNIFIER_PASSWORD")]
    password: Option<String>,

    /// Per-call model timeout in seconds. Default: none.
    #[arg(long, env = "MAGNIFIER_API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MAGNIFIER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print PDF facts only; no model calls.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "MAGNIFIER_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MAGNIFIER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MAGNIFIER_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    ensure_pdfium(cli.quiet)?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None, CancelToken::new()).await?;
        let info = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialise metadata")?
            );
        } else {
            println!("File:    {}", cli.input);
            println!("Name:    {}", info.name);
            if let Some(ref t) = info.title {
                println!("Title:   {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:  {}", a);
            }
            println!("Pages:   {}", info.page_count);
            println!("Size:    {} bytes", info.file_size);
        }
        return Ok(());
    }

    // ── Cancellation ─────────────────────────────────────────────────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{} Stopping after the pages in flight…", cyan("◆"));
                cancel.cancel();
            }
        });
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn RunProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress, cancel).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = extract_markers(&cli.input, &config)
        .await
        .context("Extraction failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&result).context("Failed to serialise results")?
        );
    } else {
        let format: ExportFormat = cli.format.into();
        let path = cli.output.clone().unwrap_or_else(|| {
            PathBuf::from(default_export_name(&input_document_name(&cli.input), format))
        });
        write_export(&result, &path, format).context("Failed to write results")?;
        if !cli.quiet {
            print_summary(&result, &path);
        }
    }

    Ok(())
}

/// Download PDFium on first run, with a byte-level progress bar.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn print_summary(result: &RunResult, path: &Path) {
    let mark = if result.cancelled || !result.failed_pages.is_empty() {
        cyan("⚠")
    } else {
        green("✔")
    };
    eprintln!(
        "{}  {} markers found on {} pages  {}  →  {}",
        mark,
        bold(&result.marker_count().to_string()),
        result.pages_with_marker,
        dim(&format!(
            "({} pages scanned, {} flagged, {:.1}s)",
            result.pages_attempted,
            result.pages_flagged,
            result.duration_ms as f64 / 1000.0
        )),
        bold(&path.display().to_string()),
    );
    if !result.failed_pages.is_empty() {
        let pages: Vec<String> = result
            .failed_pages
            .iter()
            .map(|e| format!("{} ({})", e.page(), e.stage()))
            .collect();
        eprintln!("   {} {}", red("failed pages:"), pages.join(", "));
    }
    if result.cancelled {
        eprintln!("   {}", cyan("run cancelled; results are partial"));
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
    cancel: CancelToken,
) -> Result<ExtractionConfig> {
    let pages: PageRange = cli
        .pages
        .parse()
        .with_context(|| format!("Invalid --pages '{}'", cli.pages))?;

    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .pages(pages)
        .cache_dir(&cli.cache_dir)
        .page_delay_ms(cli.delay_ms)
        .download_timeout_secs(cli.download_timeout)
        .cancel_token(cancel);

    if let Some(ref p) = cli.classifier_provider {
        builder = builder.classifier_provider(p);
    }
    if let Some(ref m) = cli.classifier_model {
        builder = builder.classifier_model(m);
    }
    if let Some(ref p) = cli.extractor_provider {
        builder = builder.extractor_provider(p);
    }
    if let Some(ref m) = cli.extractor_model {
        builder = builder.extractor_model(m);
    }
    if let Some(ref path) = cli.classifier_prompt {
        builder = builder.classifier_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = cli.extractor_prompt {
        builder = builder.extractor_prompt(read_prompt(path).await?);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(secs) = cli.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}
