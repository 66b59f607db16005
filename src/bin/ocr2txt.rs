//! CLI binary for edgequake-ocr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig`, runs one batch, and prints the results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr::{
    write_text_atomic, BatchConfig, BatchOrchestrator, BatchProgressCallback, BatchResult,
    CommandEngineFactory, EngineRegistry, PageHeader, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const BOLD: u8 = 1;
const DIM: u8 = 2;
const RED: u8 = 31;
const GREEN: u8 = 32;
const YELLOW: u8 = 33;

/// Wrap `s` in one ANSI SGR code.
fn paint(code: u8, s: impl std::fmt::Display) -> String {
    format!("\x1b[{code}m{s}\x1b[0m")
}

/// Longest engine message shown on a page line.
const MAX_ERROR_CHARS: usize = 72;

/// Progress bar on stderr with one line per finished page.
///
/// The bar only appears once the batch knows its page count; until then
/// image loading and engine start-up are silent.
#[derive(Default)]
struct PageTicker {
    bar: Mutex<Option<ProgressBar>>,
    page_started: Mutex<Option<Instant>>,
}

impl PageTicker {
    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            f(bar);
        }
    }

    fn page_secs(&self) -> f64 {
        self.page_started
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .map_or(0.0, |t| t.elapsed().as_secs_f64())
    }

    fn page_line(&self, mark: String, page_num: usize, total: usize, detail: String) {
        let secs = self.page_secs();
        self.with_bar(|bar| {
            bar.println(format!(
                "  {mark} page {page_num}/{total}  {detail}  {}",
                paint(DIM, format_args!("{secs:.2}s"))
            ));
            bar.inc(1);
        });
    }

    /// Remove the bar when the batch ends without `on_batch_complete`.
    fn finish(&self) {
        if let Some(bar) = self.bar.lock().unwrap_or_else(|e| e.into_inner()).take() {
            bar.finish_and_clear();
        }
    }
}

impl BatchProgressCallback for PageTicker {
    fn on_batch_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{prefix:.bold} [{bar:36.green/238}] {pos}/{len}  {msg}  {elapsed}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
        let bar = ProgressBar::new(total_pages as u64)
            .with_style(style)
            .with_prefix("ocr");
        bar.enable_steady_tick(Duration::from_millis(120));
        *self.bar.lock().unwrap_or_else(|e| e.into_inner()) = Some(bar);
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        *self.page_started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.with_bar(|bar| bar.set_message(format!("page {page_num}")));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let detail = paint(DIM, format_args!("{text_len} bytes"));
        self.page_line(paint(GREEN, "ok "), page_num, total_pages, detail);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let mut msg: String = error.chars().take(MAX_ERROR_CHARS).collect();
        if error.chars().count() > MAX_ERROR_CHARS {
            msg.push('\u{2026}');
        }
        self.page_line(paint(RED, "err"), page_num, total_pages, paint(RED, msg));
    }

    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        self.finish();
        let failed = total_pages.saturating_sub(success_count);
        let colour = match failed {
            0 => GREEN,
            f if f == total_pages => RED,
            _ => YELLOW,
        };
        eprintln!(
            "{} of {} page(s) recognized{}",
            paint(colour, paint(BOLD, success_count)),
            total_pages,
            if failed > 0 {
                format!(", {} failed", paint(RED, failed))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recognize one scan (stdout)
  ocr2txt --engine-cmd paddle-ocr-json scan.png

  # Several pages, traditional Chinese, to a file
  ocr2txt --engine-cmd paddle-ocr-json --lang ch_tra p1.png p2.png p3.png -o book.txt

  # Layout-preserving rows instead of one fragment per line
  ocr2txt --engine-cmd paddle-ocr-json --format layout invoice.jpg

  # Full per-page results with detections and bounding boxes
  ocr2txt --engine-cmd paddle-ocr-json --format json scan.png > scan.json

  # Pass engine arguments; {lang} and {image} are substituted
  ocr2txt --engine-cmd python3 --engine-arg ocr_sidecar.py \
          --engine-arg --lang --engine-arg {lang} --engine-arg {image} scan.png

  # Images from URLs
  ocr2txt --engine-cmd paddle-ocr-json https://example.com/receipt.png

ENGINE CONTRACT:
  The engine command is run once per page with the page written to a
  temporary PNG. It must print the recognizer's raw output as JSON on
  stdout, either dict-shaped
    [{"rec_texts": [...], "rec_scores": [...], "rec_boxes": [...]}]
  or list-shaped
    [[ [bbox, [text, confidence]], ... ]]
  and exit 0. A non-zero exit marks that page as failed.

LANGUAGES:
  en, ch_tra, ch_sim (both map to ch), japan, korean, french, german,
  spanish. Other codes are passed to the engine as-is.

ENVIRONMENT VARIABLES:
  OCR2TXT_ENGINE_CMD      Recognizer program
  OCR2TXT_LANG            Language code
  OCR2TXT_MAX_PAGES       Page cap per batch
  OCR2TXT_PAGE_TIMEOUT    Per-page deadline in seconds
  RUST_LOG                Override log filtering (e.g. edgequake_ocr=debug)
"#;

/// Recognize text in page images with an external OCR engine.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2txt",
    version,
    about = "Recognize text in page images and print it in reading order",
    long_about = "Run an external OCR engine over one or more page images (local files or URLs), \
normalize its output, and print reading-ordered text, layout-preserving text, or JSON. \
Each page has its own deadline; a page that fails or times out is marked and the rest continue.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image paths or HTTP/HTTPS URLs, in page order.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Recognizer program that prints engine JSON for an image.
    #[arg(long, env = "OCR2TXT_ENGINE_CMD")]
    engine_cmd: String,

    /// Extra argument for the recognizer (repeatable). Supports {image} and {lang}.
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Language code (en, ch_tra, ch_sim, japan, korean, …).
    #[arg(short, long, env = "OCR2TXT_LANG", default_value = "en")]
    lang: String,

    /// Maximum number of pages; extra inputs are ignored.
    #[arg(long, env = "OCR2TXT_MAX_PAGES", default_value_t = edgequake_ocr::config::DEFAULT_MAX_PAGES)]
    max_pages: usize,

    /// Per-page deadline in seconds.
    #[arg(long, env = "OCR2TXT_PAGE_TIMEOUT",
          default_value_t = edgequake_ocr::config::DEFAULT_PAGE_TIMEOUT_SECS)]
    page_timeout: u64,

    /// Output format.
    #[arg(short, long, env = "OCR2TXT_FORMAT", value_enum, default_value = "text")]
    format: FormatArg,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "OCR2TXT_OUTPUT")]
    output: Option<PathBuf>,

    /// Page header: dashed, comment, or a custom template using {n}.
    #[arg(long, env = "OCR2TXT_HEADER", default_value = "dashed")]
    header: String,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCR2TXT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Skip the warm-up recognition after the engine is created.
    #[arg(long, env = "OCR2TXT_NO_WARM_UP")]
    no_warm_up: bool,

    /// Exit with an error if any page failed.
    #[arg(long, env = "OCR2TXT_STRICT")]
    strict: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCR2TXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR2TXT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FormatArg {
    /// One fragment per line, pages under headers.
    Text,
    /// Fragments regrouped into visual rows.
    Layout,
    /// The full batch result.
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Per-page lines replace INFO logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && cli.format != FormatArg::Json;
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

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the tokio runtime")?;
    let outcome = runtime.block_on(run(&cli, show_progress));
    // Engine calls abandoned at their deadline must not delay exit.
    runtime.shutdown_background();
    outcome
}

async fn run(cli: &Cli, show_progress: bool) -> Result<()> {
    let ticker = show_progress.then(|| Arc::new(PageTicker::default()));
    let config = build_config(
        cli,
        ticker.clone().map(|t| t as Arc<dyn BatchProgressCallback>),
    )?;

    let factory = Arc::new(
        CommandEngineFactory::new(cli.engine_cmd.clone(), cli.engine_args.clone())
            .with_timeout(config.page_timeout),
    );
    let registry = Arc::new(EngineRegistry::new(factory).with_warm_up(config.warm_up));
    let header = config.page_header.clone();
    let orchestrator = BatchOrchestrator::new(Arc::clone(&registry), config);

    let outcome = orchestrator.process_inputs(&cli.inputs).await;
    if let Some(t) = &ticker {
        t.finish();
    }
    let result = outcome.context("Recognition failed")?;
    registry.clear();

    let rendered = render(&result, cli.format, &header)?;
    match &cli.output {
        Some(path) => write_text_atomic(path, &rendered)
            .await
            .context("Failed to write output")?,
        None => {
            let mut out = io::stdout().lock();
            out.write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                out.write_all(b"\n").context("Failed to write to stdout")?;
            }
        }
    }

    print_summary(cli, &result, show_progress);

    if cli.strict {
        result.into_result().context("Some pages failed")?;
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .language(cli.lang.clone())
        .max_pages(cli.max_pages)
        .page_timeout_secs(cli.page_timeout)
        .page_header(parse_header(&cli.header))
        .warm_up(!cli.no_warm_up)
        .download_timeout_secs(cli.download_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn render(result: &BatchResult, format: FormatArg, header: &PageHeader) -> Result<String> {
    Ok(match format {
        FormatArg::Text => result.combined_text.clone(),
        FormatArg::Layout => result.layout_text(header),
        FormatArg::Json => {
            serde_json::to_string_pretty(result).context("Failed to serialise output")?
        }
    })
}

fn print_summary(cli: &Cli, result: &BatchResult, show_progress: bool) {
    if cli.quiet || cli.format == FormatArg::Json {
        return;
    }
    let stats = &result.stats;
    if !show_progress {
        eprintln!(
            "Recognized {}/{} pages in {}ms",
            stats.succeeded_pages, stats.processed_pages, stats.total_duration_ms
        );
        if stats.failed_pages > 0 {
            eprintln!(
                "  {} pages failed ({} timed out)",
                stats.failed_pages, stats.timed_out_pages
            );
        }
    }
    if stats.truncated_pages > 0 {
        eprintln!(
            "   {} input(s) beyond --max-pages {} were ignored",
            stats.truncated_pages, cli.max_pages
        );
    }
    if let Some(ref path) = cli.output {
        eprintln!(
            "   {} detections  →  {}",
            paint(DIM, stats.total_detections),
            paint(BOLD, path.display())
        );
    }
}

/// Parse `--header` into `PageHeader`.
fn parse_header(s: &str) -> PageHeader {
    match s.to_lowercase().as_str() {
        "dashed" | "default" => PageHeader::Dashed,
        "comment" => PageHeader::Comment,
        _ => PageHeader::Custom(s.to_string()),
    }
}
