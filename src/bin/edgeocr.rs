//! CLI binary for edgequake-ocr.
//!
//! A thin shim over the library crate: maps CLI flags to `OcrConfig`, runs
//! the streaming pipeline and prints results. The progress bar is driven by
//! the same events `--stream` prints.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr::convert::write_atomic;
use edgequake_ocr::pipeline::input::load_input;
use edgequake_ocr::{
    assemble_text, inspect, BatchResponse, DocumentResult, OcrConfig, PageResult, Pipeline,
    RendererPreference, StreamEvent,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── Progress display driven by stream events ─────────────────────────────────

struct Progress {
    bar: ProgressBar,
    page_started: Option<Instant>,
    errors: usize,
}

impl Progress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self {
            bar,
            page_started: None,
            errors: 0,
        }
    }

    fn on_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::PageStart { page, total_pages } => {
                if self.bar.length() != Some(*total_pages as u64) {
                    self.activate_bar(*total_pages);
                }
                self.page_started = Some(Instant::now());
                self.bar.set_message(format!("page {page}"));
            }
            StreamEvent::PageComplete {
                result,
                total_pages,
            } => {
                let secs = self
                    .page_started
                    .take()
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or(0.0);
                self.bar.println(page_line(result, *total_pages, secs));
                if result.is_error() {
                    self.errors += 1;
                }
                self.bar.inc(1);
            }
            StreamEvent::ProcessingComplete { total_pages } => {
                self.bar.finish_and_clear();
                let ok = total_pages.saturating_sub(self.errors);
                if self.errors == 0 {
                    eprintln!("{} {} pages recognised", green("✔"), bold(&ok.to_string()));
                } else {
                    eprintln!(
                        "{} {}/{} pages recognised  ({} failed)",
                        if ok == 0 { red("✘") } else { cyan("⚠") },
                        bold(&ok.to_string()),
                        total_pages,
                        red(&self.errors.to_string()),
                    );
                }
            }
            StreamEvent::Error { .. } => self.bar.finish_and_clear(),
        }
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }
}

fn page_line(result: &PageResult, total: usize, secs: f64) -> String {
    match &result.error {
        None => format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            result.page,
            total,
            dim(&format!("{:>5} chars", result.text.chars().count())),
            dim(&format!("{secs:.1}s")),
        ),
        Some(error) => {
            let msg: String = if error.chars().count() > 80 {
                format!("{}\u{2026}", error.chars().take(79).collect::<String>())
            } else {
                error.clone()
            };
            format!(
                "  {} Page {:>3}/{:<3}  {}  {}",
                red("✗"),
                result.page,
                total,
                red(&msg),
                dim(&format!("{secs:.1}s")),
            )
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract text from a scanned PDF (stdout)
  edgeocr scan.pdf

  # Write to a file
  edgeocr scan.pdf -o scan.txt

  # A photo or screenshot
  edgeocr receipt.jpg

  # Batch payload as JSON
  edgeocr --json --lang fra contrat.pdf > result.json

  # One JSON event per line as pages finish
  edgeocr --stream scan.pdf

  # Format and page count only (no API key needed)
  edgeocr --inspect-only scan.pdf

  # Force the pdftoppm fallback renderer
  edgeocr --renderer poppler scan.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium; without one, pdftoppm is used
  RUST_LOG                Log filter (overrides --verbose / --quiet)
"#;

/// Extract text from scanned PDFs and images using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "edgeocr",
    version,
    about = "Extract text from scanned PDFs and images using Vision LLMs",
    long_about = "Extract text from scanned documents (PDF or image, local file or URL) page by \
page using Vision Language Models. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, and \
any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF/image path or HTTP/HTTPS URL.
    input: String,

    /// Write the extracted text to this file instead of stdout.
    #[arg(short, long, env = "EDGEOCR_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Language tag echoed in the JSON payload.
    #[arg(long, env = "EDGEOCR_LANG", default_value = "eng")]
    lang: String,

    /// Page renderer: auto, pdfium, poppler.
    #[arg(long, env = "EDGEOCR_RENDERER", value_enum, default_value = "auto")]
    renderer: RendererArg,

    /// Path to the pdfium shared library.
    #[arg(long, env = "EDGEOCR_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Rendering DPI for pdfium (72–1200).
    #[arg(long, env = "EDGEOCR_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    dpi: u32,

    /// Rendering DPI for the pdftoppm fallback (72–1200).
    #[arg(long, env = "EDGEOCR_FALLBACK_DPI", default_value_t = 600,
          value_parser = clap::value_parser!(u32).range(72..=1200))]
    fallback_dpi: u32,

    /// Upscale images whose shorter side is below this many pixels.
    #[arg(long, env = "EDGEOCR_MIN_SHORT_SIDE", default_value_t = 800)]
    min_short_side: u32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "EDGEOCR_MAX_TOKENS", default_value_t = 3072)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "EDGEOCR_TEMPERATURE", default_value_t = 0.8)]
    temperature: f32,

    /// Retries per page on LLM failure (0–20).
    #[arg(long, env = "EDGEOCR_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Print the batch payload as JSON instead of plain text.
    #[arg(long, env = "EDGEOCR_JSON", conflicts_with = "stream")]
    json: bool,

    /// Print one JSON event per line as pages finish.
    #[arg(long, env = "EDGEOCR_STREAM")]
    stream: bool,

    /// Disable progress bar.
    #[arg(long, env = "EDGEOCR_NO_PROGRESS")]
    no_progress: bool,

    /// Print format and page count only, no recognition.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGEOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EDGEOCR_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "EDGEOCR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "EDGEOCR_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RendererArg {
    Auto,
    Pdfium,
    Poppler,
}

impl From<RendererArg> for RendererPreference {
    fn from(v: RendererArg) -> Self {
        match v {
            RendererArg::Auto => RendererPreference::Auto,
            RendererArg::Pdfium => RendererPreference::Pdfium,
            RendererArg::Poppler => RendererPreference::Poppler,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.stream;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input)
            .await
            .context("Failed to inspect document")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize info")?
            );
        } else {
            println!("File:    {}", cli.input);
            println!("Format:  {:?}", info.format);
            println!("Pages:   {}", info.total_pages);
            println!("Bytes:   {}", info.byte_len);
        }
        return Ok(());
    }

    // ── Load input and build the pipeline ────────────────────────────────
    let config = build_config(&cli)?;
    let loaded = load_input(&cli.input, config.download_timeout_secs)
        .await
        .context("Failed to load input")?;
    let pipeline = Pipeline::from_config(&config).context("Failed to set up the pipeline")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let started = Instant::now();
    let mut progress = show_progress.then(Progress::new);
    let mut events = pipeline.stream(loaded.bytes);
    let mut pages = Vec::new();
    let mut fatal: Option<String> = None;

    let stdout = io::stdout();
    while let Some(event) = events.next().await {
        if let Some(ref mut p) = progress {
            p.on_event(&event);
        }
        if cli.stream {
            let line = serde_json::to_string(&event).context("Failed to serialise event")?;
            let mut handle = stdout.lock();
            writeln!(handle, "{line}").context("Failed to write to stdout")?;
            handle.flush().ok();
        }
        match event {
            StreamEvent::PageComplete { result, .. } => pages.push(result),
            StreamEvent::Error { error } => fatal = Some(error),
            _ => {}
        }
    }

    let result = match fatal {
        Some(error) => DocumentResult::failed(error),
        None => DocumentResult::completed(pages),
    };

    if cli.stream {
        if let Some(ref error) = result.error {
            anyhow::bail!("OCR failed: {error}");
        }
        return Ok(());
    }

    if cli.json {
        let payload = BatchResponse::from_result(result.clone(), &loaded.filename, &cli.lang);
        let json = serde_json::to_string_pretty(&payload).context("Failed to serialise output")?;
        println!("{json}");
        if let Some(ref error) = result.error {
            anyhow::bail!("OCR failed: {error}");
        }
        return Ok(());
    }

    if let Some(ref error) = result.error {
        anyhow::bail!("OCR failed: {error}");
    }

    let text = assemble_text(&result.pages);
    if let Some(ref output_path) = cli.output {
        write_atomic(output_path, &text)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!(
                "{}  {}/{} pages  {}ms  →  {}",
                if result.completed_pages() == result.total_pages {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                result.completed_pages(),
                result.total_pages,
                started.elapsed().as_millis(),
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
        if !cli.quiet && !show_progress {
            eprintln!(
                "Recognised {}/{} pages in {}ms",
                result.completed_pages(),
                result.total_pages,
                started.elapsed().as_millis()
            );
        }
    }

    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .dpi(cli.dpi)
        .fallback_dpi(cli.fallback_dpi)
        .renderer(cli.renderer.into())
        .min_short_side(cli.min_short_side)
        .max_new_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(path);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }

    builder.build().context("Invalid configuration")
}
