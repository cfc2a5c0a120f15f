//! CLI binary for edgequake-pdf-translate.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `TranslationConfig`, drives one job and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_translate::{
    JobId, JobSnapshot, JobStatus, MarkdownWriter, PageMarker, ProgressCallback, TranslationConfig,
    TranslationEngine, TranslationProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress callback: one bar for the job plus a log line per chunk.
/// Chunks finish out of order, so start times are tracked per chunk index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_job_start` sets its length.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
    }

    fn chunk_elapsed(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&index)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_job_start(&self, _job: &JobId, total_chunks: usize, total_pages: usize) {
        self.activate_bar(total_chunks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Translating {total_pages} pages in {total_chunks} chunks…"
            ))
        ));
    }

    fn on_chunk_start(&self, _job: &JobId, index: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(index, Instant::now());
        self.bar.set_message(format!("chunk {}", index + 1));
    }

    fn on_chunk_retry(&self, _job: &JobId, index: usize, attempt: u32, delay: Duration, _error: &str) {
        self.bar.println(format!(
            "  {} Chunk {:>3}  {}",
            yellow("↻"),
            index + 1,
            dim(&format!("rate limited, retry {attempt} in {}s", delay.as_secs())),
        ));
    }

    fn on_chunk_complete(&self, _job: &JobId, index: usize, total: usize, translated_len: usize) {
        let elapsed = self.chunk_elapsed(index);
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{translated_len:>6} bytes")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, _job: &JobId, index: usize, total: usize, error: &str) {
        let elapsed = self.chunk_elapsed(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_job_complete(&self, _job: &JobId, status: JobStatus, completed: usize, total: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);

        if status == JobStatus::Completed && failed == 0 {
            eprintln!(
                "{} {} chunks translated successfully",
                green("✔"),
                bold(&completed.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} chunks translated  ({} failed)",
                if status == JobStatus::Failed {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&completed.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate to Persian (default), Markdown on stdout
  pdf-translate book.pdf

  # Write to a file
  pdf-translate book.pdf -o book.fa.md

  # German, bigger chunks, gentler pacing for a strict quota
  pdf-translate --target-language German --pages-per-chunk 8 \
      --concurrency 1 --launch-interval 10 book.pdf -o book.de.md

  # Translate from a URL with a specific model
  pdf-translate --provider gemini --model gemini-2.0-flash \
      https://arxiv.org/pdf/1706.03762 -o attention.fa.md

  # Final job snapshot as JSON
  pdf-translate --json book.pdf > status.json

RATE LIMITS:
  At most --concurrency calls are in flight, and a new call is launched at
  most every --launch-interval seconds. A rate-limited call is retried
  --max-retries times, waiting --retry-delay · 2^k seconds before retry k+1
  (5s, 10s, 20s with the defaults). A chunk that is still rate limited then
  fails; the rest of the document is translated anyway.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory containing libpdfium
"#;

/// Translate PDF files and URLs chunk by chunk through LLM APIs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-translate",
    version,
    about = "Translate PDF files and URLs chunk by chunk through rate-limited LLM APIs",
    long_about = "Translate long PDF documents (local files or URLs) with an LLM, a few pages \
at a time. Calls are throttled and retried on rate limits so free-tier quotas are enough for \
whole books. Supports Google Gemini, OpenAI, Anthropic and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the translated Markdown to this file instead of stdout.
    #[arg(short, long, env = "PDF_TRANSLATE_OUTPUT")]
    output: Option<PathBuf>,

    /// Pages per translation call.
    #[arg(long, env = "PDF_TRANSLATE_PAGES_PER_CHUNK", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    pages_per_chunk: u64,

    /// Maximum translation calls in flight.
    #[arg(short, long, env = "PDF_TRANSLATE_CONCURRENCY", default_value_t = 2,
          value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: u64,

    /// Minimum seconds between two call launches.
    #[arg(long, env = "PDF_TRANSLATE_LAUNCH_INTERVAL", default_value_t = 4.0)]
    launch_interval: f64,

    /// Retries per chunk after a rate-limit error.
    #[arg(long, env = "PDF_TRANSLATE_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Base backoff in seconds; doubles on every retry.
    #[arg(long, env = "PDF_TRANSLATE_RETRY_DELAY", default_value_t = 5.0)]
    retry_delay: f64,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: gemini, openai, anthropic, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Language of the source document.
    #[arg(long, env = "PDF_TRANSLATE_SOURCE_LANGUAGE", default_value = "English")]
    source_language: String,

    /// Language to translate into.
    #[arg(long, env = "PDF_TRANSLATE_TARGET_LANGUAGE", default_value = "Persian")]
    target_language: String,

    /// Page marker: comment, heading, or a custom line with {page}.
    #[arg(long, env = "PDF_TRANSLATE_MARKER", default_value = "comment")]
    marker: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_TRANSLATE_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF_TRANSLATE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Keep pages without a text layer (they are skipped by default).
    #[arg(long, env = "PDF_TRANSLATE_KEEP_BLANK")]
    keep_blank_pages: bool,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "PDF_TRANSLATE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF_TRANSLATE_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Print the final job snapshot as JSON instead of Markdown.
    #[arg(long, env = "PDF_TRANSLATE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF_TRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_TRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_TRANSLATE_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_API_TIMEOUT", default_value_t = 180)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the progress bar active only errors are logged; the bar gives
    // all the feedback that matters.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn TranslationProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let marker = config.page_marker.clone();

    // Without -o the artifact goes to a temp dir and is echoed to stdout.
    let scratch = match cli.output {
        Some(_) => None,
        None => Some(tempfile::tempdir().context("Failed to create a temporary directory")?),
    };
    let writer = match (&cli.output, &scratch) {
        (Some(path), _) => MarkdownWriter::to_file(path, marker),
        (None, Some(dir)) => MarkdownWriter::into_dir(dir.path(), marker),
        (None, None) => anyhow::bail!("No output location"),
    };

    let engine = TranslationEngine::from_config(config)
        .context("Failed to set up the translation service")?
        .with_writer(Arc::new(writer));

    // ── Run the job ──────────────────────────────────────────────────────
    let started = Instant::now();
    let id = engine
        .submit_document(&cli.input)
        .await
        .context("Failed to start translation")?;
    let snapshot = engine.wait(&id).await.context("Translation did not finish")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&snapshot).context("Failed to serialise snapshot")?;
        println!("{json}");
    } else if cli.output.is_none() {
        if let Some(output) = &snapshot.output {
            let markdown = tokio::fs::read_to_string(&output.path)
                .await
                .with_context(|| format!("Failed to read {}", output.path.display()))?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(markdown.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet && !cli.json {
        print_summary(&snapshot, cli.output.as_ref(), started.elapsed(), show_progress);
    }

    if snapshot.status == JobStatus::Failed {
        anyhow::bail!(
            "Translation failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn print_summary(
    snapshot: &JobSnapshot,
    output: Option<&PathBuf>,
    elapsed: Duration,
    show_progress: bool,
) {
    // The progress callback already printed the per-chunk log and a tick.
    if !show_progress {
        eprintln!(
            "Translated {}/{} chunks ({} pages) in {:.1}s",
            snapshot.completed_chunks,
            snapshot.total_chunks,
            snapshot.total_pages,
            elapsed.as_secs_f64()
        );
        for chunk in snapshot.chunks.iter().filter(|c| c.error.is_some()) {
            eprintln!(
                "  chunk {} (pages {:?}): {}",
                chunk.index + 1,
                chunk.pages,
                chunk.error.as_deref().unwrap_or_default()
            );
        }
    }
    if let (Some(path), Some(out)) = (output, &snapshot.output) {
        eprintln!(
            "{}  {} pages  {}  →  {}",
            if snapshot.failed_chunks == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            out.pages,
            dim(&format!("{} bytes", out.bytes)),
            bold(&path.display().to_string()),
        );
    }
}

/// Map CLI args to `TranslationConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<TranslationConfig> {
    if !(cli.launch_interval.is_finite() && cli.launch_interval >= 0.0) {
        anyhow::bail!("--launch-interval must be a non-negative number of seconds");
    }
    if !(cli.retry_delay.is_finite() && cli.retry_delay >= 0.0) {
        anyhow::bail!("--retry-delay must be a non-negative number of seconds");
    }

    let mut builder = TranslationConfig::builder()
        .group_size(cli.pages_per_chunk as usize)
        .max_concurrent(cli.concurrency as usize)
        .launch_interval(Duration::from_secs_f64(cli.launch_interval))
        .max_retries(cli.max_retries)
        .retry_base_delay(Duration::from_secs_f64(cli.retry_delay))
        .source_language(cli.source_language.as_str())
        .target_language(cli.target_language.as_str())
        .page_marker(parse_marker(&cli.marker))
        .skip_blank_pages(!cli.keep_blank_pages)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.as_str());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.as_str());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--marker` into a `PageMarker`.
fn parse_marker(s: &str) -> PageMarker {
    match s.to_lowercase().as_str() {
        "comment" => PageMarker::Comment,
        "heading" | "h2" => PageMarker::Heading,
        _ => PageMarker::Custom(s.to_string()),
    }
}
