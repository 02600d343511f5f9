//! CLI binary for ocr2doc.
//!
//! A thin shim over the library crate that maps CLI flags to `OcrConfig`,
//! drives one task through the engine, and renders its event stream.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ocr2doc::{
    DocumentContent, OcrConfig, OcrEngine, OcrMode, OutputFormat, RemoteBackend, TaskEvent,
    TaskOutcome,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────

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

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a single image to stdout
  ocr2doc scan.png

  # Locate a term in an image (grounded boxes on stderr)
  ocr2doc --mode find --find "Total amount" invoice.jpg

  # Convert a PDF to markdown
  ocr2doc report.pdf -o report.md

  # Convert a PDF to JSON with boxes and figure counts
  ocr2doc --format json report.pdf > report.json

  # Point at a different serving endpoint
  ocr2doc --endpoint http://gpu-box:8000/v1 scan.png

  # Probe the endpoint without running anything
  ocr2doc --test-connection scan.png

ENVIRONMENT VARIABLES:
  OCR2DOC_ENDPOINT   Serving endpoint base URL
  OCR2DOC_MODEL      Model identifier on the endpoint
  OCR2DOC_API_KEY    Bearer token, if the endpoint requires one
"#;

/// Grounded OCR for images and documents via DeepSeek-OCR.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2doc",
    version,
    about = "Grounded OCR for images and PDF documents",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Image (png/jpg) or PDF document.
    input: PathBuf,

    /// Write output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Document output format: markdown, html, docx, json.
    #[arg(long, default_value = "markdown")]
    format: String,

    /// Image OCR mode: plain, markdown, freeform, find, kv.
    #[arg(long, default_value = "plain")]
    mode: String,

    /// Custom instruction (freeform mode).
    #[arg(long)]
    prompt: Option<String>,

    /// Term to locate (find mode).
    #[arg(long)]
    find: Option<String>,

    /// JSON schema to extract into (kv mode).
    #[arg(long)]
    schema: Option<String>,

    /// Ask for grounded boxes in plain mode.
    #[arg(long)]
    grounding: bool,

    /// Append a one-sentence image caption.
    #[arg(long)]
    caption: bool,

    /// Serving endpoint base URL.
    #[arg(long, env = "OCR2DOC_ENDPOINT", default_value = "http://localhost:8000/v1")]
    endpoint: String,

    /// Model identifier on the endpoint.
    #[arg(long, env = "OCR2DOC_MODEL")]
    model: Option<String>,

    /// Bearer token for the endpoint.
    #[arg(long, env = "OCR2DOC_API_KEY")]
    api_key: Option<String>,

    /// Document rendering DPI (72-400).
    #[arg(long, default_value_t = 144,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Skip figure extraction on document pages.
    #[arg(long)]
    no_extract_images: bool,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 120)]
    timeout: u64,

    /// Inference attempts per request.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,

    /// Probe the endpoint and exit.
    #[arg(long)]
    test_connection: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long)]
    quiet: bool,
}

fn is_document(path: &PathBuf) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn parse_mode(cli: &Cli) -> Result<OcrMode> {
    Ok(match cli.mode.to_lowercase().as_str() {
        "plain" => OcrMode::PlainOcr,
        "markdown" | "md" => OcrMode::Markdown,
        "freeform" => OcrMode::Freeform,
        "find" => OcrMode::FindRef,
        "kv" | "json" => OcrMode::KvJson,
        other => bail!("Unknown mode '{other}' (expected plain, markdown, freeform, find, kv)"),
    })
}

fn page_bar() -> Option<ProgressBar> {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  "),
    );
    bar.set_prefix("Processing");
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress bar and INFO logs fight over the terminal; the bar wins.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    let mut builder = OcrConfig::builder()
        .endpoint(&cli.endpoint)
        .request_timeout_secs(cli.timeout)
        .max_retries(cli.max_retries)
        .dpi(cli.dpi)
        .extract_images(!cli.no_extract_images)
        .include_caption(cli.caption);
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    let config = builder.build().context("Invalid configuration")?;

    let backend = Arc::new(RemoteBackend::new(&config).context("Failed to create client")?);
    let mut engine = OcrEngine::new(config, backend);

    if cli.test_connection {
        let status = engine.test_connection().await?;
        if status.ok {
            eprintln!("{} {}", green("✔"), status.message);
            return Ok(());
        }
        eprintln!("{} {}", red("✘"), status.message);
        std::process::exit(1);
    }

    let mut events = if is_document(&cli.input) {
        let format = OutputFormat::from_str(&cli.format).context("Invalid output format")?;
        engine.submit_document(&cli.input, format).await
    } else {
        let mode = parse_mode(&cli)?;
        let mut params = engine.params(mode);
        params.grounding = cli.grounding;
        params.prompt_text = cli.prompt.clone().unwrap_or_default();
        params.search_term = cli.find.clone();
        params.schema = cli.schema.clone();
        engine.submit_image(&cli.input, params).await
    };

    let bar = if is_document(&cli.input) && show_progress {
        page_bar()
    } else {
        None
    };
    let mut outcome = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    TaskEvent::Progress(msg) => {
                        if let Some(ref bar) = bar {
                            bar.set_message(msg);
                        } else if !cli.quiet {
                            eprintln!("{}", dim(&msg));
                        }
                    }
                    TaskEvent::PageProgress { current, total } => {
                        if let Some(ref bar) = bar {
                            bar.set_length(total as u64);
                            bar.set_position((current - 1) as u64);
                        }
                    }
                    TaskEvent::PageComplete { page, summary } => {
                        if let Some(ref bar) = bar {
                            bar.println(format!(
                                "  {} Page {:>3}  {}  {}",
                                green("✓"),
                                page,
                                dim(&format!("{:>5} chars", summary.text_chars)),
                                dim(&format!("{} figures", summary.extracted_images)),
                            ));
                            bar.inc(1);
                        }
                    }
                    TaskEvent::Finished(result) => outcome = Some(result),
                    TaskEvent::Cancelled => {
                        if let Some(ref bar) = bar {
                            bar.finish_and_clear();
                        }
                        bail!("Processing cancelled");
                    }
                    TaskEvent::Error(err) => {
                        if let Some(ref bar) = bar {
                            bar.finish_and_clear();
                        }
                        bail!("{err}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                engine.cancel();
                if !cli.quiet {
                    eprintln!("{}", dim("cancelling at next page boundary..."));
                }
            }
        }
    }

    if let Some(ref bar) = bar {
        bar.finish_and_clear();
    }

    match outcome {
        Some(TaskOutcome::Image(result)) => {
            write_output(cli.output.as_deref(), result.display_text.as_bytes())?;
            if !cli.quiet && !result.detections.is_empty() {
                eprintln!("{}", bold(&format!("{} detections:", result.detections.len())));
                for det in &result.detections {
                    let [x1, y1, x2, y2] = det.box_;
                    eprintln!("  {} [{x1}, {y1}, {x2}, {y2}]", det.label);
                }
            }
        }
        Some(TaskOutcome::Document(result)) => {
            match &result.content {
                DocumentContent::Text(text) => {
                    write_output(cli.output.as_deref(), text.as_bytes())?;
                }
                DocumentContent::Binary(bytes) => {
                    let path = cli.output.as_deref().context(
                        "Binary output formats require --output; refusing to write to stdout",
                    )?;
                    std::fs::write(path, bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
            }
            if !cli.quiet {
                eprintln!(
                    "{} {} pages, {} figures extracted",
                    green("✔"),
                    bold(&result.pages.len().to_string()),
                    result.extracted_image_count,
                );
            }
        }
        None => bail!("Task ended without a result"),
    }

    Ok(())
}

fn write_output(path: Option<&std::path::Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(bytes).context("Failed to write to stdout")?;
            if !bytes.ends_with(b"\n") {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}
