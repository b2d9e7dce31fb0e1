//! CLI binary for edgequake-md2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and reports results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2pdf::config::MAX_TIMEOUT_SECS;
use edgequake_md2pdf::{
    convert_to_file, prepare, read_input, ConversionConfig, ConversionProgressCallback,
    ConversionStats, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Stylesheet used when `--css` is not given.
const DEFAULT_CSS: &str = include_str!("../../assets/default.css");

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner naming the current stage, plus one
/// log line per slow stage as it completes.
struct CliProgressCallback {
    spinner: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        spinner.set_style(style);
        spinner.set_prefix("Preparing");
        spinner.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { spinner })
    }

    fn describe(stage: Stage) -> &'static str {
        match stage {
            Stage::Setup => "Reading input…",
            Stage::Parse => "Parsing Markdown…",
            Stage::Reinject => "Placing diagrams…",
            Stage::Assemble => "Assembling HTML…",
            Stage::Launch => "Starting Chromium…",
            Stage::Load => "Loading document…",
            Stage::DiagramWait => "Rendering diagrams…",
            Stage::Export => "Printing PDF…",
            Stage::Write => "Writing file…",
        }
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self) {
        self.spinner.set_prefix("Converting");
    }

    fn on_stage_start(&self, stage: Stage) {
        self.spinner.set_message(Self::describe(stage));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        // The pure stages finish in microseconds; only log the browser ones.
        if matches!(
            stage,
            Stage::Launch | Stage::Load | Stage::DiagramWait | Stage::Export
        ) {
            self.spinner.println(format!(
                "  {} {:<13} {}",
                green("✓"),
                stage,
                dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
            ));
        }
    }

    fn on_conversion_complete(&self, _stats: &ConversionStats) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgressCallback {
    fn drop(&mut self) {
        // Failed conversions never reach on_conversion_complete.
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (writes notes.pdf next to notes.md)
  md2pdf notes.md

  # Custom output path and stylesheet
  md2pdf README.md -o out/readme.pdf --css print.css

  # Inside Docker / CI, where Chromium's sandbox is unavailable
  md2pdf --no-sandbox report.md

  # Inspect the HTML that would be printed (no browser needed)
  md2pdf --html-only report.md -o report.html

  # Machine-readable stats
  md2pdf --json report.md > stats.json

DIAGRAMS:
  Fenced blocks tagged `mermaid` are rendered by Mermaid inside the page.
  md2pdf waits until every diagram has produced its SVG, up to
  --diagram-timeout seconds, then fails rather than print a half-rendered page.

PAGE FORMAT:
  Always A4 portrait, margins 20 mm top/bottom and 15 mm left/right, with
  backgrounds printed. CSS @page sizes are ignored.

ENVIRONMENT VARIABLES:
  CHROME                  Path to Chrome/Chromium (used when --chrome is not set)
  RUST_LOG                Override log filter (e.g. edgequake_md2pdf=debug)
  MD2PDF_*                Every flag can also be set via its MD2PDF_ variable
"#;

/// Convert Markdown files to PDF with headless Chromium.
#[derive(Parser, Debug)]
#[command(
    name = "md2pdf",
    version,
    about = "Convert Markdown (with Mermaid diagrams) to PDF using headless Chromium",
    long_about = "Convert Markdown documents to print-ready PDF. Code blocks are syntax-highlighted, \
fenced Mermaid diagrams are rendered in the page, and the result is printed to A4 by a headless \
Chrome or Chromium.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file to convert.
    input: PathBuf,

    /// Output path. Default: the input with a `.pdf` (or `.html`) extension.
    #[arg(short, long, env = "MD2PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// CSS file embedded into the document. Default: a bundled GitHub-like style.
    #[arg(long, env = "MD2PDF_CSS")]
    css: Option<PathBuf>,

    /// Document title. Default: the first level-1 heading.
    #[arg(long, env = "MD2PDF_TITLE")]
    title: Option<String>,

    /// Fence language tag that marks a diagram.
    #[arg(long, env = "MD2PDF_DIAGRAM_LANGUAGE", default_value = "mermaid")]
    diagram_language: String,

    /// Mermaid script URL.
    #[arg(long, env = "MD2PDF_MERMAID_URL")]
    mermaid_url: Option<String>,

    /// Mermaid theme (default, neutral, dark, forest).
    #[arg(long, env = "MD2PDF_MERMAID_THEME", default_value = "default")]
    mermaid_theme: String,

    /// syntect theme for code blocks.
    #[arg(long, env = "MD2PDF_SYNTAX_THEME", conflicts_with = "no_syntax_theme")]
    syntax_theme: Option<String>,

    /// Embed no code-highlighting CSS; leave code styling to --css.
    #[arg(long, env = "MD2PDF_NO_SYNTAX_THEME")]
    no_syntax_theme: bool,

    /// Seconds to wait for diagrams before failing.
    #[arg(long, env = "MD2PDF_DIAGRAM_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    diagram_timeout: u64,

    /// Milliseconds between diagram readiness checks (10–5000).
    #[arg(long, env = "MD2PDF_POLL_INTERVAL", default_value_t = 100)]
    poll_interval: u64,

    /// Milliseconds to pause after diagrams are ready, before printing.
    #[arg(long, env = "MD2PDF_SETTLE_DELAY", default_value_t = 500)]
    settle_delay: u64,

    /// Seconds to wait for the page to load.
    #[arg(long, env = "MD2PDF_LOAD_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS))]
    load_timeout: u64,

    /// Path to the Chrome/Chromium executable.
    #[arg(long, env = "MD2PDF_CHROME")]
    chrome: Option<PathBuf>,

    /// Disable Chromium's sandbox (needed in most containers).
    #[arg(long, env = "MD2PDF_NO_SANDBOX")]
    no_sandbox: bool,

    /// Write the assembled HTML instead of a PDF. No browser is launched.
    #[arg(long, env = "MD2PDF_HTML_ONLY")]
    html_only: bool,

    /// Print conversion stats as JSON on stdout.
    #[arg(long, env = "MD2PDF_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "MD2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; it
    // provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.html_only;
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

    // ── Inputs ───────────────────────────────────────────────────────────
    let markdown = read_input(&cli.input)
        .await
        .context("Failed to read Markdown input")?;

    let stylesheet = match cli.css {
        Some(ref path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read stylesheet from {:?}", path))?,
        None => DEFAULT_CSS.to_string(),
    };

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── HTML-only mode ───────────────────────────────────────────────────
    if cli.html_only {
        let output_path = cli
            .output
            .clone()
            .unwrap_or_else(|| default_output(&cli.input, "html"));
        let prepared = prepare(&markdown, &stylesheet, &config).context("Conversion failed")?;
        tokio::fs::write(&output_path, prepared.document.html())
            .await
            .with_context(|| format!("Failed to write {:?}", output_path))?;

        if cli.json {
            let summary = serde_json::json!({
                "output": output_path,
                "diagram_count": prepared.diagram_count,
                "code_blocks": prepared.code_blocks,
                "highlighted_blocks": prepared.highlighted_blocks,
                "degradations": prepared.degradations,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialise stats")?
            );
        } else if !cli.quiet {
            eprintln!(
                "{}  {} diagram(s)  →  {}",
                green("✔"),
                prepared.diagram_count,
                bold(&output_path.display().to_string()),
            );
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let output_path = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.input, "pdf"));

    let artifact = convert_to_file(&markdown, &stylesheet, &output_path, &config)
        .await
        .context("Conversion failed")?;
    let written = artifact
        .path()
        .map(Path::to_path_buf)
        .unwrap_or(output_path);

    if cli.json {
        let summary = serde_json::json!({
            "output": written,
            "stats": artifact.stats,
            "degradations": artifact.degradations,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise stats")?
        );
        return Ok(());
    }

    if !cli.quiet {
        for d in &artifact.degradations {
            eprintln!("  {} {}", yellow("⚠"), d);
        }
        let stats = &artifact.stats;
        eprintln!(
            "{}  {} diagram(s)  {} code block(s)  {}ms  →  {}",
            green("✔"),
            stats.diagram_count,
            stats.code_blocks,
            stats.total_ms,
            bold(&written.display().to_string()),
        );
        eprintln!(
            "   {}  {}",
            cyan(&format!("{} KiB", stats.pdf_bytes.div_ceil(1024))),
            dim(&format!("render {}ms", stats.render_ms)),
        );
    }

    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .diagram_language(cli.diagram_language.clone())
        .diagram_theme(cli.mermaid_theme.clone())
        .diagram_timeout_secs(cli.diagram_timeout)
        .poll_interval_ms(cli.poll_interval)
        .settle_delay_ms(cli.settle_delay)
        .load_timeout_secs(cli.load_timeout)
        .sandbox(!cli.no_sandbox);

    if let Some(ref url) = cli.mermaid_url {
        builder = builder.diagram_script_url(url.clone());
    }
    if cli.no_syntax_theme {
        builder = builder.syntax_theme(None);
    } else if let Some(ref theme) = cli.syntax_theme {
        builder = builder.syntax_theme(Some(theme.clone()));
    }
    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    if let Some(ref chrome) = cli.chrome {
        builder = builder.chrome_executable(chrome.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `notes.md` → `notes.{ext}`, in the same directory.
fn default_output(input: &Path, ext: &str) -> PathBuf {
    input.with_extension(ext)
}
