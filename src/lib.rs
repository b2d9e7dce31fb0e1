//! # edgequake-md2pdf
//!
//! Convert Markdown documents, including Mermaid diagrams, to PDF using
//! headless Chromium.
//!
//! ## Why this crate?
//!
//! Markdown renderers produce HTML; PDF needs a layout engine. Rather than
//! reimplementing CSS layout, this crate assembles a self-contained HTML
//! document and asks a real browser to print it. Code blocks are
//! highlighted ahead of time with syntect, and diagram fences are handed to
//! Mermaid inside the page, so what you print is what a browser would show.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Parse     GFM → HTML fragment; diagram fences become typed placeholders,
//!  │               other code blocks are highlighted with syntect
//!  ├─ 2. Reinject  placeholders → <div class="mermaid">escaped source</div>
//!  ├─ 3. Assemble  stylesheet + body (+ Mermaid bootstrap only if diagrams exist)
//!  ├─ 4. Render    Chromium: load → wait for diagrams (bounded) → print A4
//!  └─ 5. Output    PDF bytes + HTML + degradations + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2pdf::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let markdown = "# Hello\n\n```mermaid\ngraph TD; A-->B\n```\n";
//!     let config = ConversionConfig::default();
//!     let output = convert(markdown, "body { font-family: sans-serif; }", &config).await?;
//!     std::fs::write("hello.pdf", &output.pdf)?;
//!     eprintln!("{} diagram(s), {}ms", output.stats.diagram_count, output.stats.total_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-md2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Running without a sandbox
//!
//! Chromium's sandbox needs user namespaces, which most containers and CI
//! runners do not grant. Set [`ConversionConfigBuilder::sandbox`] to `false`
//! (CLI: `--no-sandbox`) there.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{
    convert, convert_sync, convert_to_file, convert_with_launcher, prepare, read_input,
    render_html, PreparedDocument,
};
pub use error::{Degradation, Md2PdfError};
pub use output::{ConversionOutput, ConversionStats, ExportedArtifact};
pub use pipeline::assemble::RenderableDocument;
pub use pipeline::render::{
    ChromiumLauncher, PdfFormat, RenderPhase, RenderSurface, SurfaceLauncher,
};
pub use pipeline::Stage;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
