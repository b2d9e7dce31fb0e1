//! Conversion entry points.
//!
//! ## Why split prepare from render?
//!
//! Parsing, diagram reinjection and assembly are pure and take
//! milliseconds; the browser stages take seconds and need Chromium.
//! [`render_html`] runs only the first half, so callers can inspect or
//! serve the HTML without a browser. [`convert_with_launcher`] runs both
//! halves against any [`SurfaceLauncher`], which is how the tests drive the
//! pipeline without Chromium.

use crate::config::ConversionConfig;
use crate::error::{Degradation, Md2PdfError};
use crate::output::{ConversionOutput, ConversionStats, ExportedArtifact};
use crate::pipeline::assemble::{self, RenderableDocument};
use crate::pipeline::render::{self, ChromiumLauncher, SurfaceLauncher};
use crate::pipeline::{diagram, parse, Stage};
use crate::progress::StageTimer;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output of the browser-free half of the pipeline.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub document: RenderableDocument,
    pub degradations: Vec<Degradation>,
    pub diagram_count: usize,
    pub code_blocks: usize,
    pub highlighted_blocks: usize,
    pub parse_ms: u64,
}

/// Convert Markdown to PDF with headless Chromium.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `markdown`  : Markdown source text
/// * `stylesheet`: CSS embedded verbatim in the document
/// * `config`    : Conversion configuration
///
/// # Errors
/// Any fatal [`Md2PdfError`]. Unknown code languages and similar are not
/// errors; see [`ConversionOutput::degradations`].
pub async fn convert(
    markdown: &str,
    stylesheet: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let launcher = ChromiumLauncher::from_config(config);
    convert_with_launcher(markdown, stylesheet, &launcher, config).await
}

/// Convert Markdown to PDF on a surface provided by `launcher`.
pub async fn convert_with_launcher<L: SurfaceLauncher>(
    markdown: &str,
    stylesheet: &str,
    launcher: &L,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    let total_start = Instant::now();
    info!("Starting conversion: {} bytes of Markdown", markdown.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start();
    }

    // ── Steps 1-3: Parse, reinject, assemble ─────────────────────────────
    let prepared = prepare(markdown, stylesheet, config)?;
    for d in &prepared.degradations {
        warn!("{}", d);
    }

    // ── Step 4: Render ───────────────────────────────────────────────────
    let render_start = Instant::now();
    let outcome = render::render_document(
        &prepared.document,
        launcher,
        &config.render_options(),
        config.progress_callback.as_ref(),
    )
    .await?;
    let render_ms = render_start.elapsed().as_millis() as u64;

    // ── Step 5: Stats ────────────────────────────────────────────────────
    let stats = ConversionStats {
        diagram_count: prepared.diagram_count,
        code_blocks: prepared.code_blocks,
        highlighted_blocks: prepared.highlighted_blocks,
        pdf_bytes: outcome.pdf.len(),
        parse_ms: prepared.parse_ms,
        render_ms,
        total_ms: total_start.elapsed().as_millis() as u64,
        phases: outcome.phases,
    };

    info!(
        "Conversion complete: {} diagram(s), {} bytes, {}ms total",
        stats.diagram_count, stats.pdf_bytes, stats.total_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(&stats);
    }

    Ok(ConversionOutput {
        pdf: outcome.pdf,
        html: prepared.document.into_html(),
        degradations: prepared.degradations,
        stats,
    })
}

/// Run parse, reinject and assemble. No browser is involved.
pub fn prepare(
    markdown: &str,
    stylesheet: &str,
    config: &ConversionConfig,
) -> Result<PreparedDocument, Md2PdfError> {
    let start = Instant::now();
    let progress = config.progress_callback.as_ref();

    let timer = StageTimer::start(progress, Stage::Parse);
    let parsed = parse::parse_markdown(markdown, &config.parse_options());
    timer.finish();

    let diagram_count = parsed.blocks.len();
    let has_diagrams = parsed.has_diagrams();
    let assemble_options = config.assemble_options(parsed.title.as_deref());

    let timer = StageTimer::start(progress, Stage::Reinject);
    let body = diagram::reinject(parsed.fragment, &parsed.blocks, &config.diagram_language)?;
    timer.finish();

    let timer = StageTimer::start(progress, Stage::Assemble);
    let document = assemble::assemble(&body, stylesheet, has_diagrams, &assemble_options);
    timer.finish();

    let parse_ms = start.elapsed().as_millis() as u64;
    debug!(
        "Prepared document in {}ms: {} diagram(s), {} code block(s)",
        parse_ms, diagram_count, parsed.code_blocks
    );

    Ok(PreparedDocument {
        document,
        degradations: parsed.degradations,
        diagram_count,
        code_blocks: parsed.code_blocks,
        highlighted_blocks: parsed.highlighted_blocks,
        parse_ms,
    })
}

/// Build the HTML document that would be printed, without a browser.
pub fn render_html(
    markdown: &str,
    stylesheet: &str,
    config: &ConversionConfig,
) -> Result<RenderableDocument, Md2PdfError> {
    prepare(markdown, stylesheet, config).map(|p| p.document)
}

/// Convert Markdown and write the PDF to `output_path`.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn convert_to_file(
    markdown: &str,
    stylesheet: &str,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ExportedArtifact, Md2PdfError> {
    let output = convert(markdown, stylesheet, config).await?;
    let path = output_path.as_ref();

    let timer = StageTimer::start(config.progress_callback.as_ref(), Stage::Write);
    let resolved = write_atomic(path, &output.pdf).await?;
    timer.finish();
    info!("Wrote {} bytes to {}", output.pdf.len(), resolved.display());

    let mut artifact = output.into_artifact();
    artifact.path = Some(resolved);
    Ok(artifact)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    markdown: &str,
    stylesheet: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2PdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Md2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(markdown, stylesheet, config))
}

/// Read a Markdown file as UTF-8.
pub async fn read_input(path: impl AsRef<Path>) -> Result<String, Md2PdfError> {
    let path = path.as_ref();
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(Md2PdfError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Md2PdfError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Write `bytes` next to `path` and rename into place. Returns the
/// canonical location of the written file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<PathBuf, Md2PdfError> {
    let write_err = |e| Md2PdfError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }

    Ok(tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_html_without_diagrams_has_no_script() {
        let doc = render_html("# Hi\n\nplain\n", "", &ConversionConfig::default()).unwrap();
        assert!(!doc.has_diagrams());
        assert!(!doc.html().contains("<script"));
        assert!(doc.html().contains("<title>Hi</title>"));
    }

    #[test]
    fn prepare_counts_blocks() {
        let md = "```mermaid\ngraph TD\n```\n\n```python\nprint(1)\n```\n";
        let p = prepare(md, "", &ConversionConfig::default()).unwrap();
        assert_eq!(p.diagram_count, 1);
        assert_eq!(p.code_blocks, 1);
        assert!(p.document.has_diagrams());
        assert_eq!(p.document.html().matches("<div class=\"mermaid\">").count(), 1);
    }

    #[tokio::test]
    async fn write_atomic_replaces_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("out.pdf");

        let first = write_atomic(&target, b"%PDF-old").await.unwrap();
        let second = write_atomic(&target, b"%PDF-new").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-new");
        assert!(!dir.path().join("nested").join("out.pdf.tmp").exists());
    }

    #[tokio::test]
    async fn read_input_missing_file() {
        let err = read_input("/definitely/not/here.md").await.unwrap_err();
        assert!(matches!(err, Md2PdfError::InputNotFound { .. }));
    }
}
