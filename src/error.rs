//! Error types for the edgequake-md2pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2PdfError`]: **Fatal**: the conversion cannot produce a PDF
//!   (browser missing, diagrams never rendered, print failed). Returned as
//!   `Err(Md2PdfError)` from the top-level `convert*` functions.
//!
//! * [`Degradation`]: **Non-fatal**: output quality dropped somewhere (an
//!   unknown fence language, a line syntect could not highlight) but the
//!   document still converts. Collected in
//!   [`crate::output::ConversionOutput::degradations`] so callers can report
//!   them without losing the PDF.

use crate::pipeline::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-md2pdf library.
///
/// Every variant maps to exactly one [`Stage`] via [`Md2PdfError::stage`], so
/// a caller can tell *where* the conversion stopped without parsing messages.
#[derive(Debug, Error)]
pub enum Md2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input Markdown file was not found at the given path.
    #[error("Markdown file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Input exists but could not be read (permissions, invalid UTF-8).
    #[error("Failed to read '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// A diagram placeholder has no matching diagram block.
    ///
    /// Only reachable when a fragment is paired with the block list of a
    /// different parse; the pipeline never leaves a token in the output.
    #[error("[{stage}] diagram placeholder #{index} has no matching diagram block", stage = Stage::Reinject)]
    UnresolvedDiagram { index: usize },

    // ── Browser errors ────────────────────────────────────────────────────
    /// The headless browser could not be started.
    #[error(
        "[{stage}] failed to launch headless Chromium: {detail}\n\n\
Make sure Chrome or Chromium is installed, or point --chrome at the binary.\n\
Inside containers and CI sandboxes, retry with --no-sandbox.",
        stage = Stage::Launch
    )]
    LaunchFailed { detail: String },

    /// The assembled document could not be loaded or never settled.
    #[error("[{stage}] failed to load the document: {detail}", stage = Stage::Load)]
    LoadFailed { detail: String },

    /// Diagrams did not finish rendering before the deadline.
    #[error(
        "[{stage}] {diagrams} diagram(s) not rendered after {timeout_ms}ms\n\
Check the diagram syntax and that the diagram script URL is reachable.",
        stage = Stage::DiagramWait
    )]
    DiagramRenderTimeout { diagrams: usize, timeout_ms: u64 },

    /// The diagram readiness check itself failed (page crashed, CDP error).
    #[error("[{stage}] diagram readiness check failed: {detail}", stage = Stage::DiagramWait)]
    DiagramCheckFailed { detail: String },

    /// Printing to PDF failed or produced no bytes.
    #[error("[{stage}] PDF export failed: {detail}", stage = Stage::Export)]
    ExportFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("[{stage}] failed to write output file '{path}': {source}", stage = Stage::Write)]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Md2PdfError {
    /// The pipeline stage this error aborted.
    pub fn stage(&self) -> Stage {
        match self {
            Md2PdfError::InputNotFound { .. }
            | Md2PdfError::InputReadFailed { .. }
            | Md2PdfError::InvalidConfig(_)
            | Md2PdfError::Internal(_) => Stage::Setup,
            Md2PdfError::UnresolvedDiagram { .. } => Stage::Reinject,
            Md2PdfError::LaunchFailed { .. } => Stage::Launch,
            Md2PdfError::LoadFailed { .. } => Stage::Load,
            Md2PdfError::DiagramRenderTimeout { .. } | Md2PdfError::DiagramCheckFailed { .. } => {
                Stage::DiagramWait
            }
            Md2PdfError::ExportFailed { .. } => Stage::Export,
            Md2PdfError::OutputWriteFailed { .. } => Stage::Write,
        }
    }
}

/// A non-fatal loss of output quality.
///
/// Collected during parsing and returned alongside the PDF. None of these
/// abort the conversion.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum Degradation {
    /// The fence named a language syntect does not know; auto-detection
    /// found nothing either and the block was rendered as plain text.
    #[error("code block {block}: unknown language '{tag}', rendered as plain text")]
    UnknownLanguage { block: usize, tag: String },

    /// The fence had no usable language tag; syntax was guessed from the
    /// first line.
    #[error("code block {block}: no language tag, detected '{detected}'")]
    AutoDetected { block: usize, detected: String },

    /// syntect failed part-way through a block; the block was emitted as
    /// escaped plain text instead.
    #[error("code block {block}: highlighting failed: {detail}")]
    HighlightFailed { block: usize, detail: String },
}
