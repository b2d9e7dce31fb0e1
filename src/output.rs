//! Output types returned by the conversion entry points.

use crate::error::Degradation;
use crate::pipeline::render::RenderPhase;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Result of a successful in-memory conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// The exported PDF. Never empty.
    pub pdf: Vec<u8>,
    /// The assembled HTML document that was printed.
    pub html: String,
    /// Non-fatal quality losses encountered while parsing.
    pub degradations: Vec<Degradation>,
    /// Counters and timings.
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Wrap the PDF bytes as an [`ExportedArtifact`] without a location.
    pub fn into_artifact(self) -> ExportedArtifact {
        ExportedArtifact {
            bytes: self.pdf,
            path: None,
            degradations: self.degradations,
            stats: self.stats,
        }
    }
}

/// The terminal product of a conversion: PDF bytes and, when written to
/// disk, where they went.
#[derive(Debug, Clone)]
pub struct ExportedArtifact {
    pub bytes: Vec<u8>,
    /// Resolved output location. `None` for in-memory conversions.
    pub path: Option<PathBuf>,
    pub degradations: Vec<Degradation>,
    pub stats: ConversionStats,
}

impl ExportedArtifact {
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Counters and timings for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Number of diagram fences extracted.
    pub diagram_count: usize,
    /// Non-diagram code blocks (fenced and indented).
    pub code_blocks: usize,
    /// Code blocks rendered with a real syntax rather than plain text.
    pub highlighted_blocks: usize,
    /// Size of the exported PDF.
    pub pdf_bytes: usize,
    /// Time spent in parse + reinject + assemble.
    pub parse_ms: u64,
    /// Time spent driving the browser (launch to close).
    pub render_ms: u64,
    pub total_ms: u64,
    /// Render-engine states visited, in order.
    pub phases: Vec<RenderPhase>,
}
