//! Pipeline stages for Markdown-to-PDF conversion.
//!
//! Each submodule implements exactly one transformation step, and the only
//! value handed from one stage to a later one is the ordered list of
//! [`diagram::DiagramBlock`]s returned by the parser.
//!
//! ## Data Flow
//!
//! ```text
//! parse ──▶ diagram ──▶ assemble ──▶ render
//! (GFM+syntect) (reinject)  (HTML shell)  (Chromium → PDF)
//! ```
//!
//! 1. [`parse`]   : Markdown → typed fragment + diagram blocks; code fences
//!    highlighted through [`highlight`]
//! 2. [`diagram`] : replace placeholder nodes with escaped diagram containers
//! 3. [`assemble`]: wrap the body in a full HTML document; add the diagram
//!    bootstrap only when diagrams exist
//! 4. [`render`]  : drive headless Chromium, wait for diagrams, print to PDF;
//!    the only stage with I/O

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod assemble;
pub mod diagram;
pub mod highlight;
pub mod parse;
pub mod render;

/// A named step of one conversion, used in errors and progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// Input reading and config validation, before the pipeline proper.
    Setup,
    Parse,
    Reinject,
    Assemble,
    Launch,
    Load,
    DiagramWait,
    Export,
    Write,
}

impl Stage {
    /// Stable kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Parse => "parse",
            Stage::Reinject => "reinject",
            Stage::Assemble => "assemble",
            Stage::Launch => "launch",
            Stage::Load => "load",
            Stage::DiagramWait => "diagram-wait",
            Stage::Export => "export",
            Stage::Write => "write",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
