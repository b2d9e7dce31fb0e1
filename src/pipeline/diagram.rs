//! Diagram extraction and reinjection.
//!
//! The parser never flattens a diagram fence into text. It registers the
//! fence with an [`ExtractionContext`] and records a [`Segment::Diagram`]
//! node in the [`Fragment`]; [`reinject`] later renders that node as a
//! diagram container. Because the placeholder is a typed node rather than a
//! marker string inside generated markup, there is no wrapper to pattern-match
//! away and no literal document text it could collide with.
//!
//! ```text
//! parse:    [Markup "<h1>…</h1>"] [Diagram #0] [Markup "<p>…</p>"] [Diagram #1]
//! reinject: <h1>…</h1><div class="mermaid">graph TD; A--&gt;B</div><p>…</p>…
//! ```

use crate::error::Md2PdfError;
use tracing::debug;

/// A diagram fence lifted out of the Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagramBlock {
    /// 0-based, in order of first occurrence in the source.
    pub index: usize,
    /// Fence contents exactly as written, unescaped.
    pub source: String,
}

/// Stands in for one [`DiagramBlock`] inside a [`Fragment`].
///
/// Only an [`ExtractionContext`] can mint tokens, so within one parse every
/// token maps to exactly one block and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderToken {
    index: usize,
}

impl PlaceholderToken {
    pub fn index(self) -> usize {
        self.index
    }
}

/// Per-parse allocator for diagram indices.
///
/// Lives for exactly one [`crate::pipeline::parse::parse_markdown`] call and
/// is consumed by [`ExtractionContext::into_blocks`]; nothing is global.
#[derive(Debug, Default)]
pub struct ExtractionContext {
    blocks: Vec<DiagramBlock>,
}

impl ExtractionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagram fence and return its placeholder.
    pub fn register(&mut self, source: impl Into<String>) -> PlaceholderToken {
        let index = self.blocks.len();
        self.blocks.push(DiagramBlock {
            index,
            source: source.into(),
        });
        PlaceholderToken { index }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn into_blocks(self) -> Vec<DiagramBlock> {
        self.blocks
    }
}

/// One piece of intermediate body markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Final HTML, emitted as-is.
    Markup(String),
    /// A diagram to be rendered as a container.
    Diagram(PlaceholderToken),
}

/// Intermediate body: HTML interleaved with diagram placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    segments: Vec<Segment>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append markup, merging with a preceding markup segment.
    pub fn push_markup(&mut self, html: impl Into<String>) {
        let html = html.into();
        if html.is_empty() {
            return;
        }
        match self.segments.last_mut() {
            Some(Segment::Markup(prev)) => prev.push_str(&html),
            _ => self.segments.push(Segment::Markup(html)),
        }
    }

    pub fn push_diagram(&mut self, token: PlaceholderToken) {
        self.segments.push(Segment::Diagram(token));
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of diagram placeholders in the fragment.
    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Diagram(_)))
            .count()
    }
}

/// Render a fragment to final HTML, replacing every placeholder with
/// `<div class="{container_class}">{escaped source}</div>`.
///
/// # Errors
/// [`Md2PdfError::UnresolvedDiagram`] if a placeholder's index has no entry in
/// `blocks`. This only happens when a fragment is paired with the blocks of a
/// different parse; the placeholder is never written through to the output.
pub fn reinject(
    fragment: Fragment,
    blocks: &[DiagramBlock],
    container_class: &str,
) -> Result<String, Md2PdfError> {
    let (html, containers) = render_segments(fragment, blocks, container_class)?;
    debug!("Reinjected {} diagram container(s)", containers);
    Ok(html)
}

/// [`reinject`] plus the number of containers actually written.
fn render_segments(
    fragment: Fragment,
    blocks: &[DiagramBlock],
    container_class: &str,
) -> Result<(String, usize), Md2PdfError> {
    let capacity = fragment
        .segments
        .iter()
        .map(|s| match s {
            Segment::Markup(html) => html.len(),
            Segment::Diagram(_) => 64,
        })
        .sum::<usize>()
        + blocks.iter().map(|b| b.source.len()).sum::<usize>();
    let mut html = String::with_capacity(capacity);
    let mut containers = 0;

    for segment in fragment.segments {
        match segment {
            Segment::Markup(markup) => html.push_str(&markup),
            Segment::Diagram(token) => {
                let block = blocks
                    .get(token.index)
                    .filter(|b| b.index == token.index)
                    .ok_or(Md2PdfError::UnresolvedDiagram { index: token.index })?;
                push_container(&mut html, container_class, &block.source);
                containers += 1;
            }
        }
    }

    Ok((html, containers))
}

fn push_container(out: &mut String, class: &str, source: &str) {
    out.push_str("<div class=\"");
    out.push_str(&escape_html(class));
    out.push_str("\">");
    out.push_str(&escape_html(source));
    out.push_str("</div>\n");
}

/// Escape `&`, `<`, `>` and `"` for HTML text and attribute values.
///
/// Applied exactly once to raw text: `<` becomes `&lt;`, and an input that
/// already reads `&lt;` becomes `&amp;lt;`, which is how the literal text
/// `&lt;` must be written.
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}
