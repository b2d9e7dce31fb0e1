//! Markdown → typed HTML fragment, with code highlighting and diagram
//! extraction.
//!
//! The event stream from pulldown-cmark is rendered with its own HTML
//! writer, except for code blocks:
//!
//! * a fence tagged with the diagram language is cut out of the stream and
//!   becomes a [`Segment::Diagram`](crate::pipeline::diagram::Segment) node;
//! * every other code block is replaced by a single `Event::Html` carrying
//!   the syntect-highlighted `<pre><code>`.
//!
//! Events between diagrams are buffered and flushed through
//! [`pulldown_cmark::html::push_html`] whenever a diagram is hit. Code blocks
//! cannot occur inside tables and footnotes are not enabled, so no writer
//! state is lost across a flush.

use crate::error::Degradation;
use crate::pipeline::diagram::{DiagramBlock, ExtractionContext, Fragment};
use crate::pipeline::highlight;
use pulldown_cmark::{CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use tracing::debug;

/// Parser settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fence tag that marks a diagram block. Compared exactly.
    pub diagram_language: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            diagram_language: "mermaid".to_string(),
        }
    }
}

/// Everything the parse stage hands to the later stages.
#[derive(Debug, Clone, Default)]
pub struct ParsedMarkdown {
    pub fragment: Fragment,
    /// Diagram fences in source order; `blocks[i].index == i`.
    pub blocks: Vec<DiagramBlock>,
    pub degradations: Vec<Degradation>,
    /// Plain text of the first level-1 heading.
    pub title: Option<String>,
    /// Non-diagram code blocks seen.
    pub code_blocks: usize,
    /// Of those, how many got a real syntax.
    pub highlighted_blocks: usize,
}

impl ParsedMarkdown {
    pub fn has_diagrams(&self) -> bool {
        !self.blocks.is_empty()
    }
}

/// GFM subset: tables, task lists, strikethrough. Soft breaks stay soft.
pub fn gfm_options() -> Options {
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_TABLES);
    opts.insert(Options::ENABLE_TASKLISTS);
    opts.insert(Options::ENABLE_STRIKETHROUGH);
    opts
}

struct OpenCodeBlock {
    tag: Option<String>,
    source: String,
}

#[derive(Default)]
struct TitleCapture {
    active: bool,
    text: String,
    done: Option<String>,
}

impl TitleCapture {
    fn observe(&mut self, event: &Event<'_>) {
        if self.done.is_some() {
            return;
        }
        match event {
            Event::Start(Tag::Heading {
                level: HeadingLevel::H1,
                ..
            }) => self.active = true,
            Event::End(TagEnd::Heading(HeadingLevel::H1)) if self.active => {
                self.active = false;
                let text = self.text.trim();
                if !text.is_empty() {
                    self.done = Some(text.to_string());
                }
                self.text.clear();
            }
            Event::Text(t) | Event::Code(t) if self.active => self.text.push_str(t),
            _ => {}
        }
    }
}

/// Parse Markdown into a fragment plus the ordered diagram blocks.
///
/// Never fails: malformed input degrades per CommonMark, unknown code
/// languages degrade to plain text (see [`ParsedMarkdown::degradations`]).
pub fn parse_markdown(markdown: &str, options: &ParseOptions) -> ParsedMarkdown {
    let mut ctx = ExtractionContext::new();
    let mut fragment = Fragment::new();
    let mut pending: Vec<Event<'_>> = Vec::new();
    let mut open: Option<OpenCodeBlock> = None;
    let mut title = TitleCapture::default();
    let mut degradations = Vec::new();
    let mut code_blocks = 0usize;
    let mut highlighted_blocks = 0usize;

    for event in Parser::new_ext(markdown, gfm_options()) {
        if open.is_some() {
            match event {
                Event::Text(text) => {
                    if let Some(block) = open.as_mut() {
                        block.source.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    let Some(block) = open.take() else { continue };
                    if block.tag.as_deref() == Some(options.diagram_language.as_str()) {
                        flush(&mut pending, &mut fragment);
                        let token = ctx.register(block.source);
                        fragment.push_diagram(token);
                    } else {
                        let rendered = highlight::render_code_block(
                            code_blocks,
                            block.tag.as_deref(),
                            &block.source,
                        );
                        code_blocks += 1;
                        if rendered.highlighted {
                            highlighted_blocks += 1;
                        }
                        if let Some(d) = rendered.degradation {
                            debug!("{}", d);
                            degradations.push(d);
                        }
                        pending.push(Event::Html(CowStr::from(rendered.html)));
                    }
                }
                // Code blocks only ever contain text.
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                open = Some(OpenCodeBlock {
                    tag: fence_tag(&kind),
                    source: String::new(),
                });
            }
            other => {
                title.observe(&other);
                pending.push(other);
            }
        }
    }

    flush(&mut pending, &mut fragment);

    debug!(
        "Parsed markdown: {} diagram(s), {} code block(s), {} highlighted",
        ctx.len(),
        code_blocks,
        highlighted_blocks
    );

    ParsedMarkdown {
        fragment,
        blocks: ctx.into_blocks(),
        degradations,
        title: title.done,
        code_blocks,
        highlighted_blocks,
    }
}

/// First word of a fence info string; `None` for indented blocks and
/// fences without a tag.
fn fence_tag(kind: &CodeBlockKind<'_>) -> Option<String> {
    match kind {
        CodeBlockKind::Fenced(info) => info.split_whitespace().next().map(str::to_string),
        CodeBlockKind::Indented => None,
    }
}

fn flush(pending: &mut Vec<Event<'_>>, fragment: &mut Fragment) {
    if pending.is_empty() {
        return;
    }
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, pending.drain(..));
    fragment.push_markup(html);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::diagram::{reinject, Segment};

    fn parse(md: &str) -> ParsedMarkdown {
        parse_markdown(md, &ParseOptions::default())
    }

    fn to_html(parsed: ParsedMarkdown) -> String {
        reinject(parsed.fragment, &parsed.blocks, "mermaid").unwrap()
    }

    #[test]
    fn no_fences_means_no_diagrams() {
        let parsed = parse("# Hello\n\nSome *text*.\n");
        assert!(!parsed.has_diagrams());
        assert_eq!(parsed.fragment.placeholder_count(), 0);
        assert_eq!(parsed.title.as_deref(), Some("Hello"));
    }

    #[test]
    fn diagram_fences_are_extracted_in_order() {
        let md = "```mermaid\ngraph TD\n```\n\ntext\n\n```mermaid\npie\n  \"a\" : 1\n```\n";
        let parsed = parse(md);
        assert_eq!(parsed.blocks.len(), 2);
        assert_eq!(parsed.blocks[0].index, 0);
        assert_eq!(parsed.blocks[0].source, "graph TD\n");
        assert_eq!(parsed.blocks[1].index, 1);
        assert_eq!(parsed.blocks[1].source, "pie\n  \"a\" : 1\n");
        assert_eq!(parsed.fragment.placeholder_count(), 2);
        assert_eq!(parsed.code_blocks, 0);
    }

    #[test]
    fn diagram_source_is_not_highlighted_or_wrapped() {
        let html = to_html(parse("```mermaid\nA --> B\n```\n"));
        assert_eq!(html, "<div class=\"mermaid\">A --&gt; B\n</div>\n");
        assert!(!html.contains("<pre>"));
    }

    #[test]
    fn diagram_tag_with_attributes_still_matches() {
        let parsed = parse("```mermaid theme=dark\ngraph LR\n```\n");
        assert_eq!(parsed.blocks.len(), 1);
    }

    #[test]
    fn mixed_document_counts() {
        let md = "# Doc\n\n```mermaid\ngraph TD; A-->B\n```\n\n```rust\nfn main() {}\n```\n\n```\nplain\n```\n";
        let parsed = parse(md);
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.code_blocks, 2);
        assert_eq!(parsed.highlighted_blocks, 1);

        let html = to_html(parsed);
        assert_eq!(html.matches("<div class=\"mermaid\">").count(), 1);
        assert_eq!(html.matches("<code class=\"hljs").count(), 2);
        assert!(html.contains("language-rust"));
    }

    #[test]
    fn literal_placeholder_lookalikes_are_left_alone() {
        let parsed = parse("Text with {{DIAGRAM_0}} and <!--MERMAID_0--> in it.\n");
        assert!(!parsed.has_diagrams());
        assert!(parsed
            .fragment
            .segments()
            .iter()
            .all(|s| matches!(s, Segment::Markup(_))));
    }

    #[test]
    fn gfm_extensions_enabled() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |\n\n- [x] done\n- [ ] todo\n\n~~gone~~\n";
        let html = to_html(parse(md));
        assert!(html.contains("<table>"));
        assert!(html.contains("type=\"checkbox\""));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn soft_breaks_are_not_hard_breaks() {
        let html = to_html(parse("line one\nline two\n"));
        assert!(!html.contains("<br"));
    }

    #[test]
    fn unknown_language_degrades_without_failing() {
        let parsed = parse("```klingon\nQapla'\n```\n");
        assert_eq!(parsed.code_blocks, 1);
        assert!(matches!(
            parsed.degradations.as_slice(),
            [Degradation::UnknownLanguage { block: 0, .. }]
        ));
    }

    #[test]
    fn unclosed_fence_runs_to_end_of_document() {
        let parsed = parse("before\n\n```mermaid\ngraph TD\nA-->B\n");
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.blocks[0].source, "graph TD\nA-->B\n");
    }

    #[test]
    fn diagram_inside_list_keeps_list_markup() {
        let md = "- item\n\n  ```mermaid\n  graph TD\n  ```\n- next\n";
        let parsed = parse(md);
        assert_eq!(parsed.blocks.len(), 1);
        let html = to_html(parsed);
        assert!(html.contains("<ul>"));
        assert!(html.contains("</ul>"));
        assert!(html.contains("<div class=\"mermaid\">graph TD\n</div>"));
    }

    #[test]
    fn custom_diagram_language() {
        let options = ParseOptions {
            diagram_language: "dot".into(),
        };
        let parsed = parse_markdown("```dot\ndigraph { a -> b }\n```\n\n```mermaid\ngraph TD\n```\n", &options);
        assert_eq!(parsed.blocks.len(), 1);
        assert_eq!(parsed.blocks[0].source, "digraph { a -> b }\n");
        assert_eq!(parsed.code_blocks, 1);
    }

    #[test]
    fn empty_document() {
        let parsed = parse("");
        assert!(!parsed.has_diagrams());
        assert!(parsed.fragment.segments().is_empty());
        assert!(parsed.title.is_none());
    }
}
