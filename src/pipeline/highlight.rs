//! Syntax highlighting for non-diagram code blocks via syntect.
//!
//! ## Why class-based output?
//!
//! Inline `style=` attributes would bake one theme into every span and make
//! the caller's stylesheet powerless. syntect's [`ClassedHTMLGenerator`]
//! emits `<span class="hljs-…">` instead; the colours come from
//! [`theme_css`], which the assembler embeds next to the caller's CSS.
//!
//! ## Language resolution
//!
//! 1. The fence tag, looked up by token (extension or name). `rust,ignore`
//!    style tags are cut at the first comma.
//! 2. Otherwise the first line of the block (shebangs, `<?xml`, modelines).
//! 3. Otherwise plain text, HTML-escaped.
//!
//! None of these steps can fail the conversion; losses are reported as
//! [`Degradation`]s.

use crate::error::Degradation;
use crate::pipeline::diagram::escape_html;
use once_cell::sync::Lazy;
use syntect::highlighting::ThemeSet;
use syntect::html::{css_for_theme_with_class_style, ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;
use tracing::debug;

/// Loaded once per process; building the default set takes tens of ms.
static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

/// Prefix keeps syntect scopes from clashing with document classes.
const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hljs-" };

/// One rendered code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockHtml {
    /// `<pre><code class="hljs …">…</code></pre>`
    pub html: String,
    /// True when a real syntax (declared or detected) was applied.
    pub highlighted: bool,
    pub degradation: Option<Degradation>,
}

/// Render a code block with highlighting.
///
/// `block` is the 0-based ordinal among non-diagram code blocks and only
/// appears in degradation reports.
pub fn render_code_block(block: usize, tag: Option<&str>, source: &str) -> CodeBlockHtml {
    let declared = tag.and_then(find_declared_syntax);
    let (syntax, mut degradation) = match declared {
        Some(syntax) => (Some(syntax), None),
        None => match SYNTAX_SET.find_syntax_by_first_line(source.lines().next().unwrap_or("")) {
            Some(detected) => (
                Some(detected),
                Some(Degradation::AutoDetected {
                    block,
                    detected: detected.name.clone(),
                }),
            ),
            None => (
                None,
                tag.map(|t| Degradation::UnknownLanguage {
                    block,
                    tag: t.to_string(),
                }),
            ),
        },
    };

    let (body, highlighted) = match syntax {
        Some(syntax) => match highlight_with(syntax, source) {
            Ok(html) => (html, true),
            Err(e) => {
                debug!("code block {}: syntect failed on {}: {}", block, syntax.name, e);
                degradation = Some(Degradation::HighlightFailed {
                    block,
                    detail: e.to_string(),
                });
                (escape_html(source), false)
            }
        },
        None => (escape_html(source), false),
    };

    CodeBlockHtml {
        html: wrap_code(tag, &body),
        highlighted,
        degradation,
    }
}

/// CSS for the named syntect theme in the `hljs-` class style.
///
/// Returns `None` for an unknown theme name.
pub fn theme_css(theme: &str) -> Option<String> {
    let theme = THEME_SET.themes.get(theme)?;
    css_for_theme_with_class_style(theme, CLASS_STYLE).ok()
}

/// Names of the bundled syntect themes, sorted.
pub fn available_themes() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = THEME_SET.themes.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

fn find_declared_syntax(tag: &str) -> Option<&'static SyntaxReference> {
    let token = tag.split(',').next().unwrap_or(tag).trim();
    if token.is_empty() {
        return None;
    }
    SYNTAX_SET
        .find_syntax_by_token(token)
        .or_else(|| SYNTAX_SET.find_syntax_by_token(&token.to_ascii_lowercase()))
}

fn highlight_with(syntax: &SyntaxReference, source: &str) -> Result<String, syntect::Error> {
    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, CLASS_STYLE);
    for line in LinesWithEndings::from(source) {
        generator.parse_html_for_line_which_includes_newline(line)?;
    }
    Ok(generator.finalize())
}

fn wrap_code(tag: Option<&str>, body: &str) -> String {
    match tag {
        Some(tag) => format!(
            "<pre><code class=\"hljs language-{}\">{}</code></pre>\n",
            escape_html(tag),
            body
        ),
        None => format!("<pre><code class=\"hljs\">{}</code></pre>\n", body),
    }
}
