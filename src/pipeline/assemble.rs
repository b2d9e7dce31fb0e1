//! Document assembly: wrap the final body in a complete HTML document.
//!
//! The diagram bootstrap is added only when the caller says the document
//! has diagrams. Pages without diagrams then load no external script, and
//! the render engine can skip the diagram wait entirely.

use crate::pipeline::diagram::escape_html;
use crate::pipeline::highlight;
use tracing::{debug, warn};

/// Assembler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleOptions {
    pub title: String,
    pub diagram_script_url: String,
    pub diagram_theme: String,
    /// syntect theme whose CSS is embedded; `None` embeds nothing.
    pub syntax_theme: Option<String>,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            title: "Document".to_string(),
            diagram_script_url: crate::config::DEFAULT_DIAGRAM_SCRIPT_URL.to_string(),
            diagram_theme: "default".to_string(),
            syntax_theme: Some(crate::config::DEFAULT_SYNTAX_THEME.to_string()),
        }
    }
}

/// A complete HTML document ready for the render engine.
///
/// `has_diagrams` is fixed at construction and is what the render engine
/// consults; nobody re-scans the HTML for diagram containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderableDocument {
    html: String,
    has_diagrams: bool,
}

impl RenderableDocument {
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn has_diagrams(&self) -> bool {
        self.has_diagrams
    }

    pub fn into_html(self) -> String {
        self.html
    }
}

/// Build the document shell around `body`.
///
/// `stylesheet` is embedded verbatim.
pub fn assemble(
    body: &str,
    stylesheet: &str,
    has_diagrams: bool,
    options: &AssembleOptions,
) -> RenderableDocument {
    let syntax_css = options.syntax_theme.as_deref().and_then(|name| {
        let css = highlight::theme_css(name);
        if css.is_none() {
            warn!(
                "Unknown syntax theme '{}'; available: {}",
                name,
                highlight::available_themes().join(", ")
            );
        }
        css
    });

    let mut html = String::with_capacity(body.len() + stylesheet.len() + 1024);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str("<title>");
    html.push_str(&escape_html(&options.title));
    html.push_str("</title>\n<style>\n");
    html.push_str(stylesheet);
    html.push_str("\n</style>\n");
    if let Some(css) = syntax_css {
        html.push_str("<style>\n");
        html.push_str(&css);
        html.push_str("\n</style>\n");
    }
    html.push_str("</head>\n<body>\n<article class=\"markdown-body\">\n");
    html.push_str(body);
    html.push_str("</article>\n");
    if has_diagrams {
        html.push_str(&diagram_bootstrap(options));
    }
    html.push_str("</body>\n</html>\n");

    debug!(
        "Assembled document: {} bytes, diagrams={}",
        html.len(),
        has_diagrams
    );

    RenderableDocument { html, has_diagrams }
}

fn diagram_bootstrap(options: &AssembleOptions) -> String {
    format!(
        "<script src=\"{}\"></script>\n\
         <script>mermaid.initialize({{ startOnLoad: true, theme: {} }});</script>\n",
        escape_html(&options.diagram_script_url),
        script_string(&options.diagram_theme)
    )
}

/// A JS string literal that is also safe inside a `<script>` element.
fn script_string(value: &str) -> String {
    serde_json::Value::String(value.to_string())
        .to_string()
        .replace("</", "<\\/")
}
