//! Configuration types for Markdown-to-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The page format is deliberately *not*
//! here: every PDF is A4 with fixed margins (see
//! [`crate::pipeline::render::PdfFormat`]).

use crate::error::Md2PdfError;
use crate::pipeline::assemble::AssembleOptions;
use crate::pipeline::parse::ParseOptions;
use crate::pipeline::render::RenderOptions;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Mermaid bundle loaded by the diagram bootstrap.
pub const DEFAULT_DIAGRAM_SCRIPT_URL: &str =
    "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js";

/// Default syntect theme used to style highlighted code.
///
/// A light theme: dark backgrounds waste toner and wash out in grayscale.
pub const DEFAULT_SYNTAX_THEME: &str = "InspiredGitHub";

/// Upper bound for the diagram and load timeouts, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// The diagram tag doubles as a CSS class, so it must be a plain identifier.
static RE_LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$").unwrap());

/// Mermaid theme names are interpolated into a JS string literal.
static RE_THEME_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").unwrap());

/// Configuration for a Markdown-to-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_md2pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .diagram_timeout_secs(60)
///     .sandbox(false)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Fence language tag marking a diagram block. Default: `mermaid`.
    ///
    /// Also used as the CSS class of the diagram container, which is what
    /// Mermaid's `startOnLoad` scans for.
    pub diagram_language: String,

    /// Script URL of the diagram engine. Default: [`DEFAULT_DIAGRAM_SCRIPT_URL`].
    pub diagram_script_url: String,

    /// Theme passed to `mermaid.initialize`. Default: `default`.
    pub diagram_theme: String,

    /// syntect theme whose CSS is embedded for highlighted code.
    /// `None` leaves code styling entirely to the caller's stylesheet.
    pub syntax_theme: Option<String>,

    /// Document `<title>`. If None, the first level-1 heading is used.
    pub title: Option<String>,

    /// Upper bound on waiting for diagrams to render, in seconds. Default: 30.
    pub diagram_timeout_secs: u64,

    /// Interval between diagram readiness checks, in milliseconds. Default: 100.
    pub poll_interval_ms: u64,

    /// Pause after diagrams report ready, before printing. Default: 500.
    ///
    /// Mermaid marks a container processed as soon as its SVG is inserted;
    /// fonts and layout can still shift for a few frames afterwards.
    pub settle_delay_ms: u64,

    /// Upper bound on page load (navigation + resources settling), in seconds. Default: 30.
    pub load_timeout_secs: u64,

    /// Path to the Chrome/Chromium binary. If None, chromiumoxide searches
    /// the usual install locations and `CHROME` env var.
    pub chrome_executable: Option<PathBuf>,

    /// Run Chromium with its sandbox. Default: true.
    ///
    /// Most containers lack the user namespaces the sandbox needs; set this
    /// to false there or the launch fails.
    pub sandbox: bool,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            diagram_language: "mermaid".to_string(),
            diagram_script_url: DEFAULT_DIAGRAM_SCRIPT_URL.to_string(),
            diagram_theme: "default".to_string(),
            syntax_theme: Some(DEFAULT_SYNTAX_THEME.to_string()),
            title: None,
            diagram_timeout_secs: 30,
            poll_interval_ms: 100,
            settle_delay_ms: 500,
            load_timeout_secs: 30,
            chrome_executable: None,
            sandbox: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("diagram_language", &self.diagram_language)
            .field("diagram_script_url", &self.diagram_script_url)
            .field("diagram_theme", &self.diagram_theme)
            .field("syntax_theme", &self.syntax_theme)
            .field("title", &self.title)
            .field("diagram_timeout_secs", &self.diagram_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("settle_delay_ms", &self.settle_delay_ms)
            .field("load_timeout_secs", &self.load_timeout_secs)
            .field("chrome_executable", &self.chrome_executable)
            .field("sandbox", &self.sandbox)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            diagram_language: self.diagram_language.clone(),
        }
    }

    /// Options for the assembler. `fallback_title` is used when no explicit
    /// title is configured (normally the document's first H1).
    pub fn assemble_options(&self, fallback_title: Option<&str>) -> AssembleOptions {
        let title = self
            .title
            .clone()
            .or_else(|| fallback_title.map(str::to_string))
            .unwrap_or_else(|| "Document".to_string());
        AssembleOptions {
            title,
            diagram_script_url: self.diagram_script_url.clone(),
            diagram_theme: self.diagram_theme.clone(),
            syntax_theme: self.syntax_theme.clone(),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            diagram_selector: format!("div.{}", self.diagram_language),
            diagram_timeout: Duration::from_secs(self.diagram_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            load_timeout: Duration::from_secs(self.load_timeout_secs),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn diagram_language(mut self, lang: impl Into<String>) -> Self {
        self.config.diagram_language = lang.into();
        self
    }

    pub fn diagram_script_url(mut self, url: impl Into<String>) -> Self {
        self.config.diagram_script_url = url.into();
        self
    }

    pub fn diagram_theme(mut self, theme: impl Into<String>) -> Self {
        self.config.diagram_theme = theme.into();
        self
    }

    pub fn syntax_theme(mut self, theme: Option<String>) -> Self {
        self.config.syntax_theme = theme;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn diagram_timeout_secs(mut self, secs: u64) -> Self {
        self.config.diagram_timeout_secs = secs;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.clamp(10, 5000);
        self
    }

    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.config.settle_delay_ms = ms;
        self
    }

    pub fn load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.load_timeout_secs = secs;
        self
    }

    pub fn chrome_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_executable = Some(path.into());
        self
    }

    pub fn sandbox(mut self, v: bool) -> Self {
        self.config.sandbox = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2PdfError> {
        let c = &self.config;
        if !RE_LANGUAGE_TAG.is_match(&c.diagram_language) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "diagram language must be a single fence tag, got '{}'",
                c.diagram_language
            )));
        }
        if !RE_THEME_NAME.is_match(&c.diagram_theme) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "invalid diagram theme '{}'",
                c.diagram_theme
            )));
        }
        if c.diagram_script_url.trim().is_empty() {
            return Err(Md2PdfError::InvalidConfig(
                "diagram script URL must not be empty".into(),
            ));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&c.diagram_timeout_secs) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "diagram timeout must be between 1 and {MAX_TIMEOUT_SECS}s, got {}",
                c.diagram_timeout_secs
            )));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&c.load_timeout_secs) {
            return Err(Md2PdfError::InvalidConfig(format!(
                "load timeout must be between 1 and {MAX_TIMEOUT_SECS}s, got {}",
                c.load_timeout_secs
            )));
        }
        Ok(self.config)
    }
}
