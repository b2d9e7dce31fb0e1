//! Render engine: drive headless Chromium from loaded HTML to PDF bytes.
//!
//! ## State machine
//!
//! ```text
//! Init ─▶ Loaded ─┬──────────────────────────────────────┬─▶ Exported ─▶ Closed
//!                 └─▶ DiagramsPending ─▶ DiagramsReady ───┘
//!                          │
//!                          └─▶ TimedOut ─▶ Closed
//! ```
//!
//! `Closed` is reached from every state once a surface has been launched:
//! [`render_document`] calls [`RenderSurface::close`] on success and on every
//! error path, so repeated conversions never leak browser processes.
//!
//! ## Why a trait seam?
//!
//! [`SurfaceLauncher`] and [`RenderSurface`] let the pipeline be tested
//! without a browser: a mock surface can count launches and closes,
//! never report diagrams ready, or fail the export. [`ChromiumLauncher`] is
//! the production implementation.
//!
//! ## Why poll?
//!
//! Mermaid renders asynchronously after `load` and emits no event we can
//! subscribe to over CDP. The engine therefore polls a completion predicate
//! at a fixed interval until a hard deadline, and there is no other
//! cancellation path.

use crate::error::Md2PdfError;
use crate::pipeline::assemble::RenderableDocument;
use crate::pipeline::Stage;
use crate::progress::{ProgressCallback, StageTimer};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};
use url::Url;

// ── Fixed page format ───────────────────────────────────────────────────

/// Physical page setup for export. Only [`PdfFormat::A4`] is ever used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfFormat {
    pub paper_width_mm: f64,
    pub paper_height_mm: f64,
    pub margin_top_mm: f64,
    pub margin_right_mm: f64,
    pub margin_bottom_mm: f64,
    pub margin_left_mm: f64,
    pub print_background: bool,
}

impl PdfFormat {
    /// A4 portrait, 20 mm top/bottom and 15 mm left/right, backgrounds on.
    pub const A4: PdfFormat = PdfFormat {
        paper_width_mm: 210.0,
        paper_height_mm: 297.0,
        margin_top_mm: 20.0,
        margin_right_mm: 15.0,
        margin_bottom_mm: 20.0,
        margin_left_mm: 15.0,
        print_background: true,
    };

    /// CDP `Page.printToPDF` parameters (CDP measures in inches).
    ///
    /// `prefer_css_page_size` is off so an `@page { size: … }` rule in the
    /// caller's stylesheet cannot override the format.
    pub fn to_print_params(&self) -> PrintToPdfParams {
        PrintToPdfParams {
            landscape: Some(false),
            print_background: Some(self.print_background),
            paper_width: Some(mm_to_inches(self.paper_width_mm)),
            paper_height: Some(mm_to_inches(self.paper_height_mm)),
            margin_top: Some(mm_to_inches(self.margin_top_mm)),
            margin_right: Some(mm_to_inches(self.margin_right_mm)),
            margin_bottom: Some(mm_to_inches(self.margin_bottom_mm)),
            margin_left: Some(mm_to_inches(self.margin_left_mm)),
            prefer_css_page_size: Some(false),
            ..Default::default()
        }
    }
}

fn mm_to_inches(mm: f64) -> f64 {
    mm / 25.4
}

// ── Options & results ───────────────────────────────────────────────────

/// Timing knobs for one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// CSS selector matching every diagram container.
    pub diagram_selector: String,
    pub diagram_timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub load_timeout: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            diagram_selector: "div.mermaid".to_string(),
            diagram_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(500),
            load_timeout: Duration::from_secs(30),
        }
    }
}

/// States of the render engine, recorded in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderPhase {
    Init,
    Loaded,
    DiagramsPending,
    DiagramsReady,
    TimedOut,
    Exported,
    Closed,
}

/// Successful render: the PDF and the states it went through.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub pdf: Vec<u8>,
    pub phases: Vec<RenderPhase>,
}

#[derive(Debug)]
struct PhaseTrace {
    phases: Vec<RenderPhase>,
}

impl PhaseTrace {
    fn new() -> Self {
        Self {
            phases: vec![RenderPhase::Init],
        }
    }

    fn enter(&mut self, phase: RenderPhase) {
        debug!("render phase → {:?}", phase);
        self.phases.push(phase);
    }
}

// ── Surface seam ────────────────────────────────────────────────────────

/// A script-capable page that can load HTML and print it.
///
/// One surface serves exactly one conversion.
#[allow(async_fn_in_trait)]
pub trait RenderSurface {
    /// Start loading the document.
    async fn load(&mut self, document: &RenderableDocument) -> Result<(), Md2PdfError>;

    /// Block until the page and its sub-resources have finished loading,
    /// failing with [`Md2PdfError::LoadFailed`] after `timeout`.
    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), Md2PdfError>;

    /// Number of containers matching `selector` that have not yet
    /// materialised a diagram. `0` means every diagram is ready.
    async fn pending_diagrams(&mut self, selector: &str) -> Result<usize, Md2PdfError>;

    /// Print the current page.
    async fn export_pdf(&mut self, format: &PdfFormat) -> Result<Vec<u8>, Md2PdfError>;

    /// Release the surface and everything it holds.
    async fn close(self) -> Result<(), Md2PdfError>;
}

/// Acquires a fresh [`RenderSurface`].
#[allow(async_fn_in_trait)]
pub trait SurfaceLauncher {
    type Surface: RenderSurface;

    /// Fails with [`Md2PdfError::LaunchFailed`] if no surface can be provided.
    async fn launch(&self) -> Result<Self::Surface, Md2PdfError>;
}

// ── Engine ──────────────────────────────────────────────────────────────

/// Render a document to PDF on a freshly launched surface.
///
/// The surface is closed on every path after a successful launch; a close
/// failure is logged and never replaces the primary result. Nothing is
/// retried.
pub async fn render_document<L: SurfaceLauncher>(
    document: &RenderableDocument,
    launcher: &L,
    options: &RenderOptions,
    progress: Option<&ProgressCallback>,
) -> Result<RenderOutcome, Md2PdfError> {
    let mut trace = PhaseTrace::new();

    let timer = StageTimer::start(progress, Stage::Launch);
    let mut surface = launcher.launch().await?;
    timer.finish();

    let result = drive(&mut surface, document, options, progress, &mut trace).await;

    if let Err(e) = surface.close().await {
        warn!("Failed to close render surface: {}", e);
    }
    trace.enter(RenderPhase::Closed);

    match result {
        Ok(pdf) => Ok(RenderOutcome {
            pdf,
            phases: trace.phases,
        }),
        Err(e) => {
            debug!("render aborted after phases {:?}", trace.phases);
            Err(e)
        }
    }
}

async fn drive<S: RenderSurface>(
    surface: &mut S,
    document: &RenderableDocument,
    options: &RenderOptions,
    progress: Option<&ProgressCallback>,
    trace: &mut PhaseTrace,
) -> Result<Vec<u8>, Md2PdfError> {
    // ── Load ─────────────────────────────────────────────────────────────
    let timer = StageTimer::start(progress, Stage::Load);
    surface.load(document).await?;
    surface.wait_for_network_idle(options.load_timeout).await?;
    trace.enter(RenderPhase::Loaded);
    let load_ms = timer.finish();
    info!("Document loaded in {}ms", load_ms);

    // ── Diagrams ─────────────────────────────────────────────────────────
    if document.has_diagrams() {
        let timer = StageTimer::start(progress, Stage::DiagramWait);
        trace.enter(RenderPhase::DiagramsPending);
        match wait_for_diagrams(surface, options).await {
            Ok(()) => trace.enter(RenderPhase::DiagramsReady),
            Err(e) => {
                if matches!(e, Md2PdfError::DiagramRenderTimeout { .. }) {
                    trace.enter(RenderPhase::TimedOut);
                }
                return Err(e);
            }
        }
        sleep(options.settle_delay).await;
        let wait_ms = timer.finish();
        info!("Diagrams rendered in {}ms", wait_ms);
    }

    // ── Export ───────────────────────────────────────────────────────────
    let timer = StageTimer::start(progress, Stage::Export);
    let pdf = surface.export_pdf(&PdfFormat::A4).await?;
    if pdf.is_empty() {
        return Err(Md2PdfError::ExportFailed {
            detail: "renderer returned an empty PDF".to_string(),
        });
    }
    trace.enter(RenderPhase::Exported);
    let export_ms = timer.finish();
    info!("Exported {} bytes of PDF in {}ms", pdf.len(), export_ms);

    Ok(pdf)
}

/// Poll until no diagram is pending or `options.diagram_timeout` elapses.
///
/// Each predicate call is itself bounded by the deadline, so a hung
/// renderer cannot stretch the wait. The timeout error is only produced once
/// the full timeout has passed.
pub async fn wait_for_diagrams<S: RenderSurface>(
    surface: &mut S,
    options: &RenderOptions,
) -> Result<(), Md2PdfError> {
    let started = Instant::now();
    let deadline = deadline_after(started, options.diagram_timeout);
    let timeout_ms = options.diagram_timeout.as_millis() as u64;
    // Stays 0 only if the very first check never returned.
    let mut last_pending = 0usize;

    loop {
        let pending =
            match timeout_at(deadline, surface.pending_diagrams(&options.diagram_selector)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(Md2PdfError::DiagramRenderTimeout {
                        diagrams: last_pending,
                        timeout_ms,
                    })
                }
            };

        if pending == 0 {
            debug!("All diagrams ready after {:?}", started.elapsed());
            return Ok(());
        }
        last_pending = pending;

        let now = Instant::now();
        if now >= deadline {
            return Err(Md2PdfError::DiagramRenderTimeout {
                diagrams: last_pending,
                timeout_ms,
            });
        }
        sleep(options.poll_interval.min(deadline - now)).await;
    }
}

/// `start + timeout`, saturating at roughly thirty years out instead of
/// panicking on overflow.
fn deadline_after(start: Instant, timeout: Duration) -> Instant {
    const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
    start
        .checked_add(timeout)
        .unwrap_or_else(|| start + FAR_FUTURE)
}

// ── Chromium implementation ─────────────────────────────────────────────

/// Page is loaded and web fonts have settled.
const DOCUMENT_SETTLED_JS: &str =
    "document.readyState === 'complete' && (!document.fonts || document.fonts.status === 'loaded')";

/// Interval for the load-settled poll; loads are fast, diagrams are not.
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a closing browser may take to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

const WORKDIR_PREFIX: &str = "md2pdf-";

/// Launches headless Chrome/Chromium through chromiumoxide.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
    sandbox: bool,
    request_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self {
            executable: None,
            sandbox: true,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &crate::config::ConversionConfig) -> Self {
        Self {
            executable: config.chrome_executable.clone(),
            sandbox: config.sandbox,
            request_timeout: Duration::from_secs(
                config.load_timeout_secs.min(crate::config::MAX_TIMEOUT_SECS),
            ),
        }
    }
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceLauncher for ChromiumLauncher {
    type Surface = ChromiumSurface;

    async fn launch(&self) -> Result<ChromiumSurface, Md2PdfError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(self.request_timeout)
            .arg("--hide-scrollbars")
            .arg("--disable-gpu");
        if let Some(ref path) = self.executable {
            builder = builder.chrome_executable(path);
        }
        if !self.sandbox {
            builder = builder.no_sandbox();
        }
        let browser_config = builder
            .build()
            .map_err(|detail| Md2PdfError::LaunchFailed { detail })?;

        // Everything fallible that needs no browser happens first, so no
        // error after this point can strand a running Chromium.
        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()
            .map_err(|e| Md2PdfError::LaunchFailed {
                detail: format!("cannot create temp dir: {e}"),
            })?;

        let (browser, mut handler) =
            Browser::launch(browser_config)
                .await
                .map_err(|e| Md2PdfError::LaunchFailed {
                    detail: e.to_string(),
                })?;

        // The CDP connection only makes progress while the handler is polled.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler: {}", e);
                }
            }
        });

        info!("Launched headless browser");
        Ok(ChromiumSurface {
            browser,
            handler_task,
            page: None,
            workdir,
        })
    }
}

/// One headless browser with one page.
///
/// The document is written to a private temp directory and opened through a
/// `file://` URL; the directory is deleted on close.
pub struct ChromiumSurface {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Option<Page>,
    workdir: TempDir,
}

impl ChromiumSurface {
    fn page(&self) -> Result<&Page, Md2PdfError> {
        self.page.as_ref().ok_or_else(|| Md2PdfError::LoadFailed {
            detail: "no document loaded".to_string(),
        })
    }
}

impl RenderSurface for ChromiumSurface {
    async fn load(&mut self, document: &RenderableDocument) -> Result<(), Md2PdfError> {
        let path = self.workdir.path().join("document.html");
        tokio::fs::write(&path, document.html())
            .await
            .map_err(|e| Md2PdfError::LoadFailed {
                detail: format!("cannot write {}: {e}", path.display()),
            })?;
        let url = Url::from_file_path(&path).map_err(|_| Md2PdfError::LoadFailed {
            detail: format!("not an absolute path: {}", path.display()),
        })?;

        let page = self
            .browser
            .new_page(url.as_str())
            .await
            .map_err(|e| Md2PdfError::LoadFailed {
                detail: e.to_string(),
            })?;
        page.wait_for_navigation()
            .await
            .map_err(|e| Md2PdfError::LoadFailed {
                detail: e.to_string(),
            })?;
        debug!("Navigated to {}", url);
        self.page = Some(page);
        Ok(())
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), Md2PdfError> {
        let page = self.page()?;
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            let settled: bool = page
                .evaluate(DOCUMENT_SETTLED_JS)
                .await
                .map_err(|e| Md2PdfError::LoadFailed {
                    detail: e.to_string(),
                })?
                .into_value()
                .map_err(|e| Md2PdfError::LoadFailed {
                    detail: e.to_string(),
                })?;
            if settled {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Md2PdfError::LoadFailed {
                    detail: format!("page still loading after {}s", timeout.as_secs()),
                });
            }
            sleep(LOAD_POLL_INTERVAL).await;
        }
    }

    async fn pending_diagrams(&mut self, selector: &str) -> Result<usize, Md2PdfError> {
        let page = self.page()?;
        let script = pending_diagrams_js(selector);
        page.evaluate(script)
            .await
            .map_err(|e| Md2PdfError::DiagramCheckFailed {
                detail: e.to_string(),
            })?
            .into_value::<usize>()
            .map_err(|e| Md2PdfError::DiagramCheckFailed {
                detail: format!("unexpected result: {e}"),
            })
    }

    async fn export_pdf(&mut self, format: &PdfFormat) -> Result<Vec<u8>, Md2PdfError> {
        let page = self.page().map_err(|e| Md2PdfError::ExportFailed {
            detail: e.to_string(),
        })?;
        page.pdf(format.to_print_params())
            .await
            .map_err(|e| Md2PdfError::ExportFailed {
                detail: e.to_string(),
            })
    }

    async fn close(self) -> Result<(), Md2PdfError> {
        let ChromiumSurface {
            mut browser,
            handler_task,
            page,
            workdir,
        } = self;

        if let Some(page) = page {
            if let Err(e) = page.close().await {
                debug!("page close: {}", e);
            }
        }
        let closed = shut_down(&mut browser, EXIT_GRACE).await;
        handler_task.abort();
        let _ = handler_task.await;
        drop(workdir);
        debug!("Browser closed");
        closed
    }
}

/// The parts of a browser process that shutdown needs.
trait BrowserProcess {
    /// Ask the browser to exit.
    async fn request_close(&mut self) -> Result<(), String>;
    /// Resolve once the process has exited.
    async fn wait_exit(&mut self);
    /// Kill the process and reap it.
    async fn kill_now(&mut self);
}

impl BrowserProcess for Browser {
    async fn request_close(&mut self) -> Result<(), String> {
        self.close().await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn wait_exit(&mut self) {
        if let Err(e) = self.wait().await {
            debug!("browser wait: {}", e);
        }
    }

    async fn kill_now(&mut self) {
        if let Some(Err(e)) = self.kill().await {
            debug!("browser kill: {}", e);
        }
    }
}

/// Close the browser, never waiting longer than about `2 * grace`.
///
/// A failed close kills the process at once; a process that has not exited
/// within `grace` after a successful close is killed too.
async fn shut_down<P: BrowserProcess>(
    process: &mut P,
    grace: Duration,
) -> Result<(), Md2PdfError> {
    let closed = match tokio::time::timeout(grace, process.request_close()).await {
        Ok(result) => result,
        Err(_) => Err(format!("no reply within {grace:?}")),
    };

    match closed {
        Ok(()) => {
            if tokio::time::timeout(grace, process.wait_exit()).await.is_err() {
                warn!("Browser still running {:?} after close; killing it", grace);
                process.kill_now().await;
            }
            Ok(())
        }
        Err(detail) => {
            warn!("Browser close failed ({}); killing it", detail);
            process.kill_now().await;
            Err(Md2PdfError::Internal(format!("browser close failed: {detail}")))
        }
    }
}

/// JS expression counting containers with neither the `data-processed`
/// marker nor an `<svg>` child.
fn pending_diagrams_js(selector: &str) -> String {
    // JSON string literals are valid JS string literals.
    let selector = serde_json::Value::String(selector.to_string()).to_string();
    format!(
        "Array.from(document.querySelectorAll({selector})).filter(\
         n => n.getAttribute('data-processed') !== 'true' && !n.querySelector('svg')\
         ).length"
    )
}
