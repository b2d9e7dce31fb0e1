//! Integration tests for the full conversion pipeline.
//!
//! A mock [`SurfaceLauncher`] stands in for Chromium, so these run anywhere
//! and fast. Timeout behaviour is checked under paused tokio time.
//!
//! Run with:
//!   cargo test --test pipeline

use edgequake_md2pdf::{
    convert_with_launcher, render_html, ConversionConfig, ConversionProgressCallback,
    ConversionStats, Md2PdfError, PdfFormat, RenderPhase, RenderSurface, RenderableDocument,
    Stage, SurfaceLauncher,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

// ── Mock surface ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Behaviour {
    /// Diagrams are ready on the first check.
    Healthy,
    /// Diagrams are never ready.
    NeverReady,
    /// The readiness check itself errors, e.g. the page crashed.
    CheckFails,
    FailLaunch,
    FailLoad,
    FailExport,
    EmptyExport,
}

#[derive(Default)]
struct Counters {
    launched: AtomicUsize,
    closed: AtomicUsize,
    checks: AtomicUsize,
    loaded_html: Mutex<Option<String>>,
    exported_a4: AtomicBool,
}

struct MockLauncher {
    behaviour: Behaviour,
    counters: Arc<Counters>,
}

impl MockLauncher {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            counters: Arc::new(Counters::default()),
        }
    }

    fn launched(&self) -> usize {
        self.counters.launched.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    fn checks(&self) -> usize {
        self.counters.checks.load(Ordering::SeqCst)
    }
}

struct MockSurface {
    behaviour: Behaviour,
    counters: Arc<Counters>,
}

impl SurfaceLauncher for MockLauncher {
    type Surface = MockSurface;

    async fn launch(&self) -> Result<MockSurface, Md2PdfError> {
        if self.behaviour == Behaviour::FailLaunch {
            return Err(Md2PdfError::LaunchFailed {
                detail: "no browser here".into(),
            });
        }
        self.counters.launched.fetch_add(1, Ordering::SeqCst);
        Ok(MockSurface {
            behaviour: self.behaviour,
            counters: Arc::clone(&self.counters),
        })
    }
}

impl RenderSurface for MockSurface {
    async fn load(&mut self, document: &RenderableDocument) -> Result<(), Md2PdfError> {
        if self.behaviour == Behaviour::FailLoad {
            return Err(Md2PdfError::LoadFailed {
                detail: "net::ERR_FAILED".into(),
            });
        }
        *self.counters.loaded_html.lock().unwrap() = Some(document.html().to_string());
        Ok(())
    }

    async fn wait_for_network_idle(&mut self, _timeout: Duration) -> Result<(), Md2PdfError> {
        Ok(())
    }

    async fn pending_diagrams(&mut self, _selector: &str) -> Result<usize, Md2PdfError> {
        self.counters.checks.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::NeverReady => Ok(1),
            Behaviour::CheckFails => Err(Md2PdfError::DiagramCheckFailed {
                detail: "Execution context was destroyed".into(),
            }),
            _ => Ok(0),
        }
    }

    async fn export_pdf(&mut self, format: &PdfFormat) -> Result<Vec<u8>, Md2PdfError> {
        self.counters
            .exported_a4
            .store(*format == PdfFormat::A4, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::FailExport => Err(Md2PdfError::ExportFailed {
                detail: "printToPDF failed".into(),
            }),
            Behaviour::EmptyExport => Ok(Vec::new()),
            _ => Ok(b"%PDF-1.7\n%mock\n".to_vec()),
        }
    }

    async fn close(self) -> Result<(), Md2PdfError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Test helpers ─────────────────────────────────────────────────────────────

const MIXED_DOC: &str = "# Report\n\n\
```mermaid\ngraph TD; A-->B\n```\n\n\
```rust\nfn main() { println!(\"hi\"); }\n```\n\n\
```\nno language here\n```\n";

fn fast_config() -> ConversionConfig {
    ConversionConfig::builder()
        .diagram_timeout_secs(2)
        .settle_delay_ms(0)
        .build()
        .unwrap()
}

#[derive(Default)]
struct StageRecorder {
    events: Mutex<Vec<String>>,
}

impl ConversionProgressCallback for StageRecorder {
    fn on_stage_start(&self, stage: Stage) {
        self.events.lock().unwrap().push(format!("+{stage}"));
    }

    fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
        self.events.lock().unwrap().push(format!("-{stage}"));
    }

    fn on_conversion_complete(&self, _stats: &ConversionStats) {
        self.events.lock().unwrap().push("done".into());
    }
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn mixed_document_converts_with_one_container_and_two_highlighted_blocks() {
    let launcher = MockLauncher::new(Behaviour::Healthy);
    let output = assert_ok!(convert_with_launcher(MIXED_DOC, "", &launcher, &fast_config()).await);

    assert!(!output.pdf.is_empty());
    assert_eq!(output.html.matches("<div class=\"mermaid\">").count(), 1);
    assert_eq!(output.html.matches("<code class=\"hljs").count(), 2);
    assert!(output.html.contains("mermaid.initialize"));

    assert_eq!(output.stats.diagram_count, 1);
    assert_eq!(output.stats.code_blocks, 2);
    assert_eq!(output.stats.pdf_bytes, output.pdf.len());
    assert_eq!(
        output.stats.phases,
        vec![
            RenderPhase::Init,
            RenderPhase::Loaded,
            RenderPhase::DiagramsPending,
            RenderPhase::DiagramsReady,
            RenderPhase::Exported,
            RenderPhase::Closed,
        ]
    );

    assert_eq!(launcher.launched(), 1);
    assert_eq!(launcher.closed(), 1);
    assert!(launcher.counters.exported_a4.load(Ordering::SeqCst));

    let loaded = launcher.counters.loaded_html.lock().unwrap().clone();
    assert_eq!(loaded.as_deref(), Some(output.html.as_str()));
}

#[tokio::test]
async fn empty_document_never_waits_for_diagrams() {
    let launcher = MockLauncher::new(Behaviour::Healthy);
    let output = assert_ok!(convert_with_launcher("", "", &launcher, &fast_config()).await);

    assert_eq!(output.stats.diagram_count, 0);
    assert!(!output.html.contains("<script"));
    assert!(!output.stats.phases.contains(&RenderPhase::DiagramsPending));
    assert_eq!(launcher.checks(), 0);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn document_without_fences_has_no_bootstrap() {
    let doc = assert_ok!(render_html(
        "# Title\n\nJust prose, with `inline code`.\n",
        "",
        &ConversionConfig::default()
    ));
    assert!(!doc.has_diagrams());
    assert!(!doc.html().contains("mermaid"));
}

#[tokio::test]
async fn progress_reports_every_stage_in_order() {
    let recorder = Arc::new(StageRecorder::default());
    let config = ConversionConfig::builder()
        .settle_delay_ms(0)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let launcher = MockLauncher::new(Behaviour::Healthy);
    assert_ok!(convert_with_launcher(MIXED_DOC, "", &launcher, &config).await);

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "+parse",
            "-parse",
            "+reinject",
            "-reinject",
            "+assemble",
            "-assemble",
            "+launch",
            "-launch",
            "+load",
            "-load",
            "+diagram-wait",
            "-diagram-wait",
            "+export",
            "-export",
            "done",
        ]
    );
}

// ── Failure paths: the surface is always released ────────────────────────────

#[tokio::test(start_paused = true)]
async fn never_ready_diagrams_time_out_after_deadline_and_release_surface() {
    let launcher = MockLauncher::new(Behaviour::NeverReady);
    let started = Instant::now();
    let err = assert_err!(convert_with_launcher(MIXED_DOC, "", &launcher, &fast_config()).await);

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(matches!(
        err,
        Md2PdfError::DiagramRenderTimeout {
            timeout_ms: 2000,
            ..
        }
    ));
    assert_eq!(err.stage(), Stage::DiagramWait);
    assert!(launcher.checks() > 1);
    assert_eq!(launcher.launched(), 1);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_readiness_check_is_a_diagram_wait_error() {
    let launcher = MockLauncher::new(Behaviour::CheckFails);
    let started = Instant::now();
    let err = assert_err!(convert_with_launcher(MIXED_DOC, "", &launcher, &fast_config()).await);

    assert!(matches!(err, Md2PdfError::DiagramCheckFailed { .. }), "got {err}");
    assert_eq!(err.stage(), Stage::DiagramWait);
    assert!(err.to_string().starts_with("[diagram-wait]"));
    // Fails on the first check instead of waiting out the deadline.
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(launcher.checks(), 1);
    assert_eq!(launcher.launched(), launcher.closed());
}

#[tokio::test]
async fn load_failure_releases_surface() {
    let launcher = MockLauncher::new(Behaviour::FailLoad);
    let err = assert_err!(convert_with_launcher(MIXED_DOC, "", &launcher, &fast_config()).await);
    assert!(matches!(err, Md2PdfError::LoadFailed { .. }));
    assert_eq!(launcher.launched(), launcher.closed());
    assert_eq!(launcher.checks(), 0);
}

#[tokio::test]
async fn export_failure_releases_surface() {
    let launcher = MockLauncher::new(Behaviour::FailExport);
    let err = assert_err!(convert_with_launcher(MIXED_DOC, "", &launcher, &fast_config()).await);
    assert!(matches!(err, Md2PdfError::ExportFailed { .. }));
    assert_eq!(launcher.launched(), 1);
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn empty_pdf_is_an_export_failure() {
    let launcher = MockLauncher::new(Behaviour::EmptyExport);
    let err = assert_err!(convert_with_launcher("# x\n", "", &launcher, &fast_config()).await);
    assert!(matches!(err, Md2PdfError::ExportFailed { .. }));
    assert_eq!(launcher.closed(), 1);
}

#[tokio::test]
async fn launch_failure_acquires_nothing() {
    let launcher = MockLauncher::new(Behaviour::FailLaunch);
    let err = assert_err!(convert_with_launcher(MIXED_DOC, "", &launcher, &fast_config()).await);
    assert_eq!(err.stage(), Stage::Launch);
    assert!(err.to_string().contains("--no-sandbox"));
    assert_eq!(launcher.launched(), 0);
    assert_eq!(launcher.closed(), 0);
}

#[tokio::test(start_paused = true)]
async fn acquire_and_release_balance_across_many_conversions() {
    let behaviours = [
        Behaviour::Healthy,
        Behaviour::NeverReady,
        Behaviour::CheckFails,
        Behaviour::FailLoad,
        Behaviour::FailExport,
        Behaviour::EmptyExport,
        Behaviour::Healthy,
    ];
    for behaviour in behaviours {
        let launcher = MockLauncher::new(behaviour);
        let _ = convert_with_launcher(MIXED_DOC, "", &launcher, &fast_config()).await;
        assert_eq!(
            launcher.launched(),
            launcher.closed(),
            "unbalanced for {behaviour:?}"
        );
    }
}

// ── Diagram extraction through the public API ────────────────────────────────

#[test]
fn diagram_sources_are_escaped_once_and_kept_in_order() {
    let md = "```mermaid\nA[\"x < y\"] --> B\n```\n\ntext\n\n```mermaid\nC -- \"&\" --> D\n```\n";
    let doc = render_html(md, "", &ConversionConfig::default()).unwrap();
    let html = doc.html();

    let first = html
        .find("A[&quot;x &lt; y&quot;] --&gt; B")
        .expect("first diagram");
    let second = html
        .find("C -- &quot;&amp;&quot; --&gt; D")
        .expect("second diagram");
    assert!(first < second);
    assert!(!html.contains("&amp;lt;"));
    assert_eq!(html.matches("<div class=\"mermaid\">").count(), 2);
}

#[test]
fn placeholder_lookalike_text_is_untouched() {
    let md = "Literal {{DIAGRAM_0}} and <!-- MERMAID_PLACEHOLDER_0 --> text.\n";
    let doc = render_html(md, "", &ConversionConfig::default()).unwrap();
    assert!(!doc.has_diagrams());
    assert!(doc.html().contains("{{DIAGRAM_0}}"));
}
