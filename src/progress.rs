//! Progress-callback trait for per-stage conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages. Most stages finish in
//! microseconds; the ones worth showing to a user are `launch`, `load` and
//! `diagram-wait`, which can take seconds.
//!
//! # Example
//!
//! ```rust
//! use edgequake_md2pdf::{ConversionConfig, ConversionProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct StderrProgress;
//!
//! impl ConversionProgressCallback for StderrProgress {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         eprintln!("{stage} done in {elapsed_ms}ms");
//!     }
//! }
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(Arc::new(StderrProgress))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::ConversionStats;
use crate::pipeline::Stage;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Called by the conversion pipeline as it enters and leaves each stage.
///
/// Implementations must be `Send + Sync` because the config that carries the
/// callback may be shared across tasks. All methods have default no-op
/// implementations so callers only override what they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before parsing starts.
    fn on_conversion_start(&self) {}

    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when a stage finishes successfully.
    ///
    /// # Arguments
    /// * `stage`     : the stage that finished
    /// * `elapsed_ms`: wall-clock time spent in it
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once after the PDF has been produced.
    fn on_conversion_complete(&self, stats: &ConversionStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

/// Times one stage and reports its start and completion to the callback.
pub(crate) struct StageTimer<'a> {
    callback: Option<&'a ProgressCallback>,
    stage: Stage,
    started: Instant,
}

impl<'a> StageTimer<'a> {
    pub(crate) fn start(callback: Option<&'a ProgressCallback>, stage: Stage) -> Self {
        debug!("stage {} started", stage);
        if let Some(cb) = callback {
            cb.on_stage_start(stage);
        }
        Self {
            callback,
            stage,
            started: Instant::now(),
        }
    }

    /// Report completion and return the elapsed milliseconds.
    ///
    /// Dropping the timer without calling this (the stage failed) reports
    /// nothing.
    pub(crate) fn finish(self) -> u64 {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        debug!("stage {} finished in {}ms", self.stage, elapsed_ms);
        if let Some(cb) = self.callback {
            cb.on_stage_complete(self.stage, elapsed_ms);
        }
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallback {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for RecordingCallback {
        fn on_conversion_start(&self) {
            self.events.lock().unwrap().push("start".into());
        }

        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().unwrap().push(format!("+{stage}"));
        }

        fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
            self.events.lock().unwrap().push(format!("-{stage}"));
        }

        fn on_conversion_complete(&self, stats: &ConversionStats) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {}", stats.pdf_bytes));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_conversion_start();
        cb.on_stage_start(Stage::Parse);
        cb.on_stage_complete(Stage::Parse, 3);
        cb.on_conversion_complete(&ConversionStats::default());
    }

    #[test]
    fn recording_callback_receives_events_in_order() {
        let cb = RecordingCallback::default();
        cb.on_conversion_start();
        cb.on_stage_start(Stage::DiagramWait);
        cb.on_stage_complete(Stage::DiagramWait, 120);
        cb.on_conversion_complete(&ConversionStats {
            pdf_bytes: 42,
            ..Default::default()
        });

        let events = cb.events.lock().unwrap();
        assert_eq!(
            *events,
            vec!["start", "+diagram-wait", "-diagram-wait", "done 42"]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_stage_start(Stage::Launch);
    }
}
