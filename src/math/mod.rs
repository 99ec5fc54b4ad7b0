//! Math typesetting collaborator.
//!
//! Math nodes need a second, asynchronous layout pass before their glyph
//! geometry is final. The collaborator exposes two waitable handles:
//!
//! - [`Readiness`]: the typesetter's resources are loaded
//! - [`MathPass`]: a batch of math sources has been laid out
//!
//! Both resolve through a channel and are waited on with a bound, so a stuck
//! collaborator can never hang an export.

mod tex;

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use crate::document::MathId;
use crate::surface::{ApproxMeasure, TextMeasure};

pub use tex::layout;

/// One math node to lay out.
#[derive(Debug, Clone, PartialEq)]
pub struct MathJob {
    pub id: MathId,
    pub tex: String,
    pub display: bool,
    /// Font size in CSS pixels
    pub size: f32,
}

/// A positioned glyph run. Offsets are from the layout's baseline origin,
/// with `dy` growing downward.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphRun {
    pub text: String,
    pub dx: f32,
    pub dy: f32,
    pub size: f32,
    pub italic: bool,
}

/// A horizontal rule (fraction bar, radical overline).
#[derive(Debug, Clone, PartialEq)]
pub struct MathRule {
    pub dx: f32,
    pub dy: f32,
    pub width: f32,
    pub thickness: f32,
}

/// Final glyph geometry for one math node.
#[derive(Debug, Clone, PartialEq)]
pub struct MathLayout {
    pub id: MathId,
    pub width: f32,
    pub ascent: f32,
    pub descent: f32,
    pub runs: Vec<GlyphRun>,
    pub rules: Vec<MathRule>,
}

impl MathLayout {
    pub fn height(&self) -> f32 {
        self.ascent + self.descent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    TimedOut,
    Failed(String),
}

/// Resolves once the typesetter can accept work.
#[derive(Debug)]
pub struct Readiness {
    rx: Receiver<Result<(), String>>,
}

impl Readiness {
    /// A readiness handle and the sender that resolves it.
    pub fn pending() -> (Sender<Result<(), String>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    pub fn ready() -> Self {
        let (tx, readiness) = Self::pending();
        let _ = tx.send(Ok(()));
        readiness
    }

    /// Block for at most `timeout`.
    pub fn wait(self, timeout: Duration) -> ReadyState {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(())) => ReadyState::Ready,
            Ok(Err(reason)) => ReadyState::Failed(reason),
            Err(RecvTimeoutError::Timeout) => ReadyState::TimedOut,
            Err(RecvTimeoutError::Disconnected) => {
                ReadyState::Failed("typesetter dropped its readiness signal".into())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MathOutcome {
    Completed(Vec<MathLayout>),
    TimedOut,
    Failed(String),
}

/// An in-flight layout pass.
#[derive(Debug)]
pub struct MathPass {
    rx: Receiver<Result<Vec<MathLayout>, String>>,
}

impl MathPass {
    pub fn pending() -> (Sender<Result<Vec<MathLayout>, String>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// A pass that has already finished.
    pub fn completed(layouts: Vec<MathLayout>) -> Self {
        let (tx, pass) = Self::pending();
        let _ = tx.send(Ok(layouts));
        pass
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        let (tx, pass) = Self::pending();
        let _ = tx.send(Err(reason.into()));
        pass
    }

    /// Block until the pass completes or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> MathOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(Ok(layouts)) => MathOutcome::Completed(layouts),
            Ok(Err(reason)) => MathOutcome::Failed(reason),
            Err(RecvTimeoutError::Timeout) => MathOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => {
                MathOutcome::Failed("typesetter stopped before finishing".into())
            }
        }
    }
}

/// Asynchronous second-pass math layout.
pub trait MathTypesetter: Send + Sync {
    fn ensure_ready(&self) -> Readiness;

    fn typeset(&self, jobs: Vec<MathJob>) -> MathPass;
}

/// Default typesetter: lays out a TeX subset as Unicode glyph runs on a
/// worker thread.
pub struct UnicodeTypesetter {
    measure: Arc<dyn TextMeasure>,
}

impl Default for UnicodeTypesetter {
    fn default() -> Self {
        Self::new(Arc::new(ApproxMeasure))
    }
}

impl UnicodeTypesetter {
    pub fn new(measure: Arc<dyn TextMeasure>) -> Self {
        Self { measure }
    }
}

impl MathTypesetter for UnicodeTypesetter {
    fn ensure_ready(&self) -> Readiness {
        let (tx, readiness) = Readiness::pending();
        let spawned = thread::Builder::new()
            .name("mdpress-math-init".into())
            .spawn(move || {
                LazyLock::force(&tex::SYMBOLS);
                let _ = tx.send(Ok(()));
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "could not start math init thread");
            let (tx, readiness) = Readiness::pending();
            let _ = tx.send(Err(err.to_string()));
            return readiness;
        }
        readiness
    }

    fn typeset(&self, jobs: Vec<MathJob>) -> MathPass {
        if jobs.is_empty() {
            return MathPass::completed(Vec::new());
        }
        let (tx, pass) = MathPass::pending();
        let measure = Arc::clone(&self.measure);
        let spawned = thread::Builder::new()
            .name("mdpress-math".into())
            .spawn(move || {
                let layouts = jobs
                    .iter()
                    .map(|job| layout(job.id, &job.tex, job.size, measure.as_ref()))
                    .collect();
                let _ = tx.send(Ok(layouts));
            });
        match spawned {
            Ok(_) => pass,
            Err(err) => MathPass::failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: usize, tex: &str) -> MathJob {
        MathJob {
            id: MathId(id),
            tex: tex.into(),
            display: false,
            size: 16.0,
        }
    }

    #[test]
    fn test_unicode_typesetter_becomes_ready() {
        let typesetter = UnicodeTypesetter::default();
        assert_eq!(
            typesetter.ensure_ready().wait(Duration::from_secs(5)),
            ReadyState::Ready
        );
    }

    #[test]
    fn test_typeset_returns_layout_per_job_in_order() {
        let typesetter = UnicodeTypesetter::default();
        let pass = typesetter.typeset(vec![job(0, "x^2"), job(1, r"\frac{1}{2}")]);
        let MathOutcome::Completed(layouts) = pass.wait(Duration::from_secs(5)) else {
            panic!("pass did not complete");
        };
        assert_eq!(layouts.len(), 2);
        assert_eq!(layouts[0].id, MathId(0));
        assert_eq!(layouts[1].id, MathId(1));
        assert!(layouts.iter().all(|l| l.width > 0.0 && l.height() > 0.0));
    }

    #[test]
    fn test_empty_batch_completes_immediately() {
        let pass = UnicodeTypesetter::default().typeset(Vec::new());
        assert_eq!(pass.wait(Duration::ZERO), MathOutcome::Completed(Vec::new()));
    }

    #[test]
    fn test_pending_pass_times_out() {
        let (_tx, pass) = MathPass::pending();
        assert_eq!(pass.wait(Duration::from_millis(10)), MathOutcome::TimedOut);
    }

    #[test]
    fn test_dropped_sender_is_failure_not_hang() {
        let (tx, pass) = MathPass::pending();
        drop(tx);
        assert!(matches!(
            pass.wait(Duration::from_secs(5)),
            MathOutcome::Failed(_)
        ));

        let (tx, readiness) = Readiness::pending();
        drop(tx);
        assert!(matches!(
            readiness.wait(Duration::from_secs(5)),
            ReadyState::Failed(_)
        ));
    }

    #[test]
    fn test_failed_pass_reports_reason() {
        let pass = MathPass::failed("bad glyph table");
        assert_eq!(
            pass.wait(Duration::from_secs(1)),
            MathOutcome::Failed("bad glyph table".into())
        );
    }
}
