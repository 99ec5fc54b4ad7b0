use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use mdpress::document::DocumentView;
use mdpress::error::ExportError;
use mdpress::export::{
    ExportOutcome, ExportReport, ExportSettings, Exporter, MathStatus, NoticeLevel, Notifier,
    RecordingNotifier,
};
use mdpress::math::{self, MathJob, MathPass, MathTypesetter, Readiness};
use mdpress::package::{Artifact, ArtifactSink, MemorySink, PageLayout, PageSpec};
use mdpress::raster::{Bitmap, Rasterizer, ResvgRasterizer};
use mdpress::style::Theme;
use mdpress::surface::{
    ApproxMeasure, DetachedSurface, OffscreenEnvironment, RenderEnvironment, SurfaceId,
};

struct Harness {
    env: Arc<OffscreenEnvironment>,
    notifier: Arc<RecordingNotifier>,
    sink: MemorySink,
}

impl Harness {
    fn new() -> Self {
        Self {
            env: Arc::new(OffscreenEnvironment::new()),
            notifier: Arc::new(RecordingNotifier::default()),
            sink: MemorySink::new(),
        }
    }

    fn exporter(&self, settings: ExportSettings) -> Exporter {
        Exporter::new(settings)
            .with_measure(Arc::new(ApproxMeasure))
            .with_environment(Arc::clone(&self.env) as Arc<dyn RenderEnvironment>)
            .with_sink(Box::new(self.sink.clone()))
            .with_notifier(Arc::clone(&self.notifier) as Arc<dyn Notifier>)
    }

    fn default_exporter(&self) -> Exporter {
        self.exporter(ExportSettings::default())
    }
}

fn view(source: &str) -> DocumentView {
    DocumentView::render(source, Theme::dark()).unwrap()
}

fn saved(outcome: ExportOutcome) -> ExportReport {
    match outcome {
        ExportOutcome::Saved(report) => report,
        other => panic!("expected a saved export, got {other:?}"),
    }
}

fn failed(outcome: ExportOutcome) -> ExportError {
    match outcome {
        ExportOutcome::Failed(err) => err,
        other => panic!("expected a failed export, got {other:?}"),
    }
}

/// Lays out math after a fixed delay, recording when it finished.
struct DelayedTypesetter {
    delay: Duration,
    finished_at: Arc<Mutex<Option<Instant>>>,
}

impl MathTypesetter for DelayedTypesetter {
    fn ensure_ready(&self) -> Readiness {
        Readiness::ready()
    }

    fn typeset(&self, jobs: Vec<MathJob>) -> MathPass {
        let (tx, pass) = MathPass::pending();
        let delay = self.delay;
        let finished_at = Arc::clone(&self.finished_at);
        thread::spawn(move || {
            thread::sleep(delay);
            let layouts = jobs
                .iter()
                .map(|job| math::layout(job.id, &job.tex, job.size, &ApproxMeasure))
                .collect();
            *finished_at.lock().unwrap() = Some(Instant::now());
            let _ = tx.send(Ok(layouts));
        });
        pass
    }
}

/// Never resolves anything it is asked for.
#[derive(Default)]
struct StalledTypesetter {
    ready_on_time: bool,
    held_ready: Mutex<Vec<Sender<Result<(), String>>>>,
    held_passes: Mutex<Vec<Sender<Result<Vec<math::MathLayout>, String>>>>,
}

impl MathTypesetter for StalledTypesetter {
    fn ensure_ready(&self) -> Readiness {
        if self.ready_on_time {
            return Readiness::ready();
        }
        let (tx, readiness) = Readiness::pending();
        self.held_ready.lock().unwrap().push(tx);
        readiness
    }

    fn typeset(&self, _jobs: Vec<MathJob>) -> MathPass {
        let (tx, pass) = MathPass::pending();
        self.held_passes.lock().unwrap().push(tx);
        pass
    }
}

struct BrokenTypesetter;

impl MathTypesetter for BrokenTypesetter {
    fn ensure_ready(&self) -> Readiness {
        Readiness::ready()
    }

    fn typeset(&self, _jobs: Vec<MathJob>) -> MathPass {
        MathPass::failed("unbalanced braces")
    }
}

/// Delegates to resvg, recording capture time and surface state.
struct ObservingRasterizer {
    env: Arc<OffscreenEnvironment>,
    captured_at: Arc<Mutex<Option<Instant>>>,
    attached_during_capture: Arc<Mutex<Option<usize>>>,
    pending_math_at_capture: Arc<Mutex<Option<usize>>>,
}

impl ObservingRasterizer {
    fn new(env: &Arc<OffscreenEnvironment>) -> Self {
        Self {
            env: Arc::clone(env),
            captured_at: Arc::default(),
            attached_during_capture: Arc::default(),
            pending_math_at_capture: Arc::default(),
        }
    }
}

impl Rasterizer for ObservingRasterizer {
    fn capture(&self, surface: &DetachedSurface) -> Result<Bitmap, ExportError> {
        *self.captured_at.lock().unwrap() = Some(Instant::now());
        *self.attached_during_capture.lock().unwrap() = Some(self.env.attached());
        *self.pending_math_at_capture.lock().unwrap() = Some(surface.pending_math());
        ResvgRasterizer::default().with_scale(1.0).capture(surface)
    }
}

struct FailingRasterizer;

impl Rasterizer for FailingRasterizer {
    fn capture(&self, _surface: &DetachedSurface) -> Result<Bitmap, ExportError> {
        Err(ExportError::Capture("tainted image".into()))
    }
}

/// Blocks inside capture until released.
struct GatedRasterizer {
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl Rasterizer for GatedRasterizer {
    fn capture(&self, surface: &DetachedSurface) -> Result<Bitmap, ExportError> {
        let _ = self.entered.lock().unwrap().send(());
        let _ = self.release.lock().unwrap().recv();
        ResvgRasterizer::default().with_scale(1.0).capture(surface)
    }
}

struct RefusingEnvironment;

impl RenderEnvironment for RefusingEnvironment {
    fn attach(&self, _id: SurfaceId) -> Result<(), ExportError> {
        Err(ExportError::Environment("no render target available".into()))
    }

    fn detach(&self, _id: SurfaceId) {}

    fn attached(&self) -> usize {
        0
    }
}

struct FailingSink;

impl ArtifactSink for FailingSink {
    fn save(&mut self, artifact: &Artifact) -> Result<Option<PathBuf>, ExportError> {
        Err(ExportError::Save {
            path: PathBuf::from(&artifact.filename),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[test]
fn test_heading_and_paragraph_export_succeeds() {
    let h = Harness::new();
    let report = saved(h.default_exporter().export(&view("# Hello\n\nWorld")));

    let artifacts = h.sink.artifacts();
    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].bytes.starts_with(b"%PDF-"));
    assert_eq!(artifacts[0].filename, "markdown-document.pdf");
    assert_eq!(report.bytes, artifacts[0].bytes.len());
    assert_eq!(report.math, MathStatus::NotNeeded);
    assert_eq!(h.notifier.levels(), vec![NoticeLevel::Info]);
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_inline_math_is_settled_before_capture() {
    let h = Harness::new();
    let rasterizer = ObservingRasterizer::new(&h.env);
    let pending = Arc::clone(&rasterizer.pending_math_at_capture);
    let exporter = h.default_exporter().with_rasterizer(Box::new(rasterizer));

    let report = saved(exporter.export(&view("$E = mc^2$")));
    assert!(matches!(report.math, MathStatus::Settled { count: 1, .. }));
    assert!(report.bitmap_width > 0 && report.bitmap_height > 0);
    assert_eq!(*pending.lock().unwrap(), Some(0));
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_empty_document_exports_one_blank_page() {
    let h = Harness::new();
    let report = saved(h.default_exporter().export(&view("")));
    assert!(report.empty_document);
    assert_eq!(report.pages, 1);
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn test_capture_failure_saves_nothing_and_detaches() {
    let h = Harness::new();
    let exporter = h
        .default_exporter()
        .with_rasterizer(Box::new(FailingRasterizer));

    let err = failed(exporter.export(&view("# Hello\n\n$x$")));
    assert!(matches!(err, ExportError::Capture(_)));
    assert!(h.sink.is_empty());
    assert_eq!(h.notifier.levels(), vec![NoticeLevel::Error]);
    assert!(h.notifier.notices()[0].message.contains("tainted image"));
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_missing_fonts_fail_instead_of_saving_blank_page() {
    let h = Harness::new();
    let rasterizer = ResvgRasterizer::new(Arc::new(resvg::usvg::fontdb::Database::new()));
    let exporter = h.default_exporter().with_rasterizer(Box::new(rasterizer));

    let err = failed(exporter.export(&view("# Hello\n\nWorld")));
    assert!(matches!(err, ExportError::Capture(ref msg) if msg.contains("no usable fonts")));
    assert!(h.sink.is_empty());
    assert_eq!(h.notifier.levels(), vec![NoticeLevel::Error]);
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_deeply_nested_math_exports() {
    let h = Harness::new();
    let depth = 100_000;
    let source = format!("${}x{}$", "{".repeat(depth), "}".repeat(depth));
    let report = saved(h.default_exporter().export(&view(&source)));
    assert!(matches!(report.math, MathStatus::Settled { count: 1, .. }));
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn test_deeply_nested_blocks_export() {
    let h = Harness::new();
    let source = format!("{}quoted\n\n{}listed", "> ".repeat(300), "- ".repeat(300));
    saved(h.default_exporter().export(&view(&source)));
    assert_eq!(h.sink.len(), 1);
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_capture_waits_for_delayed_math() {
    let h = Harness::new();
    let delay = Duration::from_millis(300);
    let finished_at = Arc::new(Mutex::new(None));
    let rasterizer = ObservingRasterizer::new(&h.env);
    let captured_at = Arc::clone(&rasterizer.captured_at);
    let exporter = h
        .default_exporter()
        .with_typesetter(Arc::new(DelayedTypesetter {
            delay,
            finished_at: Arc::clone(&finished_at),
        }))
        .with_rasterizer(Box::new(rasterizer));

    let started = Instant::now();
    saved(exporter.export(&view("Before $a^2 + b^2$ after")));

    let captured = captured_at.lock().unwrap().expect("capture ran");
    let finished = finished_at.lock().unwrap().expect("math finished");
    assert!(captured >= finished);
    assert!(captured.duration_since(started) >= delay);
}

#[test]
fn test_surface_attached_only_during_capture() {
    let h = Harness::new();
    let rasterizer = ObservingRasterizer::new(&h.env);
    let attached = Arc::clone(&rasterizer.attached_during_capture);
    let exporter = h.default_exporter().with_rasterizer(Box::new(rasterizer));

    saved(exporter.export(&view("text")));
    assert_eq!(*attached.lock().unwrap(), Some(1));
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_environment_failure_is_reported() {
    let h = Harness::new();
    let exporter = h
        .default_exporter()
        .with_environment(Arc::new(RefusingEnvironment));
    let err = failed(exporter.export(&view("# Hello")));
    assert_eq!(err.stage(), "surface");
    assert!(h.sink.is_empty());
    assert_eq!(h.notifier.levels(), vec![NoticeLevel::Error]);
}

#[test]
fn test_math_layout_failure_aborts_and_detaches() {
    let h = Harness::new();
    let exporter = h
        .default_exporter()
        .with_typesetter(Arc::new(BrokenTypesetter));
    let err = failed(exporter.export(&view("$x^2$")));
    assert!(matches!(err, ExportError::MathLayout(_)));
    assert!(h.sink.is_empty());
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_packaging_failure_aborts_and_detaches() {
    let h = Harness::new();
    let settings = ExportSettings {
        layout: PageLayout::Paged(PageSpec {
            width: 100.0,
            height: 100.0,
            margin: 60.0,
        }),
        ..ExportSettings::default()
    };
    let err = failed(h.exporter(settings).export(&view("# Hello")));
    assert!(matches!(err, ExportError::Packaging(_)));
    assert!(h.sink.is_empty());
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_save_failure_is_reported() {
    let h = Harness::new();
    let exporter = h.default_exporter().with_sink(Box::new(FailingSink));
    let err = failed(exporter.export(&view("# Hello")));
    assert_eq!(err.stage(), "save");
    assert_eq!(h.notifier.levels(), vec![NoticeLevel::Error]);
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_unready_typesetter_degrades_with_warning() {
    let h = Harness::new();
    let settings = ExportSettings {
        math_ready_timeout: Duration::from_millis(50),
        ..ExportSettings::default()
    };
    let exporter = h
        .exporter(settings)
        .with_typesetter(Arc::new(StalledTypesetter::default()));

    let report = saved(exporter.export(&view("$x$")));
    assert!(matches!(report.math, MathStatus::Unavailable(_)));
    assert!(report.math.is_degraded());
    assert_eq!(
        h.notifier.levels(),
        vec![NoticeLevel::Warning, NoticeLevel::Info]
    );
    assert_eq!(h.sink.len(), 1);
}

#[test]
fn test_stalled_layout_times_out_and_still_exports() {
    let h = Harness::new();
    let settings = ExportSettings {
        math_layout_timeout: Duration::from_millis(50),
        ..ExportSettings::default()
    };
    let exporter = h.exporter(settings).with_typesetter(Arc::new(StalledTypesetter {
        ready_on_time: true,
        ..StalledTypesetter::default()
    }));

    let report = saved(exporter.export(&view("$$\\sqrt{2}$$")));
    assert_eq!(report.math, MathStatus::TimedOut);
    assert_eq!(h.sink.len(), 1);
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_unrendered_view_is_skipped() {
    let h = Harness::new();
    let outcome = h
        .default_exporter()
        .export(&DocumentView::unrendered("# later", Theme::light()));
    assert!(matches!(outcome, ExportOutcome::Skipped));
    assert!(h.sink.is_empty());
    assert!(h.notifier.notices().is_empty());
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_second_export_while_in_flight_is_busy() {
    let h = Harness::new();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let exporter = h.default_exporter().with_rasterizer(Box::new(GatedRasterizer {
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    }));
    let doc = view("# Hello");

    thread::scope(|s| {
        let first = s.spawn(|| exporter.export(&doc));
        entered_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first export reached capture");
        assert!(exporter.is_busy());
        assert!(matches!(exporter.export(&doc), ExportOutcome::Busy));
        assert_eq!(h.env.attached(), 1);

        release_tx.send(()).unwrap();
        assert!(first.join().unwrap().is_saved());
    });

    assert!(!exporter.is_busy());
    assert_eq!(h.sink.len(), 1);
    assert_eq!(h.env.attached(), 0);
}

#[test]
fn test_theme_does_not_change_exported_pdf() {
    let source = "# Title\n\nBody with [a link](https://example.com) and `code`.";
    let dark = Harness::new();
    let light = Harness::new();
    saved(dark.default_exporter().export(&view(source)));
    saved(
        light
            .default_exporter()
            .export(&DocumentView::render(source, Theme::light()).unwrap()),
    );
    assert_eq!(
        dark.sink.artifacts()[0].bytes,
        light.sink.artifacts()[0].bytes
    );
}

#[test]
fn test_live_view_survives_export() {
    let h = Harness::new();
    let doc = view("# Keep\n\n$y$");
    let before = doc.tree().cloned();
    saved(h.default_exporter().export(&doc));
    assert_eq!(doc.tree().cloned(), before);
}
