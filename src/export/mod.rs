//! Export orchestration.
//!
//! [`Exporter::export`] runs the whole pipeline for one document view:
//! normalize, lay out on a detached surface, wait for math, capture,
//! package, save. Stages run strictly in order on the calling thread; the
//! only suspension points are the bounded math waits. Every failure is
//! caught here, reported through the [`Notifier`], and returned as
//! [`ExportOutcome::Failed`]; the surface is released on every path.

mod notice;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub use notice::{LogNotifier, Notice, NoticeLevel, Notifier, RecordingNotifier};

use crate::document::DocumentView;
use crate::error::ExportError;
use crate::image::ImageLoader;
use crate::math::{MathOutcome, MathTypesetter, ReadyState, UnicodeTypesetter};
use crate::normalize::normalize;
use crate::package::{ArtifactSink, DEFAULT_FILENAME, FileSink, PageLayout, package};
use crate::raster::{IMAGE_QUALITY, Rasterizer, ResvgRasterizer};
use crate::surface::{DetachedSurface, FontMetrics, OffscreenEnvironment, RenderEnvironment, TextMeasure};

/// Fixed knobs of an exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub layout: PageLayout,
    pub filename: String,
    /// Bound on waiting for the math typesetter to load
    pub math_ready_timeout: Duration,
    /// Bound on waiting for the math layout pass
    pub math_layout_timeout: Duration,
    pub quality: u8,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            layout: PageLayout::default(),
            filename: DEFAULT_FILENAME.to_string(),
            math_ready_timeout: Duration::from_secs(5),
            math_layout_timeout: Duration::from_secs(10),
            quality: IMAGE_QUALITY,
        }
    }
}

/// How math was handled during an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathStatus {
    /// The document has no math
    NotNeeded,
    Settled { count: usize, waited: Duration },
    /// Layout did not finish in time; math captured as source
    TimedOut,
    /// The typesetter never became ready; math captured as source
    Unavailable(String),
}

impl MathStatus {
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::TimedOut | Self::Unavailable(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub normalize: Duration,
    pub layout: Duration,
    pub math: Duration,
    pub capture: Duration,
    pub package: Duration,
    pub save: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.normalize + self.layout + self.math + self.capture + self.package + self.save
    }
}

/// Summary of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub filename: String,
    pub saved_to: Option<PathBuf>,
    pub bitmap_width: u32,
    pub bitmap_height: u32,
    pub pages: usize,
    pub bytes: usize,
    pub empty_document: bool,
    pub math: MathStatus,
    pub timings: StageTimings,
}

#[derive(Debug)]
pub enum ExportOutcome {
    Saved(ExportReport),
    /// Nothing rendered yet; no side effects
    Skipped,
    /// Another export on this exporter is still running
    Busy,
    Failed(ExportError),
}

impl ExportOutcome {
    pub const fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Clears the in-flight flag on every exit path.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs the export pipeline with injected collaborators.
pub struct Exporter {
    settings: ExportSettings,
    environment: Arc<dyn RenderEnvironment>,
    typesetter: Arc<dyn MathTypesetter>,
    rasterizer: Box<dyn Rasterizer>,
    sink: Mutex<Box<dyn ArtifactSink>>,
    notifier: Arc<dyn Notifier>,
    measure: Arc<dyn TextMeasure>,
    in_flight: AtomicBool,
}

impl Exporter {
    /// An exporter with the default collaborators: in-process surfaces,
    /// the Unicode math typesetter, resvg capture, and a file sink at the
    /// configured filename.
    pub fn new(settings: ExportSettings) -> Self {
        let measure: Arc<dyn TextMeasure> = Arc::new(FontMetrics::system());
        let sink = FileSink::new(&settings.filename);
        Self {
            environment: Arc::new(OffscreenEnvironment::new()),
            typesetter: Arc::new(UnicodeTypesetter::new(Arc::clone(&measure))),
            rasterizer: Box::new(ResvgRasterizer::default()),
            sink: Mutex::new(Box::new(sink)),
            notifier: Arc::new(LogNotifier),
            measure,
            in_flight: AtomicBool::new(false),
            settings,
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Arc<dyn RenderEnvironment>) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_typesetter(mut self, typesetter: Arc<dyn MathTypesetter>) -> Self {
        self.typesetter = typesetter;
        self
    }

    #[must_use]
    pub fn with_rasterizer(mut self, rasterizer: Box<dyn Rasterizer>) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Box<dyn ArtifactSink>) -> Self {
        self.sink = Mutex::new(sink);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Text measurement for surface layout.
    #[must_use]
    pub fn with_measure(mut self, measure: Arc<dyn TextMeasure>) -> Self {
        self.measure = measure;
        self
    }

    pub const fn settings(&self) -> &ExportSettings {
        &self.settings
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Export the view's current tree. Never panics on pipeline failure.
    pub fn export(&self, view: &DocumentView) -> ExportOutcome {
        let Some(tree) = view.tree() else {
            let reason = ExportError::MissingTarget;
            tracing::debug!(%reason, "skipping export");
            crate::perf::log_event("export", format!("skipped: {reason}"));
            return ExportOutcome::Skipped;
        };
        let Some(_flight) = FlightGuard::acquire(&self.in_flight) else {
            tracing::warn!("export already in progress; rejecting");
            crate::perf::log_event("export", "rejected: busy");
            return ExportOutcome::Busy;
        };

        let _scope = crate::perf::scope("export.total");
        let started = Instant::now();
        match self.run(tree, view) {
            Ok(report) => {
                tracing::info!(
                    pages = report.pages,
                    bytes = report.bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "export finished"
                );
                let location = report
                    .saved_to
                    .as_ref()
                    .map_or_else(|| report.filename.clone(), |p| p.display().to_string());
                self.notifier.notify(Notice::info(format!(
                    "Exported {} page(s) to {location}",
                    report.pages
                )));
                ExportOutcome::Saved(report)
            }
            Err(err) => {
                tracing::error!(stage = err.stage(), error = %err, "export failed");
                crate::perf::log_event("export", format!("failed stage={} {err}", err.stage()));
                self.notifier
                    .notify(Notice::error(format!("Export failed: {err}")));
                ExportOutcome::Failed(err)
            }
        }
    }

    fn run(
        &self,
        tree: &crate::document::VisualTree,
        view: &DocumentView,
    ) -> Result<ExportReport, ExportError> {
        let mut timings = StageTimings::default();

        let normalized = {
            let scope = crate::perf::scope("export.normalize");
            let normalized = normalize(tree);
            timings.normalize = scope.elapsed();
            normalized
        };
        debug_assert!(normalized.leaked_tokens().is_empty());
        let empty_document = normalized.tree().is_empty();

        let mut surface = {
            let scope = crate::perf::scope("export.layout");
            let images = Arc::new(ImageLoader::new(view.base_dir()));
            let surface = DetachedSurface::attach(
                Arc::clone(&self.environment),
                normalized,
                Arc::clone(&self.measure),
                images,
            )?;
            timings.layout = scope.elapsed();
            surface
        };

        let math = {
            let scope = crate::perf::scope("export.math");
            let math = self.wait_for_math(&mut surface)?;
            timings.math = scope.elapsed();
            math
        };

        let bitmap = {
            let scope = crate::perf::scope("export.capture");
            let bitmap = self.rasterizer.capture(&surface)?;
            timings.capture = scope.elapsed();
            bitmap
        };
        drop(surface);

        let artifact = {
            let scope = crate::perf::scope("export.package");
            let artifact = package(
                &bitmap,
                self.settings.layout,
                self.settings.quality,
                &self.settings.filename,
            )?;
            timings.package = scope.elapsed();
            artifact
        };

        let saved_to = {
            let scope = crate::perf::scope("export.save");
            let mut sink = match self.sink.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let saved_to = sink.save(&artifact)?;
            timings.save = scope.elapsed();
            saved_to
        };

        Ok(ExportReport {
            filename: artifact.filename,
            saved_to,
            bitmap_width: bitmap.width(),
            bitmap_height: bitmap.height(),
            pages: artifact.pages,
            bytes: artifact.bytes.len(),
            empty_document,
            math,
            timings,
        })
    }

    /// Block until the surface's math is laid out, or degrade.
    fn wait_for_math(&self, surface: &mut DetachedSurface) -> Result<MathStatus, ExportError> {
        let jobs = surface.math_jobs();
        if jobs.is_empty() {
            return Ok(MathStatus::NotNeeded);
        }
        let started = Instant::now();

        match self
            .typesetter
            .ensure_ready()
            .wait(self.settings.math_ready_timeout)
        {
            ReadyState::Ready => {}
            ReadyState::TimedOut => {
                return Ok(self.degraded(MathStatus::Unavailable(format!(
                    "not ready after {:?}",
                    self.settings.math_ready_timeout
                ))));
            }
            ReadyState::Failed(reason) => {
                return Ok(self.degraded(MathStatus::Unavailable(reason)));
            }
        }

        let count = jobs.len();
        crate::perf::log_event("export.math", format!("typesetting {count} node(s)"));
        match self
            .typesetter
            .typeset(jobs)
            .wait(self.settings.math_layout_timeout)
        {
            MathOutcome::Completed(layouts) => {
                surface.settle_math(layouts);
                let waited = started.elapsed();
                tracing::debug!(count, waited_ms = waited.as_millis() as u64, "math settled");
                Ok(MathStatus::Settled { count, waited })
            }
            MathOutcome::TimedOut => Ok(self.degraded(MathStatus::TimedOut)),
            MathOutcome::Failed(reason) => Err(ExportError::MathLayout(reason)),
        }
    }

    fn degraded(&self, status: MathStatus) -> MathStatus {
        let message = match &status {
            MathStatus::Unavailable(reason) => format!(
                "{}; math exported as source",
                ExportError::ResourceLoad(reason.clone())
            ),
            _ => "Math layout did not finish in time; math exported as source".to_string(),
        };
        tracing::warn!(?status, "continuing export without final math layout");
        crate::perf::log_event("export.math", &message);
        self.notifier.notify(Notice::warning(message));
        status
    }
}
