//! Detached render surfaces.
//!
//! A surface holds one normalized tree laid out at a fixed width, attached to
//! an injected [`RenderEnvironment`] for the length of one export attempt.
//! Dropping the surface detaches it, so every exit path releases it.

mod layout;
mod measure;
mod svg;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub use layout::{LayoutInputs, RunStyle, Scene, SceneItem, layout, math_size};
pub use measure::{ApproxMeasure, FontMetrics, TextMeasure, family_for, font_database};
pub use svg::to_svg;

use crate::document::{MathId, NodeKind};
use crate::error::ExportError;
use crate::image::ImageLoader;
use crate::math::{MathJob, MathLayout};
use crate::normalize::NormalizedTree;

/// Rendering width in CSS pixels, independent of any window.
pub const CANONICAL_WIDTH: f32 = 800.0;
/// Page padding around the content box.
pub const PADDING: f32 = 32.0;

static NEXT_SURFACE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    fn next() -> Self {
        Self(NEXT_SURFACE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Provider of off-screen render targets.
pub trait RenderEnvironment: Send + Sync {
    fn attach(&self, id: SurfaceId) -> Result<(), ExportError>;

    fn detach(&self, id: SurfaceId);

    /// Number of surfaces currently attached.
    fn attached(&self) -> usize;
}

/// In-process environment that tracks attached surfaces.
#[derive(Debug, Default)]
pub struct OffscreenEnvironment {
    surfaces: Mutex<HashSet<SurfaceId>>,
}

impl OffscreenEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<SurfaceId>> {
        match self.surfaces.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RenderEnvironment for OffscreenEnvironment {
    fn attach(&self, id: SurfaceId) -> Result<(), ExportError> {
        if self.lock().insert(id) {
            Ok(())
        } else {
            Err(ExportError::Environment(format!(
                "surface {id:?} is already attached"
            )))
        }
    }

    fn detach(&self, id: SurfaceId) {
        self.lock().remove(&id);
    }

    fn attached(&self) -> usize {
        self.lock().len()
    }
}

/// A laid-out, off-screen copy of one normalized tree.
pub struct DetachedSurface {
    id: SurfaceId,
    env: Arc<dyn RenderEnvironment>,
    tree: NormalizedTree,
    measure: Arc<dyn TextMeasure>,
    images: Arc<ImageLoader>,
    math: HashMap<MathId, MathLayout>,
    scene: Scene,
}

impl DetachedSurface {
    /// Lay out `tree` at [`CANONICAL_WIDTH`] and attach it to `env`.
    pub fn attach(
        env: Arc<dyn RenderEnvironment>,
        tree: NormalizedTree,
        measure: Arc<dyn TextMeasure>,
        images: Arc<ImageLoader>,
    ) -> Result<Self, ExportError> {
        let math = HashMap::new();
        let scene = layout(
            tree.tree().root(),
            &LayoutInputs {
                measure: measure.as_ref(),
                images: images.as_ref(),
                math: &math,
            },
        );
        let id = SurfaceId::next();
        env.attach(id)?;
        tracing::debug!(?id, height = scene.height, "surface attached");
        Ok(Self {
            id,
            env,
            tree,
            measure,
            images,
            math,
            scene,
        })
    }

    pub const fn id(&self) -> SurfaceId {
        self.id
    }

    /// Math nodes still waiting for their glyph layout.
    pub fn math_jobs(&self) -> Vec<MathJob> {
        let mut jobs = Vec::new();
        self.tree.tree().walk(&mut |node| match &node.kind {
            NodeKind::MathInline(id, tex) | NodeKind::MathBlock(id, tex)
                if !self.math.contains_key(id) =>
            {
                jobs.push(MathJob {
                    id: *id,
                    tex: tex.clone(),
                    display: matches!(node.kind, NodeKind::MathBlock(..)),
                    size: math_size(node),
                });
            }
            _ => {}
        });
        jobs
    }

    /// Install final math geometry and re-run layout.
    pub fn settle_math(&mut self, layouts: Vec<MathLayout>) {
        if layouts.is_empty() {
            return;
        }
        for layout in layouts {
            self.math.insert(layout.id, layout);
        }
        self.scene = layout(
            self.tree.tree().root(),
            &LayoutInputs {
                measure: self.measure.as_ref(),
                images: self.images.as_ref(),
                math: &self.math,
            },
        );
        tracing::debug!(
            id = ?self.id,
            height = self.scene.height,
            pending = self.scene.pending_math(),
            "surface re-laid out with math"
        );
    }

    pub fn pending_math(&self) -> usize {
        self.scene.pending_math()
    }

    pub const fn scene(&self) -> &Scene {
        &self.scene
    }

    pub const fn width(&self) -> f32 {
        self.scene.width
    }

    pub const fn height(&self) -> f32 {
        self.scene.height
    }

    pub fn to_svg(&self) -> String {
        to_svg(&self.scene)
    }
}

impl Drop for DetachedSurface {
    fn drop(&mut self) {
        self.env.detach(self.id);
        tracing::debug!(id = ?self.id, "surface detached");
    }
}

impl std::fmt::Debug for DetachedSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetachedSurface")
            .field("id", &self.id)
            .field("width", &self.scene.width)
            .field("height", &self.scene.height)
            .field("items", &self.scene.items.len())
            .finish_non_exhaustive()
    }
}
