//! PDF packaging of captured bitmaps, and artifact sinks.
//!
//! Two layouts are supported and one is fixed per exporter:
//!
//! - [`PageLayout::Paged`]: physical pages with margins. The bitmap is scaled
//!   to the content width and cut into page-height tiles, one image per page.
//! - [`PageLayout::SinglePage`]: one page whose media box equals the bitmap
//!   size, the image placed at the origin.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use image::imageops;
use pdf_writer::{Content, Filter, Name, Pdf, Rect, Ref, TextStr};
use tempfile::NamedTempFile;

use crate::config::LayoutMode;
use crate::error::ExportError;
use crate::raster::{Bitmap, encode_jpeg};

/// Filename used when none is configured.
pub const DEFAULT_FILENAME: &str = "markdown-document.pdf";

/// A physical page size and uniform margin, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSpec {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageSpec {
    /// US letter, portrait, 1in margins.
    pub const LETTER: Self = Self {
        width: 612.0,
        height: 792.0,
        margin: 72.0,
    };

    pub fn content_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    pub fn content_height(&self) -> f32 {
        self.height - 2.0 * self.margin
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageLayout {
    SinglePage,
    Paged(PageSpec),
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::Paged(PageSpec::LETTER)
    }
}

impl From<LayoutMode> for PageLayout {
    fn from(mode: LayoutMode) -> Self {
        match mode {
            LayoutMode::Paged => Self::Paged(PageSpec::LETTER),
            LayoutMode::Single => Self::SinglePage,
        }
    }
}

/// A finished export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// One image placed on one page.
struct PagePlan {
    jpeg: Vec<u8>,
    pixel_width: u32,
    pixel_height: u32,
    media: (f32, f32),
    /// Image rectangle: x, y (bottom-left), width, height in points
    placement: [f32; 4],
}

/// Build a PDF from `bitmap`.
pub fn package(
    bitmap: &Bitmap,
    layout: PageLayout,
    quality: u8,
    filename: &str,
) -> Result<Artifact, ExportError> {
    let _scope = crate::perf::scope("package.pdf");
    let (width, height) = (bitmap.width(), bitmap.height());
    if width == 0 || height == 0 {
        return Err(ExportError::Packaging(format!(
            "bitmap has no area ({width}x{height})"
        )));
    }

    let plans = match layout {
        PageLayout::SinglePage => vec![PagePlan {
            jpeg: bitmap.encode_jpeg(quality)?,
            pixel_width: width,
            pixel_height: height,
            media: (width as f32, height as f32),
            placement: [0.0, 0.0, width as f32, height as f32],
        }],
        PageLayout::Paged(spec) => paged_plans(bitmap, spec, quality)?,
    };

    let bytes = write_pdf(&plans, filename);
    tracing::debug!(pages = plans.len(), bytes = bytes.len(), "packaged pdf");
    crate::perf::log_event(
        "package.pdf",
        format!("pages={} bytes={}", plans.len(), bytes.len()),
    );
    Ok(Artifact {
        filename: filename.to_string(),
        bytes,
        pages: plans.len(),
    })
}

fn paged_plans(bitmap: &Bitmap, spec: PageSpec, quality: u8) -> Result<Vec<PagePlan>, ExportError> {
    if spec.content_width() <= 0.0 || spec.content_height() <= 0.0 {
        return Err(ExportError::Packaging(format!(
            "page margins leave no content area ({spec:?})"
        )));
    }
    let (width, height) = (bitmap.width(), bitmap.height());
    let px_per_pt = width as f32 / spec.content_width();
    let tile = ((spec.content_height() * px_per_pt).floor() as u32).max(1);

    let mut plans = Vec::new();
    let mut top = 0;
    while top < height {
        let rows = tile.min(height - top);
        let slice = imageops::crop_imm(bitmap.pixels(), 0, top, width, rows).to_image();
        let tile_height_pt = rows as f32 / px_per_pt;
        plans.push(PagePlan {
            jpeg: encode_jpeg(&slice, quality)?,
            pixel_width: width,
            pixel_height: rows,
            media: (spec.width, spec.height),
            placement: [
                spec.margin,
                spec.height - spec.margin - tile_height_pt,
                spec.content_width(),
                tile_height_pt,
            ],
        });
        top += rows;
    }
    Ok(plans)
}

fn write_pdf(plans: &[PagePlan], title: &str) -> Vec<u8> {
    let mut pdf = Pdf::new();
    let catalog_id = Ref::new(1);
    let tree_id = Ref::new(2);
    let info_id = Ref::new(3);
    // Three objects per page: page, image, content stream.
    let page_ids: Vec<Ref> = (0..plans.len())
        .map(|i| Ref::new(4 + 3 * i as i32))
        .collect();

    pdf.catalog(catalog_id).pages(tree_id);
    pdf.pages(tree_id)
        .kids(page_ids.iter().copied())
        .count(plans.len() as i32);
    pdf.document_info(info_id)
        .title(TextStr(title))
        .producer(TextStr(concat!("mdpress ", env!("CARGO_PKG_VERSION"))));

    let image_name = Name(b"Im0");
    for (plan, page_id) in plans.iter().zip(&page_ids) {
        let image_id = Ref::new(page_id.get() + 1);
        let content_id = Ref::new(page_id.get() + 2);

        {
            let mut page = pdf.page(*page_id);
            page.media_box(Rect::new(0.0, 0.0, plan.media.0, plan.media.1));
            page.parent(tree_id);
            page.contents(content_id);
            page.resources().x_objects().pair(image_name, image_id);
        }

        {
            let mut image = pdf.image_xobject(image_id, &plan.jpeg);
            image.filter(Filter::DctDecode);
            image.width(plan.pixel_width as i32);
            image.height(plan.pixel_height as i32);
            image.color_space().device_rgb();
            image.bits_per_component(8);
        }

        let [x, y, w, h] = plan.placement;
        let mut content = Content::new();
        content.save_state();
        content.transform([w, 0.0, 0.0, h, x, y]);
        content.x_object(image_name);
        content.restore_state();
        pdf.stream(content_id, &content.finish());
    }

    pdf.finish()
}

/// Destination for finished artifacts.
pub trait ArtifactSink: Send {
    /// Store the artifact; returns where it landed, if on disk.
    fn save(&mut self, artifact: &Artifact) -> Result<Option<PathBuf>, ExportError>;
}

/// Writes artifacts to a fixed path.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ArtifactSink for FileSink {
    /// Writes a sibling temp file and renames it over the target, so a
    /// failed save never leaves a truncated PDF behind.
    fn save(&mut self, artifact: &Artifact) -> Result<Option<PathBuf>, ExportError> {
        let save_error = |source| ExportError::Save {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir).map_err(save_error)?;
        file.write_all(&artifact.bytes).map_err(save_error)?;
        file.as_file().sync_all().map_err(save_error)?;
        file.persist(&self.path).map_err(|err| save_error(err.error))?;
        tracing::info!(path = %self.path.display(), bytes = artifact.bytes.len(), "saved artifact");
        Ok(Some(self.path.clone()))
    }
}

/// Keeps artifacts in memory; clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    saved: Arc<Mutex<Vec<Artifact>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Artifact>> {
        match self.saved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactSink for MemorySink {
    fn save(&mut self, artifact: &Artifact) -> Result<Option<PathBuf>, ExportError> {
        self.lock().push(artifact.clone());
        Ok(None)
    }
}
