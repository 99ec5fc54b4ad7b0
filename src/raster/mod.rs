//! Rasterization of detached surfaces.
//!
//! The surface's SVG is parsed with usvg against the shared system font
//! database and rendered with resvg onto a pixmap pre-filled with white, so
//! transparency in the source never reaches the bitmap as black.

use std::io::Cursor;
use std::sync::Arc;

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use resvg::usvg::fontdb;

use crate::document::FontRole;
use crate::error::ExportError;
use crate::surface::{DetachedSurface, Scene, SceneItem, family_for, font_database};

/// Device pixels per CSS pixel.
pub const SCALE_FACTOR: f32 = 2.0;
/// JPEG quality for page images.
pub const IMAGE_QUALITY: u8 = 98;

/// An opaque RGB capture of a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pixels: RgbImage,
}

impl Bitmap {
    pub const fn new(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub const fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Lossy encoding at `quality` (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, ExportError> {
        encode_jpeg(&self.pixels, quality)
    }
}

pub fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut bytes), quality.clamp(1, 100));
    pixels
        .write_with_encoder(encoder)
        .map_err(|err| ExportError::Packaging(format!("jpeg encoding failed: {err}")))?;
    Ok(bytes)
}

/// Captures a laid-out surface as a bitmap.
pub trait Rasterizer: Send + Sync {
    fn capture(&self, surface: &DetachedSurface) -> Result<Bitmap, ExportError>;
}

pub struct ResvgRasterizer {
    fontdb: Arc<fontdb::Database>,
    scale: f32,
}

impl Default for ResvgRasterizer {
    fn default() -> Self {
        Self::new(font_database())
    }
}

impl ResvgRasterizer {
    pub const fn new(fontdb: Arc<fontdb::Database>) -> Self {
        Self {
            fontdb,
            scale: SCALE_FACTOR,
        }
    }

    #[must_use]
    pub const fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Fail when a text item's family resolves to no face. resvg drops such
    /// text without an error.
    pub fn check_fonts(&self, scene: &Scene) -> Result<(), ExportError> {
        let mut roles: Vec<FontRole> = Vec::new();
        for item in &scene.items {
            let role = match item {
                SceneItem::Text { style, .. } => style.font,
                SceneItem::MathPlaceholder { .. } => FontRole::Mono,
                _ => continue,
            };
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        for role in roles {
            let query = fontdb::Query {
                families: &[family_for(role)],
                ..fontdb::Query::default()
            };
            if self.fontdb.query(&query).is_none() {
                return Err(ExportError::Capture(format!(
                    "no usable fonts for {role:?} text ({} faces loaded)",
                    self.fontdb.len()
                )));
            }
        }
        Ok(())
    }

    /// Render an SVG document to an opaque bitmap.
    pub fn rasterize_svg(&self, svg: &str) -> Result<Bitmap, ExportError> {
        let opts = resvg::usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        let tree = resvg::usvg::Tree::from_str(svg, &opts)
            .map_err(|err| ExportError::Capture(format!("invalid surface markup: {err}")))?;
        let size = tree.size();

        let width = (size.width() * self.scale).ceil() as u32;
        let height = (size.height() * self.scale).ceil() as u32;
        let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            ExportError::Capture(format!("surface too large to capture ({width}x{height})"))
        })?;
        pixmap.fill(resvg::tiny_skia::Color::WHITE);

        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::from_scale(self.scale, self.scale),
            &mut pixmap.as_mut(),
        );

        // Opaque after the white fill, so premultiplied equals straight RGB.
        let rgb: Vec<u8> = pixmap
            .data()
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        let pixels = RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| ExportError::Capture("pixmap size mismatch".into()))?;
        Ok(Bitmap::new(pixels))
    }
}

impl Rasterizer for ResvgRasterizer {
    fn capture(&self, surface: &DetachedSurface) -> Result<Bitmap, ExportError> {
        let _scope = crate::perf::scope("raster.capture");
        self.check_fonts(surface.scene())?;
        let bitmap = self.rasterize_svg(&surface.to_svg())?;
        crate::perf::log_event(
            "raster.capture",
            format!("bitmap={}x{}", bitmap.width(), bitmap.height()),
        );
        Ok(bitmap)
    }
}
