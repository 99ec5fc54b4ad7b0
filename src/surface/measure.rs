//! Text measurement for layout.
//!
//! Layout only needs horizontal advances. [`FontMetrics`] reads them from the
//! same font database the rasterizer renders with, so wrapped lines match the
//! glyphs resvg draws. [`ApproxMeasure`] estimates from display width and is
//! used when no font resolves, and in tests that need stable numbers.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use resvg::usvg::fontdb;
use unicode_width::UnicodeWidthStr;

use crate::document::FontRole;

const SERIF_CANDIDATES: &[&str] = &[
    "DejaVu Serif",
    "Liberation Serif",
    "Noto Serif",
    "Times New Roman",
];
const SANS_CANDIDATES: &[&str] = &["DejaVu Sans", "Liberation Sans", "Noto Sans", "Arial"];
const MONO_CANDIDATES: &[&str] = &[
    "DejaVu Sans Mono",
    "Liberation Mono",
    "Noto Sans Mono",
    "Courier New",
];

static FONT_DATABASE: LazyLock<Arc<fontdb::Database>> = LazyLock::new(|| {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    configure_generic_families(&mut db);
    tracing::debug!(faces = db.len(), "loaded system fonts");
    Arc::new(db)
});

/// System font database shared by measurement and rasterization.
pub fn font_database() -> Arc<fontdb::Database> {
    Arc::clone(&FONT_DATABASE)
}

fn configure_generic_families(db: &mut fontdb::Database) {
    let pick = |db: &fontdb::Database, candidates: &[&str]| {
        candidates
            .iter()
            .find(|name| {
                db.faces()
                    .any(|face| face.families.iter().any(|(family, _)| family == *name))
            })
            .map(|name| (*name).to_string())
    };
    if let Some(name) = pick(db, SERIF_CANDIDATES) {
        db.set_serif_family(name);
    }
    if let Some(name) = pick(db, SANS_CANDIDATES) {
        db.set_sans_serif_family(name);
    }
    if let Some(name) = pick(db, MONO_CANDIDATES) {
        db.set_monospace_family(name);
    }
}

/// Measures horizontal text advances in CSS pixels.
pub trait TextMeasure: Send + Sync {
    fn advance(&self, text: &str, size: f32, font: FontRole, bold: bool) -> f32;

    /// Baseline-to-baseline distance for a line of `size` text.
    fn line_height(&self, size: f32) -> f32 {
        size * 1.5
    }
}

/// Width estimate from unicode display width.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxMeasure;

impl ApproxMeasure {
    const fn em_ratio(font: FontRole, bold: bool) -> f32 {
        let base = match font {
            FontRole::Mono => 0.6,
            FontRole::Sans | FontRole::Serif | FontRole::Math => 0.5,
        };
        if bold { base + 0.05 } else { base }
    }
}

impl TextMeasure for ApproxMeasure {
    fn advance(&self, text: &str, size: f32, font: FontRole, bold: bool) -> f32 {
        text.width() as f32 * size * Self::em_ratio(font, bold)
    }
}

struct FaceBlob {
    data: Vec<u8>,
    index: u32,
}

/// Glyph advances read with ttf-parser from resolved system faces.
pub struct FontMetrics {
    faces: HashMap<(FontRole, bool), FaceBlob>,
    fallback: ApproxMeasure,
}

impl FontMetrics {
    /// Resolve a face per role and weight. Roles with no face fall back to
    /// [`ApproxMeasure`].
    pub fn load(db: &fontdb::Database) -> Self {
        let mut faces = HashMap::new();
        for font in [FontRole::Sans, FontRole::Serif, FontRole::Mono, FontRole::Math] {
            for bold in [false, true] {
                let family = family_for(font);
                let query = fontdb::Query {
                    families: &[family],
                    weight: if bold {
                        fontdb::Weight::BOLD
                    } else {
                        fontdb::Weight::NORMAL
                    },
                    stretch: fontdb::Stretch::Normal,
                    style: fontdb::Style::Normal,
                };
                let blob = db.query(&query).and_then(|id| {
                    db.with_face_data(id, |data, index| FaceBlob {
                        data: data.to_vec(),
                        index,
                    })
                });
                match blob {
                    Some(blob) => {
                        faces.insert((font, bold), blob);
                    }
                    None => tracing::debug!(?font, bold, "no face resolved, using estimates"),
                }
            }
        }
        Self {
            faces,
            fallback: ApproxMeasure,
        }
    }

    /// Metrics backed by the shared system font database.
    pub fn system() -> Self {
        Self::load(&font_database())
    }

    pub fn resolved_faces(&self) -> usize {
        self.faces.len()
    }
}

impl TextMeasure for FontMetrics {
    fn advance(&self, text: &str, size: f32, font: FontRole, bold: bool) -> f32 {
        let Some(blob) = self.faces.get(&(font, bold)) else {
            return self.fallback.advance(text, size, font, bold);
        };
        let Ok(face) = ttf_parser::Face::parse(&blob.data, blob.index) else {
            return self.fallback.advance(text, size, font, bold);
        };
        let units = f32::from(face.units_per_em());
        let mut width = 0.0;
        for ch in text.chars() {
            let advance = face
                .glyph_index(ch)
                .and_then(|id| face.glyph_hor_advance(id))
                .map(|adv| f32::from(adv) / units * size);
            width += advance.unwrap_or_else(|| {
                self.fallback
                    .advance(ch.encode_utf8(&mut [0; 4]), size, font, bold)
            });
        }
        width
    }
}

/// Generic family a role renders with. The same names go into the SVG.
pub const fn family_for(font: FontRole) -> fontdb::Family<'static> {
    match font {
        FontRole::Sans => fontdb::Family::SansSerif,
        FontRole::Serif | FontRole::Math => fontdb::Family::Serif,
        FontRole::Mono => fontdb::Family::Monospace,
    }
}
