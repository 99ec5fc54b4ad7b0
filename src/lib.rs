// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. export::ExportError)
    clippy::module_name_repetitions
)]

//! # mdpress
//!
//! Export markdown (with `$`-delimited TeX math) to print-ready PDF.
//!
//! An export is a fixed pipeline over the styled visual tree of a document:
//!
//! 1. **Normalize**: re-style the tree with the print-safe palette
//! 2. **Surface**: lay it out off-screen at a fixed width
//! 3. **Math wait**: block, with a bound, until math glyph layout settles
//! 4. **Rasterize**: capture the surface as an opaque bitmap
//! 5. **Package**: place the bitmap on PDF pages and hand it to a sink
//!
//! ## Modules
//!
//! - [`document`]: Markdown parsing into the visual tree
//! - [`style`]: Interactive themes and the print palette
//! - [`normalize`]: Print-safe restyling
//! - [`surface`]: Detached layout surfaces
//! - [`math`]: TeX layout and the readiness wait
//! - [`raster`]: SVG capture to bitmaps
//! - [`package`]: PDF construction and sinks
//! - [`export`]: Pipeline orchestration
//! - [`watcher`]: File watching for live re-export

pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod highlight;
pub mod image;
pub mod math;
pub mod normalize;
pub mod package;
pub mod perf;
pub mod raster;
pub mod style;
pub mod surface;
pub mod watcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::document::DocumentView;
    pub use crate::error::ExportError;
    pub use crate::export::{ExportOutcome, ExportSettings, Exporter};
    pub use crate::style::Theme;
}
