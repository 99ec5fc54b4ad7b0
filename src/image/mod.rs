//! Visual sub-resources referenced by the document.

mod loader;

pub use loader::{EmbeddedImage, ImageCache, ImageLoader};
