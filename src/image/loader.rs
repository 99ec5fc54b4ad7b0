//! Image loading and caching.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, GenericImageView, ImageFormat};

/// An image ready to be placed on a surface: pixel size plus a PNG data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub width: u32,
    pub height: u32,
    pub data_url: String,
}

impl EmbeddedImage {
    /// Re-encode a decoded image as PNG so the renderer never refetches it.
    pub fn from_image(image: &DynamicImage) -> Option<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return None;
        }
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .ok()?;
        Some(Self {
            width,
            height,
            data_url: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
        })
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Arc<EmbeddedImage>>,
    order: VecDeque<String>,
}

/// Cache for embedded images, evicting oldest first.
#[derive(Debug, Default)]
pub struct ImageCache {
    inner: Mutex<CacheInner>,
    max_size: usize,
}

impl ImageCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<EmbeddedImage>> {
        self.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, image: Arc<EmbeddedImage>) {
        let mut guard = self.lock();
        if guard.entries.contains_key(&key) {
            guard.entries.insert(key, image);
            return;
        }
        guard.order.push_back(key.clone());
        guard.entries.insert(key, image);
        while guard.entries.len() > self.max_size {
            let Some(oldest) = guard.order.pop_front() else {
                break;
            };
            guard.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loads markdown image sources relative to the document directory.
///
/// Sources are local paths or `data:` URLs. Remote URLs are not fetched;
/// they resolve to `None` and the surface draws the alt text instead.
#[derive(Debug)]
pub struct ImageLoader {
    cache: ImageCache,
    base_path: PathBuf,
}

impl ImageLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            cache: ImageCache::new(50),
            base_path: base_path.into(),
        }
    }

    /// Load `src`, using the cache if available.
    pub fn load(&self, src: &str) -> Option<Arc<EmbeddedImage>> {
        if is_remote(src) {
            crate::perf::log_event("image.load", format!("skip remote src={src}"));
            return None;
        }
        let key = if src.starts_with("data:") {
            src.to_string()
        } else {
            self.resolve_path(src).to_string_lossy().into_owned()
        };
        if let Some(image) = self.cache.get(&key) {
            return Some(image);
        }

        let decoded = if let Some(payload) = src.strip_prefix("data:") {
            decode_data_url(payload)
        } else {
            image::open(self.resolve_path(src)).ok()
        };
        let Some(embedded) = decoded.as_ref().and_then(EmbeddedImage::from_image) else {
            tracing::debug!(src, "image failed to load");
            crate::perf::log_event("image.load", format!("failed src={src}"));
            return None;
        };
        let embedded = Arc::new(embedded);
        self.cache.insert(key, Arc::clone(&embedded));
        Some(embedded)
    }

    fn resolve_path(&self, src: &str) -> PathBuf {
        let path = Path::new(src);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub const fn cache(&self) -> &ImageCache {
        &self.cache
    }
}

fn is_remote(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
}

fn decode_data_url(payload: &str) -> Option<DynamicImage> {
    let (meta, data) = payload.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    let bytes = STANDARD.decode(data.trim()).ok()?;
    image::load_from_memory(&bytes).ok()
}
