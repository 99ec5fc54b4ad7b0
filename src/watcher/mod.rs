//! Source file watching for `--watch` re-exports.
//!
//! Every debounced change to the markdown file is one more export of the same
//! document view.
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

/// Quiet period after the last event before a change is reported.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches one markdown file and reports debounced edits.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    parent_dir: PathBuf,
    source_path: PathBuf,
    source_name: Option<OsString>,
    debounce: Duration,
    dirty_since: Option<Instant>,
}

impl SourceWatcher {
    /// Start watching `path`.
    ///
    /// The parent directory is watched rather than the file itself, so
    /// editors that save by rename are still seen.
    pub fn new(path: impl AsRef<Path>, debounce: Duration) -> notify::Result<Self> {
        // Backends report canonical paths.
        let source_path = path
            .as_ref()
            .canonicalize()
            .unwrap_or_else(|_| path.as_ref().to_path_buf());
        let source_name = source_path.file_name().map(std::ffi::OsStr::to_os_string);
        let parent_dir = parent_dir_of(&source_path);

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.watch(&parent_dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(path = %source_path.display(), "watching source");

        Ok(Self {
            _watcher: watcher,
            rx,
            parent_dir,
            source_path,
            source_name,
            debounce,
            dirty_since: None,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Drain pending events; true once an edit has settled for the debounce period.
    pub fn take_change_ready(&mut self) -> bool {
        let mut touched = false;
        let mut drained = 0u32;
        while let Ok(event) = self.rx.try_recv() {
            drained += 1;
            match event {
                Ok(ev) if self.touches_source(&ev) => touched = true,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "watch backend error");
                    crate::perf::log_event("watcher.error", format!("{err}"));
                }
            }
        }
        if drained > 0 {
            crate::perf::log_event(
                "watcher.poll",
                format!("events={drained} touched={touched}"),
            );
        }

        if touched {
            self.dirty_since = Some(Instant::now());
        }
        match self.dirty_since {
            Some(since) if since.elapsed() >= self.debounce => {
                self.dirty_since = None;
                true
            }
            _ => false,
        }
    }

    /// The new file contents once a settled change is ready.
    pub fn poll_source(&mut self) -> Option<Result<String>> {
        if !self.take_change_ready() {
            return None;
        }
        Some(
            fs::read_to_string(&self.source_path)
                .with_context(|| format!("Failed to read {}", self.source_path.display())),
        )
    }

    fn touches_source(&self, event: &Event) -> bool {
        event.paths.iter().any(|path| {
            path == &self.parent_dir
                || path == &self.source_path
                || self
                    .source_name
                    .as_ref()
                    .is_some_and(|name| path.file_name().is_some_and(|f| f == name))
        })
    }
}

fn parent_dir_of(path: &Path) -> PathBuf {
    crate::document::base_dir_for(path)
}
