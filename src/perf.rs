//! Stage timing (`--perf`) and the export debug log (`--render-debug-log`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

static PRINT_TIMINGS: AtomicBool = AtomicBool::new(false);
static DEBUG_LOG: Mutex<Option<DebugLog>> = Mutex::new(None);

/// An open debug log; timestamps are relative to when it was opened.
struct DebugLog {
    opened: Instant,
    out: BufWriter<File>,
}

impl DebugLog {
    fn write_line(&mut self, name: &str, detail: &str) -> io::Result<()> {
        let ms = self.opened.elapsed().as_secs_f64() * 1000.0;
        writeln!(self.out, "[{ms:>10.3} ms] {name}: {detail}")?;
        self.out.flush()
    }
}

fn debug_log() -> MutexGuard<'static, Option<DebugLog>> {
    match DEBUG_LOG.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Times one pipeline stage until dropped.
#[derive(Debug)]
pub struct Scope {
    stage: &'static str,
    started: Instant,
}

impl Scope {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let ms = self.elapsed().as_secs_f64() * 1000.0;
        tracing::trace!(stage = self.stage, elapsed_ms = ms, "stage finished");
        if is_enabled() {
            eprintln!("[perf] {}: {ms:.2} ms", self.stage);
        }
        log_event(self.stage, format!("done in {ms:.3} ms"));
    }
}

pub fn scope(stage: &'static str) -> Scope {
    Scope {
        stage,
        started: Instant::now(),
    }
}

/// Print stage timings to stderr as scopes close.
pub fn set_enabled(enabled: bool) {
    PRINT_TIMINGS.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    PRINT_TIMINGS.load(Ordering::Relaxed)
}

/// Open (or, with `None`, close) the debug log.
pub fn set_debug_log_path(path: Option<&Path>) -> io::Result<()> {
    let mut slot = debug_log();
    *slot = None;
    if let Some(path) = path {
        let mut log = DebugLog {
            opened: Instant::now(),
            out: BufWriter::new(File::create(path)?),
        };
        log.write_line("mdpress", "export debug log opened")?;
        *slot = Some(log);
    }
    Ok(())
}

pub fn is_debug_log_enabled() -> bool {
    debug_log().is_some()
}

/// Append one event line to the debug log, if open. Write errors are dropped.
pub fn log_event(name: &str, detail: impl AsRef<str>) {
    if let Some(log) = debug_log().as_mut() {
        let _ = log.write_line(name, detail.as_ref());
    }
}
