//! mdpress - export markdown with math to PDF.
//!
//! # Usage
//!
//! ```bash
//! mdpress README.md
//! mdpress README.md -o readme.pdf --layout single
//! mdpress --watch notes.md
//! ```

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use mdpress::config::{
    ConfigFlags, LayoutMode, ThemeMode, clear_config_flags, global_config_path, load_config_flags,
    local_override_path, parse_flag_tokens, save_config_flags,
};
use mdpress::document::{DocumentView, base_dir_for};
use mdpress::export::{ExportOutcome, ExportSettings, Exporter};
use mdpress::package::{DEFAULT_FILENAME, FileSink};
use mdpress::perf;
use mdpress::style::Theme;
use mdpress::watcher::{DEFAULT_DEBOUNCE, SourceWatcher};

const WATCH_POLL: Duration = Duration::from_millis(250);

/// Export markdown with math to a print-ready PDF
#[derive(Parser, Debug)]
#[command(name = "mdpress", version, about, long_about = None)]
struct Cli {
    /// Markdown file to export
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output PDF path
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Watch the file and re-export on every change
    #[arg(short, long)]
    watch: bool,

    /// Interactive theme the document is styled with before export
    #[arg(long, value_enum)]
    theme: Option<ThemeMode>,

    /// Page layout of the PDF
    #[arg(long, value_enum)]
    layout: Option<LayoutMode>,

    /// Print per-stage timings
    #[arg(long)]
    perf: bool,

    /// Write detailed export debug events to a file
    #[arg(long, value_name = "PATH")]
    render_debug_log: Option<PathBuf>,

    /// Save current command-line flags as defaults
    #[arg(long)]
    save: bool,

    /// Clear saved defaults
    #[arg(long)]
    clear: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let raw_args = std::env::args().collect::<Vec<_>>();
    let cli = Cli::parse();
    let global_path = global_config_path();
    let local_path = local_override_path();
    let cli_flags = parse_flag_tokens(&raw_args);

    if cli.clear {
        clear_config_flags(&global_path)?;
    }
    if cli.save {
        save_config_flags(&global_path, &cli_flags)?;
    }

    let file_flags = if cli.clear {
        ConfigFlags::default()
    } else {
        let global_flags = load_config_flags(&global_path)?;
        let local_flags = load_config_flags(&local_path)?;
        global_flags.union(&local_flags)
    };
    let effective = file_flags.union(&cli_flags);

    perf::set_enabled(effective.perf);
    let render_debug_log_path = effective
        .render_debug_log
        .clone()
        .or_else(|| std::env::var_os("MDPRESS_RENDER_DEBUG_LOG").map(PathBuf::from));
    if let Err(err) = perf::set_debug_log_path(render_debug_log_path.as_deref()) {
        eprintln!(
            "[warn] Failed to initialize render debug log {}: {}",
            render_debug_log_path
                .as_ref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string()),
            err
        );
    }

    if !cli.file.exists() {
        anyhow::bail!("File not found: {}", cli.file.display());
    }

    let output = effective
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FILENAME));
    let settings = ExportSettings {
        layout: effective.layout.unwrap_or_default().into(),
        filename: output
            .file_name()
            .map_or_else(|| DEFAULT_FILENAME.to_string(), |n| n.to_string_lossy().into_owned()),
        ..ExportSettings::default()
    };
    let exporter = Exporter::new(settings).with_sink(Box::new(FileSink::new(&output)));
    let theme = Theme::for_mode(effective.theme.unwrap_or_default());

    let source = read_source(&cli.file)?;
    let mut view = DocumentView::render(source, theme)
        .context("Failed to render document")?
        .with_base_dir(base_dir_for(&cli.file));

    let outcome = export_once(&exporter, &view);
    if !effective.watch {
        if let ExportOutcome::Failed(err) = outcome {
            // Already reported by the notifier.
            tracing::debug!(stage = err.stage(), "exiting after failed export");
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut watcher = SourceWatcher::new(&cli.file, DEFAULT_DEBOUNCE)
        .with_context(|| format!("Failed to watch {}", cli.file.display()))?;
    eprintln!("Watching {} (Ctrl-C to stop)", watcher.source_path().display());
    loop {
        thread::sleep(WATCH_POLL);
        let Some(changed) = watcher.poll_source() else {
            continue;
        };
        match changed.and_then(|source| view.update_source(source)) {
            Ok(()) => {
                export_once(&exporter, &view);
            }
            Err(err) => eprintln!("error: {err:#}"),
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn export_once(exporter: &Exporter, view: &DocumentView) -> ExportOutcome {
    let outcome = exporter.export(view);
    if perf::is_enabled()
        && let ExportOutcome::Saved(report) = &outcome
    {
        let t = &report.timings;
        eprintln!(
            "[perf] normalize={:?} layout={:?} math={:?} capture={:?} package={:?} save={:?} total={:?}",
            t.normalize,
            t.layout,
            t.math,
            t.capture,
            t.package,
            t.save,
            t.total()
        );
    }
    outcome
}
