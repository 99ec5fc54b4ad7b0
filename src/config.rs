//! Saved default flags.
//!
//! Config files are plain lists of command-line flags, one or more per line,
//! `#` starting a comment. The global file lives in the platform config
//! directory; a `.mdpressrc` in the working directory overrides it, and the
//! command line overrides both.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

const APP_DIR: &str = "mdpress";
const LOCAL_FILE: &str = ".mdpressrc";

/// Interactive theme the document view is styled with.
#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThemeMode {
    #[default]
    Dark,
    Light,
}

impl ThemeMode {
    const fn name(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        match s {
            "dark" => Some(Self::Dark),
            "light" => Some(Self::Light),
            _ => None,
        }
    }
}

/// How the captured bitmap is laid out in the PDF.
#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    /// Letter pages with 1in margins, content tiled across pages
    #[default]
    Paged,
    /// One page sized to the bitmap
    Single,
}

impl LayoutMode {
    const fn name(self) -> &'static str {
        match self {
            Self::Paged => "paged",
            Self::Single => "single",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        match s {
            "paged" => Some(Self::Paged),
            "single" => Some(Self::Single),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFlags {
    pub watch: bool,
    pub perf: bool,
    pub theme: Option<ThemeMode>,
    pub layout: Option<LayoutMode>,
    pub output: Option<PathBuf>,
    pub render_debug_log: Option<PathBuf>,
}

impl ConfigFlags {
    /// Merge two flag sets; `other` wins for valued options.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            watch: self.watch || other.watch,
            perf: self.perf || other.perf,
            theme: other.theme.or(self.theme),
            layout: other.layout.or(self.layout),
            output: other.output.clone().or_else(|| self.output.clone()),
            render_debug_log: other
                .render_debug_log
                .clone()
                .or_else(|| self.render_debug_log.clone()),
        }
    }

    /// One config line per set flag, in a stable order.
    fn to_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.watch {
            lines.push("--watch".to_string());
        }
        if self.perf {
            lines.push("--perf".to_string());
        }
        if let Some(theme) = self.theme {
            lines.push(format!("--theme {}", theme.name()));
        }
        if let Some(layout) = self.layout {
            lines.push(format!("--layout {}", layout.name()));
        }
        if let Some(path) = &self.output {
            lines.push(format!("--output {}", path.display()));
        }
        if let Some(path) = &self.render_debug_log {
            lines.push(format!("--render-debug-log {}", path.display()));
        }
        lines
    }

    /// Apply one valued option; unknown names and values are ignored.
    fn set_value(&mut self, name: &str, value: &str) -> bool {
        match name {
            "--theme" => self.theme = ThemeMode::from_name(value),
            "--layout" => self.layout = LayoutMode::from_name(value),
            "--output" | "-o" => self.output = Some(PathBuf::from(value)),
            "--render-debug-log" => self.render_debug_log = Some(PathBuf::from(value)),
            _ => return false,
        }
        true
    }
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(PathBuf::from)
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join("Library").join("Application Support"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
    }
}

/// Global defaults file, or the local file when no config dir is known.
pub fn global_config_path() -> PathBuf {
    platform_config_dir().map_or_else(
        || PathBuf::from(LOCAL_FILE),
        |dir| dir.join(APP_DIR).join("config"),
    )
}

pub fn local_override_path() -> PathBuf {
    PathBuf::from(LOCAL_FILE)
}

/// Read flags from `path`; a missing file is empty.
pub fn load_config_flags(path: &Path) -> Result<ConfigFlags> {
    if !path.exists() {
        return Ok(ConfigFlags::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let tokens = content
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .flat_map(str::split_whitespace)
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();
    Ok(parse_flag_tokens(&tokens))
}

pub fn save_config_flags(path: &Path, flags: &ConfigFlags) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config dir {}", parent.display()))?;
    }
    let mut body = String::from("# mdpress defaults (saved with --save)\n");
    for line in flags.to_lines() {
        body.push_str(&line);
        body.push('\n');
    }
    fs::write(path, body).with_context(|| format!("Failed to write config {}", path.display()))
}

pub fn clear_config_flags(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}

/// Extract known flags from a token list, ignoring everything else.
///
/// Valued options accept both `--name value` and `--name=value`.
pub fn parse_flag_tokens(tokens: &[String]) -> ConfigFlags {
    let mut flags = ConfigFlags::default();
    let mut iter = tokens.iter().map(String::as_str).peekable();
    while let Some(token) = iter.next() {
        match token {
            "--watch" | "-w" => flags.watch = true,
            "--perf" => flags.perf = true,
            _ => {
                if let Some((name, value)) = token.split_once('=') {
                    flags.set_value(name, value);
                } else if let Some(&value) = iter.peek()
                    && flags.set_value(token, value)
                {
                    iter.next();
                }
            }
        }
    }
    flags
}
