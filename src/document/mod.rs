//! Markdown documents as visual trees.
//!
//! This module handles:
//! - Parsing markdown and `$`-delimited math with comrak
//! - The visual tree: semantic node kinds plus presentation attributes
//! - The live document view that an export starts from

mod parser;
mod types;

use std::path::{Path, PathBuf};

use anyhow::Result;

pub use parser::parse;
pub use types::{
    FontRole, FontWeight, MathId, MathSource, Node, NodeKind, Presentation, Spacing, VisualTree,
};

use crate::style::Theme;

/// The interactively displayed document: source text plus its themed tree.
///
/// Exports only ever borrow the tree, so the live view is never mutated by
/// an export attempt.
#[derive(Debug, Clone)]
pub struct DocumentView {
    source: String,
    theme: Theme,
    tree: Option<VisualTree>,
    base_dir: PathBuf,
}

impl DocumentView {
    /// Parse `source` and style it with `theme`.
    pub fn render(source: impl Into<String>, theme: Theme) -> Result<Self> {
        let source = source.into();
        let mut tree = parse(&source)?;
        theme.apply(&mut tree);
        Ok(Self {
            source,
            theme,
            tree: Some(tree),
            base_dir: PathBuf::from("."),
        })
    }

    /// A view whose content has not been rendered yet.
    pub fn unrendered(source: impl Into<String>, theme: Theme) -> Self {
        Self {
            source: source.into(),
            theme,
            tree: None,
            base_dir: PathBuf::from("."),
        }
    }

    /// Directory that relative image paths resolve against.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Re-render after the source changed.
    pub fn update_source(&mut self, source: impl Into<String>) -> Result<()> {
        let source = source.into();
        let mut tree = parse(&source)?;
        self.theme.apply(&mut tree);
        self.source = source;
        self.tree = Some(tree);
        Ok(())
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub const fn theme(&self) -> &Theme {
        &self.theme
    }

    /// The rendered tree, if the view has been rendered.
    pub const fn tree(&self) -> Option<&VisualTree> {
        self.tree.as_ref()
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Directory containing `file_path`, or `.` for bare file names.
pub fn base_dir_for(file_path: &Path) -> PathBuf {
    file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
