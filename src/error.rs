//! Error types for the export pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Failures an export attempt can end in.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Nothing rendered to export
    #[error("no rendered document to export")]
    MissingTarget,

    /// The render environment refused the surface
    #[error("render environment error: {0}")]
    Environment(String),

    /// The math collaborator could not be made ready
    #[error("math renderer unavailable: {0}")]
    ResourceLoad(String),

    /// The second math layout pass failed
    #[error("math layout failed: {0}")]
    MathLayout(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("failed to save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    /// Pipeline stage the error belongs to, for notices and logs.
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::MissingTarget => "lookup",
            Self::Environment(_) => "surface",
            Self::ResourceLoad(_) => "math.ready",
            Self::MathLayout(_) => "math.layout",
            Self::Capture(_) => "capture",
            Self::Packaging(_) => "package",
            Self::Save { .. } => "save",
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
