//! Error types for the REDE pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for pipeline operations.
///
/// Every variant except `Disposition` is fatal for the job that raised it;
/// none of them are fatal for the run. Malformed records are not an error at
/// all, only a per-job counter.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("transfer of {locator} failed after {attempts} attempts: {reason}")]
    Transfer {
        locator: String,
        attempts: u32,
        reason: String,
    },

    #[error("corrupt or truncated archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("filter column '{column}' not found in {entry}")]
    ColumnMissing { column: String, entry: String },

    #[error("publish to key '{key}' failed: {reason}")]
    Publish { key: String, reason: String },

    #[error("disposition of {path} failed: {reason}")]
    Disposition { path: PathBuf, reason: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short stable kind token, used in run summaries and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transfer { .. } => "transfer",
            PipelineError::CorruptArchive { .. } => "corrupt_archive",
            PipelineError::ColumnMissing { .. } => "column_missing",
            PipelineError::Publish { .. } => "publish",
            PipelineError::Disposition { .. } => "disposition",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Config(_) => "config",
            PipelineError::Io(_) => "io",
        }
    }
}
