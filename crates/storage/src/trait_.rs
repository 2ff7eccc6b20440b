//! Storage trait abstraction.

use async_trait::async_trait;
use quillgrade_core::{ExecutionResult, Report};
use std::path::PathBuf;

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while reading inputs or writing reports.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Serialization/deserialization error
    #[error("JSON error in {path}: {source}")]
    Json {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    Pattern(String),

    /// Input has an unexpected shape
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Persistence of raw results and scored reports.
///
/// The prior result is read once per run; the report is the single write
/// target of a run.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Load the prior result set, if one is configured and present.
    async fn load_prior(&self) -> Result<Option<ExecutionResult>>;

    /// Write the final report.
    async fn save_report(&self, report: &Report) -> Result<()>;
}
