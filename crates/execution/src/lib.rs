//! Execution layer - check selection, dispatch and result merging.

#![warn(missing_docs)]

pub mod selector;
pub mod merge;
pub mod engine;

pub use selector::{select, RunMode};
pub use merge::merge;
pub use engine::{
    CancelHandle, CheckExecutionEngine, EngineConfig, RunInputs, RunOutcome, RunState,
};

use quillgrade_storage::StorageError;

/// Result type for execution operations.
pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Run-level failures. Individual check failures are results, not errors.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Prior results could not be read
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A targeted selector is malformed
    #[error("invalid check selection: {0}")]
    InvalidSelection(String),

    /// Two checklist items resolve to the same id
    #[error("check items {first} and {second} share the id {id}")]
    DuplicateId {
        /// The shared id
        id: String,
        /// Position of the earlier item
        first: usize,
        /// Position of the later item
        second: usize,
    },
}
