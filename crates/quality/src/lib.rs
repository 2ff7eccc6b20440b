//! Check evaluation for quillgrade.
//!
//! Every checklist item is routed by its check type to a [`Checker`].
//! Checkers read the transcript and the workspace, may consult the
//! judge, and always produce a [`CheckResult`](quillgrade_core::CheckResult):
//! internal failures become `fail` results instead of errors.

#![warn(missing_docs)]

pub mod engine;
pub mod params;
pub mod field;
pub mod constraint;
pub mod criteria;
pub mod heuristics;
pub mod checkers;
pub mod registry;

pub use engine::{CheckContext, CheckError, Checker, Result};
pub use params::{CountParam, Params};
pub use constraint::Constraint;
pub use criteria::{extract_section, load_criteria};
pub use heuristics::{
    planned_chapter_count, Chapter, ContentHeuristics, HeuristicMethod, HeuristicThresholds,
};
pub use checkers::{
    AttributeChecker, CreateCountChecker, CrossFileChecker, JsonSchemaChecker, SemanticChecker,
    ToolCallAbsenceChecker, ToolCalledChecker, WhitelistChecker,
};
pub use registry::CheckerRegistry;
