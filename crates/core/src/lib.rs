//! quillgrade core data models.
//!
//! This crate defines the checklist, transcript, per-check record and
//! report structures shared by every layer of the grader.

#![warn(missing_docs)]

// Identities
mod id;

// Inputs
mod quality;
mod event;

// Outputs
mod record;
mod report;

// Re-exports
pub use id::{CheckId, CheckIdentity};

// Checklist & transcript
pub use quality::{CheckItem, CheckType, Checklist, Dimension, QualityTier};
pub use event::{FunctionCall, ToolCall, Transcript, TranscriptEvent};

// Results & reports
pub use record::{
    CheckRecord, CheckResult, CompletionStatus, EvaluationMethod, ExecutionResult, Flaw, Verdict,
};
pub use report::{
    CompletenessItem, ContentQualityAggregate, DimensionAggregate, DimensionScores,
    OutputCompleteness, OverallResult, OverallStatus, QualityLevel, Report, ScoreBreakdown,
    ScoreWeights,
};
