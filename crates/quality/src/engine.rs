//! Checker trait and execution context.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType, Transcript};
use quillgrade_judge::{Judge, JudgeError};
use quillgrade_storage::{StorageError, WorkspaceAccessor};
use thiserror::Error;
use tracing::warn;

/// Internal failure of a checker.
///
/// Never leaves a checker: [`Checker::evaluate`] turns it into a `fail`
/// result whose reason names the failing step.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Missing or malformed item parameters
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Workspace access failed
    #[error("workspace access failed: {0}")]
    Storage(#[from] StorageError),

    /// Judge call failed and no fallback applied
    #[error("judge call failed: {0}")]
    Judge(#[from] JudgeError),

    /// A regex in the item did not compile
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

/// Result type for checker internals.
pub type Result<T> = std::result::Result<T, CheckError>;

/// Read-only inputs of one grading run.
#[derive(Clone, Copy)]
pub struct CheckContext<'a> {
    /// What the agent did
    pub transcript: &'a Transcript,

    /// What the agent produced
    pub workspace: &'a WorkspaceAccessor,

    /// External judge, when configured
    pub judge: Option<&'a Judge>,
}

impl<'a> CheckContext<'a> {
    /// Create a context without a judge.
    pub fn new(transcript: &'a Transcript, workspace: &'a WorkspaceAccessor) -> Self {
        Self {
            transcript,
            workspace,
            judge: None,
        }
    }

    /// Attach the judge.
    pub fn with_judge(mut self, judge: Option<&'a Judge>) -> Self {
        self.judge = judge;
        self
    }
}

/// One evaluator per check type.
#[async_trait]
pub trait Checker: Send + Sync {
    /// The check type this checker handles.
    fn check_type(&self) -> CheckType;

    /// Evaluate an item, surfacing internal failures as errors.
    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult>;

    /// Evaluate an item. Never fails: internal errors become `fail`.
    async fn evaluate(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> CheckResult {
        match self.run(item, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!("Check {} ({}) aborted: {}", item.id(), item.check_type, e);
                CheckResult::fail(format!("{} aborted: {}", item.check_type, e), e.to_string())
            }
        }
    }
}
