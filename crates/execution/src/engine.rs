//! The check execution engine - plans, dispatches and merges a grading run.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use quillgrade_core::{
    CheckId, CheckItem, CheckRecord, Checklist, CompletionStatus, ExecutionResult, Transcript,
};
use quillgrade_judge::Judge;
use quillgrade_quality::{CheckContext, CheckerRegistry};
use quillgrade_storage::{ResultStore, WorkspaceAccessor};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::merge::merge;
use crate::selector::{select, RunMode};
use crate::Result;

/// Configuration for the execution engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Checks evaluated at once (1 = strictly sequential)
    pub max_parallel_checks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_checks: 1,
        }
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started
    Pending,
    /// Checks are being evaluated
    Running,
    /// Every planned check ran
    Completed,
    /// Cancelled; finished checks were kept
    PartiallyCompleted,
}

/// Requests cancellation of a running engine between checks.
///
/// A request made before a run starts applies to that run. The flag clears
/// once the run finishes, so the engine can run again.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Stop before the next check starts.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// What the agent left behind for one sample.
#[derive(Clone, Copy)]
pub struct RunInputs<'a> {
    /// Checklist to grade against
    pub checklist: &'a Checklist,
    /// Agent transcript
    pub transcript: &'a Transcript,
    /// Agent work directory
    pub workspace: &'a WorkspaceAccessor,
}

/// Output of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Merged raw results
    pub result: ExecutionResult,
    /// Checks evaluated in this run, in checklist order
    pub executed: Vec<CheckId>,
}

impl RunOutcome {
    /// Nothing was evaluated; the result is the prior set unchanged.
    pub fn is_rescore_only(&self) -> bool {
        self.executed.is_empty()
    }
}

/// The check execution engine.
///
/// A run moves through:
/// ```text
/// Pending → Running → Completed | PartiallyCompleted
/// ```
pub struct CheckExecutionEngine<S: ResultStore> {
    storage: S,
    registry: Arc<CheckerRegistry>,
    judge: Option<Arc<Judge>>,
    config: EngineConfig,
    cancel: CancelHandle,
    state: RunState,
}

impl<S: ResultStore> CheckExecutionEngine<S> {
    /// Create an engine with the built-in checkers and no judge.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            registry: Arc::new(CheckerRegistry::with_defaults()),
            judge: None,
            config: EngineConfig::default(),
            cancel: CancelHandle::default(),
            state: RunState::Pending,
        }
    }

    /// Use a custom checker registry.
    pub fn with_registry(mut self, registry: Arc<CheckerRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Attach the judge.
    pub fn with_judge(mut self, judge: Option<Arc<Judge>>) -> Self {
        self.judge = judge;
        self
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle for cancelling the current or next run.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Get a reference to the storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Run the checks selected by `mode` and merge them with the prior result.
    ///
    /// Per-check failures never abort the run. Storage errors (an unreadable
    /// prior result) do.
    pub async fn run(&mut self, inputs: RunInputs<'_>, mode: &RunMode) -> Result<RunOutcome> {
        let prior = if mode.uses_prior() {
            self.storage.load_prior().await?
        } else {
            None
        };
        let planned = select(inputs.checklist, mode, prior.as_ref())?;
        info!(
            "Grading {}: {:?} run, {} of {} checks planned",
            inputs.checklist.sample_id,
            mode,
            planned.len(),
            inputs.checklist.len()
        );

        if planned.is_empty() {
            self.state = RunState::Completed;
            let result = prior.unwrap_or_else(|| ExecutionResult {
                sample_id: inputs.checklist.sample_id.clone(),
                ..ExecutionResult::default()
            });
            info!("No checks to run, re-scoring {} existing results", result.check_details.len());
            return Ok(RunOutcome {
                result,
                executed: Vec::new(),
            });
        }

        self.state = RunState::Running;
        let (fresh, ran, cancelled) = self.evaluate_all(&inputs, &planned).await;
        self.cancel.clear();
        self.state = if cancelled {
            warn!("Run cancelled after {} of {} checks", ran.len(), planned.len());
            RunState::PartiallyCompleted
        } else {
            RunState::Completed
        };

        let executed: Vec<CheckId> = ran.iter().map(|item| item.id().clone()).collect();
        let prior_details = prior.map(|p| p.check_details).unwrap_or_default();
        let check_details = merge(prior_details, fresh, &ran, mode.overwrites());

        Ok(RunOutcome {
            result: ExecutionResult {
                sample_id: inputs.checklist.sample_id.clone(),
                check_timestamp: Utc::now().timestamp(),
                check_details,
                completion_status: if cancelled {
                    CompletionStatus::PartiallyCompleted
                } else {
                    CompletionStatus::Completed
                },
            },
            executed,
        })
    }

    /// Evaluate the planned items, at most `max_parallel_checks` at a time.
    ///
    /// Returns the fresh records, the items that finished (checklist order)
    /// and whether the run was cancelled.
    async fn evaluate_all<'a>(
        &self,
        inputs: &RunInputs<'_>,
        planned: &[&'a CheckItem],
    ) -> (BTreeMap<CheckId, CheckRecord>, Vec<&'a CheckItem>, bool) {
        let ctx = CheckContext::new(inputs.transcript, inputs.workspace)
            .with_judge(self.judge.as_deref());
        let registry = &self.registry;
        let cancel = &self.cancel;
        let total = planned.len();

        let finished: Vec<Option<(usize, CheckRecord)>> = stream::iter(planned.iter().enumerate())
            .map(|(idx, item)| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                debug!("[{}/{}] {} ({})", idx + 1, total, item.id(), item.check_type);
                let result = registry.evaluate(item, &ctx).await;
                debug!("[{}/{}] {} -> {:?}: {}", idx + 1, total, item.id(), result.check_result, result.reason);
                Some((idx, CheckRecord::new(item, result)))
            })
            .buffer_unordered(self.config.max_parallel_checks.max(1))
            .collect()
            .await;

        let cancelled = finished.iter().any(Option::is_none);
        let mut done: Vec<(usize, CheckRecord)> = finished.into_iter().flatten().collect();
        done.sort_by_key(|(idx, _)| *idx);

        let ran = done.iter().map(|(idx, _)| planned[*idx]).collect();
        let fresh = done
            .into_iter()
            .map(|(idx, record)| (planned[idx].id().clone(), record))
            .collect();
        (fresh, ran, cancelled)
    }
}
