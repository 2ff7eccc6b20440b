//! Checker registry keyed by check type.

use quillgrade_core::{CheckItem, CheckResult, CheckType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::checkers::{
    AttributeChecker, CreateCountChecker, CrossFileChecker, JsonSchemaChecker, SemanticChecker,
    ToolCallAbsenceChecker, ToolCalledChecker, WhitelistChecker,
};
use crate::engine::{CheckContext, Checker};
use crate::heuristics::{ContentHeuristics, HeuristicThresholds};

/// Maps each check type to the checker that evaluates it.
pub struct CheckerRegistry {
    checkers: HashMap<CheckType, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            checkers: HashMap::new(),
        }
    }

    /// Registry with every built-in checker and default heuristic thresholds.
    pub fn with_defaults() -> Self {
        Self::with_heuristic_thresholds(HeuristicThresholds::default())
    }

    /// Registry with every built-in checker, tuning the chapter heuristics.
    pub fn with_heuristic_thresholds(thresholds: HeuristicThresholds) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(AttributeChecker));
        registry.register(Arc::new(CreateCountChecker));
        registry.register(Arc::new(JsonSchemaChecker));
        registry.register(Arc::new(CrossFileChecker));
        registry.register(Arc::new(ToolCalledChecker));
        registry.register(Arc::new(ToolCallAbsenceChecker));
        registry.register(Arc::new(WhitelistChecker));
        registry.register(Arc::new(SemanticChecker::new(ContentHeuristics::new(thresholds))));
        registry
    }

    /// Register a checker, replacing any previous one for its type.
    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        let check_type = checker.check_type();
        if self.checkers.insert(check_type.clone(), checker).is_some() {
            debug!("Replaced checker for {}", check_type);
        }
    }

    /// Checker for a type.
    pub fn get(&self, check_type: &CheckType) -> Option<Arc<dyn Checker>> {
        self.checkers.get(check_type).cloned()
    }

    /// Evaluate one item with the checker registered for its type.
    ///
    /// Unknown types are skipped rather than failed.
    pub async fn evaluate(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> CheckResult {
        match self.checkers.get(&item.check_type) {
            Some(checker) => checker.evaluate(item, ctx).await,
            None => {
                warn!("No checker for {} ({})", item.check_type, item.id());
                CheckResult::skip(
                    format!("unsupported check type: {}", item.check_type),
                    "no checker is registered for this type",
                )
            }
        }
    }
}

impl Default for CheckerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
