//! `create_operation_verified`: how many files the agent created.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType};
use serde_json::Value;

use super::by_rule;
use crate::engine::{CheckContext, CheckError, Checker, Result};
use crate::params::{CountParam, Params};

/// Counts files matching `filter_conditions.path_pattern`.
#[derive(Debug, Default)]
pub struct CreateCountChecker;

#[async_trait]
impl Checker for CreateCountChecker {
    fn check_type(&self) -> CheckType {
        CheckType::CreateOperationVerified
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let params = Params::of(item);
        let entity_type = params.str("entity_type").unwrap_or("file");
        if entity_type != "file" {
            return Ok(CheckResult::skip(
                format!("unsupported entity type `{entity_type}`"),
                "only `file` entities can be counted",
            ));
        }

        let pattern = params
            .get("filter_conditions")
            .and_then(|f| f.get("path_pattern"))
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| CheckError::InvalidParams("`filter_conditions.path_pattern` is required".into()))?;

        let actual = ctx.workspace.glob(pattern)?.len();

        let result = if let Some(expected) = params.count("expected_count")? {
            match expected {
                CountParam::Unresolved(raw) => CheckResult::skip(
                    "expected_count not resolved",
                    format!("expected_count is {raw}; the sample generator must fill it in"),
                ),
                CountParam::Fixed(n) => CheckResult::from_bool(
                    actual == n,
                    if actual == n { "file count matches" } else { "file count differs" },
                    format!("{actual} files match '{pattern}', expected {n}"),
                ),
            }
        } else if let Some(CountParam::Fixed(min)) = params.count("min_count")? {
            CheckResult::from_bool(
                actual >= min,
                if actual >= min { "enough files" } else { "too few files" },
                format!("{actual} files match '{pattern}', need >= {min}"),
            )
        } else if let Some(CountParam::Fixed(max)) = params.count("max_count")? {
            CheckResult::from_bool(
                actual <= max,
                if actual <= max { "file count within limit" } else { "too many files" },
                format!("{actual} files match '{pattern}', allow <= {max}"),
            )
        } else {
            CheckResult::skip(
                "no count constraint",
                "none of expected_count, min_count, max_count is set",
            )
        };
        Ok(by_rule(result))
    }
}
