//! Transcript checks: `tool_called_with_params` and `tool_call_absence`.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType};
use serde_json::{Map, Value};
use tracing::debug;

use super::by_rule;
use crate::engine::{CheckContext, Checker, Result};
use crate::field::{plain, values_equal};
use crate::params::{CountParam, Params};

/// How expected parameters are compared with actual arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    Exact,
    Contains,
}

impl MatchMode {
    fn matches(self, expected: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
        expected
            .iter()
            .filter(|(_, want)| !want.is_null())
            .all(|(key, want)| match self {
                Self::Exact => actual.get(key).is_some_and(|got| values_equal(got, want)),
                Self::Contains => {
                    let got = actual.get(key).map(plain).unwrap_or_default();
                    got.to_lowercase().contains(&plain(want).to_lowercase())
                }
            })
    }
}

/// Requires enough calls of a tool with matching arguments.
#[derive(Debug, Default)]
pub struct ToolCalledChecker;

#[async_trait]
impl Checker for ToolCalledChecker {
    fn check_type(&self) -> CheckType {
        CheckType::ToolCalledWithParams
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let params = Params::of(item);
        let tool = params.require_str("tool_name")?;
        let empty = Map::new();
        let expected = params
            .get("expected_params")
            .and_then(Value::as_object)
            .unwrap_or(&empty);
        let min_count = match params.count("min_count")? {
            Some(CountParam::Fixed(n)) => n,
            _ => 1,
        };
        let mode = match params.str("param_match_mode") {
            Some("contains") => MatchMode::Contains,
            _ => MatchMode::Exact,
        };

        if params.flag("skip_if_file_not_exists") {
            if let Some(path) = expected.get("path").and_then(Value::as_str).filter(|p| !p.is_empty()) {
                if ctx.workspace.resolve(path).is_none() {
                    return Ok(CheckResult::skip(
                        "guard file absent",
                        format!("{path} does not exist in this environment"),
                    ));
                }
            }
        }

        let mut seen = 0;
        let mut matched = 0;
        for call in ctx.transcript.assistant_calls().filter(|c| c.name == tool) {
            let Some(arguments) = call.arguments_map() else {
                debug!("Ignoring {} call with undecodable arguments", tool);
                continue;
            };
            seen += 1;
            if mode.matches(expected, &arguments) {
                matched += 1;
            }
        }
        debug!("Tool {}: {} calls, {} matching", tool, seen, matched);

        let ok = matched >= min_count;
        Ok(by_rule(CheckResult::from_bool(
            ok,
            if ok {
                "tool called with expected parameters"
            } else {
                "tool not called or parameters differ"
            },
            format!("'{tool}' called {seen} times, {matched} matching, need >= {min_count}"),
        )))
    }
}

/// Requires that no forbidden tool was called.
#[derive(Debug, Default)]
pub struct ToolCallAbsenceChecker;

#[async_trait]
impl Checker for ToolCallAbsenceChecker {
    fn check_type(&self) -> CheckType {
        CheckType::ToolCallAbsence
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let forbidden = Params::of(item).strings("forbidden_tools");
        let called: Vec<&str> = ctx
            .transcript
            .assistant_calls()
            .map(|c| c.name.as_str())
            .filter(|name| forbidden.iter().any(|f| f == name))
            .collect();

        Ok(by_rule(if called.is_empty() {
            CheckResult::pass(
                "no forbidden tool called",
                format!("forbidden: {}", forbidden.join(", ")),
            )
        } else {
            CheckResult::fail(
                "forbidden tool called",
                format!("called: {}", called.join(", ")),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::fixtures::write;
    use quillgrade_core::{Transcript, Verdict};
    use quillgrade_storage::WorkspaceAccessor;
    use serde_json::json;
    use tempfile::TempDir;

    fn transcript() -> Transcript {
        serde_json::from_value(json!({"conversation_history": [
            {"role": "user", "content": "write", "tool_calls": [{"function": {"name": "write_file", "arguments": {"path": "ignored"}}}]},
            {"role": "assistant", "content": null, "tool_calls": [
                {"function": {"name": "write_file", "arguments": "{\"path\": \"workspace/Outline.json\", \"mode\": \"w\"}"}},
                {"function": {"name": "write_file", "arguments": {"path": "workspace/chapters/1.md"}}},
                {"function": {"name": "write_file", "arguments": "{not json"}},
                {"function": {"name": "delete_file", "arguments": {"path": "x"}}}
            ]}
        ]}))
        .unwrap()
    }

    async fn run(checker: &dyn Checker, dir: &TempDir, check_type: CheckType, params: Value) -> CheckResult {
        let transcript = transcript();
        let workspace = WorkspaceAccessor::new(dir.path());
        let ctx = CheckContext::new(&transcript, &workspace);
        checker.evaluate(&CheckItem::new(check_type, params), &ctx).await
    }

    #[tokio::test]
    async fn test_exact_match_with_wildcard() {
        let dir = TempDir::new().unwrap();
        let result = run(&ToolCalledChecker, &dir, CheckType::ToolCalledWithParams,
            json!({"tool_name": "write_file", "expected_params": {"path": "workspace/Outline.json", "mode": null}})).await;
        assert_eq!(result.check_result, Verdict::Pass);

        let result = run(&ToolCalledChecker, &dir, CheckType::ToolCalledWithParams,
            json!({"tool_name": "write_file", "expected_params": {}, "min_count": 3})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("called 2 times"));
    }

    #[tokio::test]
    async fn test_contains_mode_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let result = run(&ToolCalledChecker, &dir, CheckType::ToolCalledWithParams,
            json!({"tool_name": "write_file", "param_match_mode": "contains", "expected_params": {"path": "outline"}})).await;
        assert_eq!(result.check_result, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_guard_file_skips() {
        let dir = TempDir::new().unwrap();
        let params = json!({"tool_name": "read_file", "skip_if_file_not_exists": true,
            "expected_params": {"path": "workspace/notes.md"}});
        let result = run(&ToolCalledChecker, &dir, CheckType::ToolCalledWithParams, params.clone()).await;
        assert_eq!(result.check_result, Verdict::Skip);

        write(dir.path(), "workspace/notes.md", "x");
        let result = run(&ToolCalledChecker, &dir, CheckType::ToolCalledWithParams, params).await;
        assert_eq!(result.check_result, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_absence() {
        let dir = TempDir::new().unwrap();
        let result = run(&ToolCallAbsenceChecker, &dir, CheckType::ToolCallAbsence,
            json!({"forbidden_tools": ["delete_file", "shell"]})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("delete_file"));

        let result = run(&ToolCallAbsenceChecker, &dir, CheckType::ToolCallAbsence,
            json!({"forbidden_tools": ["shell"]})).await;
        assert_eq!(result.check_result, Verdict::Pass);
    }
}
