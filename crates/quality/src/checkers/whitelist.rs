//! `file_whitelist_check`: no stray top-level entries in the workspace.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType};
use quillgrade_storage::WorkspaceAccessor;
use std::path::{Path, PathBuf};

use super::by_rule;
use crate::engine::{CheckContext, Checker, Result};
use crate::params::Params;

const DEFAULT_TARGET: &str = "workspace/";
const IGNORED: &[&str] = &["__pycache__"];

/// Flags entries not named in `required_files`.
#[derive(Debug, Default)]
pub struct WhitelistChecker;

/// Locate the directory a whitelist applies to.
pub(crate) fn locate_dir(workspace: &WorkspaceAccessor, target: &str) -> Option<PathBuf> {
    let target = target.trim_end_matches('/');
    workspace
        .resolve(target)
        .or_else(|| workspace.resolve(&format!("workspace/{target}")))
        .filter(|p| p.is_dir())
}

/// Top-level entries of `dir` outside the whitelist.
///
/// Entries ending in `/` whitelist a directory of that name only.
pub(crate) fn extra_entries(
    workspace: &WorkspaceAccessor,
    dir: &Path,
    whitelist: &[String],
) -> Result<Vec<String>> {
    let allowed = |name: &str, is_dir: bool| {
        whitelist.iter().any(|w| match w.strip_suffix('/') {
            Some(dir_name) => is_dir && dir_name == name,
            None => w == name,
        })
    };
    Ok(workspace
        .list_dir(dir)?
        .into_iter()
        .filter(|e| !IGNORED.contains(&e.name.as_str()) && !allowed(&e.name, e.is_dir))
        .map(|e| if e.is_dir { format!("{}/", e.name) } else { e.name })
        .collect())
}

#[async_trait]
impl Checker for WhitelistChecker {
    fn check_type(&self) -> CheckType {
        CheckType::FileWhitelistCheck
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let params = Params::of(item);
        let target = params.str("analysis_target").unwrap_or(DEFAULT_TARGET);
        let whitelist = params.strings("required_files");

        let Some(dir) = locate_dir(ctx.workspace, target) else {
            return Ok(CheckResult::skip(
                format!("target directory missing: {target}"),
                ctx.workspace.path(target).display().to_string(),
            ));
        };

        let extra = extra_entries(ctx.workspace, &dir, &whitelist)?;
        Ok(by_rule(if extra.is_empty() {
            CheckResult::pass(
                "every entry is whitelisted",
                format!("whitelist: {}", whitelist.join(", ")),
            )
        } else {
            CheckResult::fail(
                format!("entries outside the whitelist: {}", extra.join(", ")),
                format!("whitelist: {}; extra: {}", whitelist.join(", "), extra.join(", ")),
            )
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::fixtures::write;
    use quillgrade_core::{Transcript, Verdict};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn run(dir: &TempDir, params: Value) -> CheckResult {
        let transcript = Transcript::default();
        let workspace = WorkspaceAccessor::new(dir.path());
        let ctx = CheckContext::new(&transcript, &workspace);
        WhitelistChecker
            .evaluate(&CheckItem::new(CheckType::FileWhitelistCheck, params), &ctx)
            .await
    }

    #[tokio::test]
    async fn test_extra_entries_fail() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/outline.json", "{}");
        write(dir.path(), "workspace/chapters/1.md", "x");
        write(dir.path(), "workspace/__pycache__/x.pyc", "x");
        write(dir.path(), "workspace/notes.txt", "x");

        let result = run(&dir, json!({"required_files": ["outline.json", "chapters/"]})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("notes.txt"));
        assert!(!result.details.contains("__pycache__"));

        let result = run(&dir, json!({"required_files": ["outline.json", "chapters/", "notes.txt"]})).await;
        assert_eq!(result.check_result, Verdict::Pass);
    }

    #[tokio::test]
    async fn test_directory_entry_only_whitelists_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/chapters", "a file, not a directory");
        let result = run(&dir, json!({"required_files": ["chapters/"]})).await;
        assert_eq!(result.check_result, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_missing_target_skips() {
        let dir = TempDir::new().unwrap();
        let result = run(&dir, json!({"analysis_target": "drafts/", "required_files": []})).await;
        assert_eq!(result.check_result, Verdict::Skip);
    }
}
