//! `cross_file_consistency`: agreement between groups of files.
//!
//! Three sub-modes, chosen by `match_type`:
//!
//! - `count`: `dir1` and `dir2` hold the same number of `*.json` files.
//! - `field_value`: the n-th file of `file1_pattern` agrees with the n-th
//!   file of `file2_pattern` on a field (files paired by embedded number).
//! - anything else: every value of `source_field` in `source_files` occurs
//!   among the `reference_field` values of `reference_files`.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType, EvaluationMethod};
use quillgrade_storage::{file_name, JsonDocument, WorkspaceAccessor};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::warn;

use super::by_rule;
use crate::engine::{CheckContext, CheckError, Checker, Result};
use crate::field::{nested, plain, truthy, values_equal, FieldPath};
use crate::params::Params;

/// Checks consistency across files.
#[derive(Debug, Default)]
pub struct CrossFileChecker;

#[async_trait]
impl Checker for CrossFileChecker {
    fn check_type(&self) -> CheckType {
        CheckType::CrossFileConsistency
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let params = Params::of(item);
        let result = match params.str("match_type") {
            Some("count") => count_mode(&params, ctx.workspace)?,
            Some("field_value") => field_value_mode(&params, ctx.workspace)?,
            _ => reference_mode(&params, ctx.workspace)?,
        };
        Ok(by_rule(result))
    }
}

fn require_all<'a>(params: &Params<'a>, keys: &[&str]) -> Result<Vec<&'a str>> {
    let values: Vec<&str> = keys.iter().filter_map(|key| params.str(key)).collect();
    if values.len() == keys.len() {
        Ok(values)
    } else {
        Err(CheckError::InvalidParams(format!("{} are required", keys.join(", "))))
    }
}

fn count_mode(params: &Params<'_>, workspace: &WorkspaceAccessor) -> Result<CheckResult> {
    let dirs = require_all(params, &["dir1", "dir2"])?;
    let count = |dir: &str| -> Result<usize> {
        Ok(workspace
            .glob_files(&format!("{}/*.json", dir.trim_end_matches('/')))?
            .len())
    };
    let (first, second) = (count(dirs[0])?, count(dirs[1])?);
    Ok(CheckResult::from_bool(
        first == second,
        if first == second {
            "file counts agree"
        } else {
            "file counts differ"
        },
        format!("{}: {first} files, {}: {second} files", dirs[0], dirs[1]),
    ))
}

fn field_value_mode(params: &Params<'_>, workspace: &WorkspaceAccessor) -> Result<CheckResult> {
    let keys = require_all(
        params,
        &["file1_pattern", "file1_field", "file2_pattern", "file2_field"],
    )?;
    let (field1, field2) = (keys[1], keys[3]);
    let count_op = params.str("operation") == Some("count");

    let files1 = workspace.glob_files(&keys[0].replace("{N}", "*"))?;
    let files2 = workspace.glob_files(&keys[2].replace("{N}", "*"))?;
    if files1.len() != files2.len() {
        return Ok(CheckResult::fail(
            "paired file counts differ",
            format!("{} matched {}, {} matched {}", keys[0], files1.len(), keys[2], files2.len()),
        ));
    }

    let mut all_ok = true;
    let mut parse_error = false;
    let mut lines = Vec::with_capacity(files1.len());
    for (path1, path2) in files1.iter().zip(&files2) {
        let name = file_name(path1);
        let (doc1, doc2) = (workspace.read_json(path1)?, workspace.read_json(path2)?);
        let (data1, data2) = match (doc1.value(), doc2.value()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                all_ok = false;
                parse_error = true;
                let bad = if doc1.value().is_none() { name.clone() } else { file_name(path2) };
                lines.push(format!("{bad}: invalid JSON"));
                continue;
            }
        };

        let value1 = nested(data1, field1).cloned().unwrap_or(Value::Null);
        let mut value2 = nested(data2, field2).cloned().unwrap_or(Value::Null);
        if count_op {
            if let Value::Array(items) = &value2 {
                value2 = Value::from(items.len());
            }
        }

        let agree = values_equal(&value1, &value2);
        all_ok &= agree;
        let relation = if agree { "==" } else { "!=" };
        lines.push(if count_op {
            format!("{name}: {field1}={} {relation} len({field2})={}", plain(&value1), plain(&value2))
        } else {
            format!("{name}: {field1}={} {relation} {field2}={}", plain(&value1), plain(&value2))
        });
    }

    let details = lines.join("; ");
    Ok(if all_ok {
        CheckResult::pass("paired fields agree", details)
    } else if parse_error {
        CheckResult::dependency_failure("paired file could not be parsed", details)
    } else {
        CheckResult::fail("paired fields disagree", details)
    })
}

/// Scalar values at `path`, flattening arrays.
fn collect_values(data: &Value, path: &str) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut push = |value: &Value| match value {
        Value::Array(items) => out.extend(items.iter().filter(|v| truthy(v)).map(plain)),
        other if truthy(other) => out.push(plain(other)),
        _ => {}
    };

    match FieldPath::parse(path) {
        FieldPath::Plain(path) => push(nested(data, path)?),
        FieldPath::Wildcard { array, item } => {
            let elements = nested(data, array)?;
            for element in elements.as_array().into_iter().flatten() {
                match item {
                    Some(field) => {
                        if let Some(value) = element.as_object().and_then(|o| o.get(field)) {
                            push(value);
                        }
                    }
                    None => push(element),
                }
            }
        }
    }
    Some(out)
}

/// Known values that occur quoted in raw text.
fn quoted_occurrences(raw: &str, known: &BTreeSet<String>) -> BTreeSet<String> {
    known
        .iter()
        .filter(|v| raw.contains(&format!("\"{v}\"")) || raw.contains(&format!("'{v}'")))
        .cloned()
        .collect()
}

fn reference_mode(params: &Params<'_>, workspace: &WorkspaceAccessor) -> Result<CheckResult> {
    let keys = require_all(
        params,
        &["source_files", "source_field", "reference_files", "reference_field"],
    )?;
    let (source_files, source_field, reference_files, reference_field) = (keys[0], keys[1], keys[2], keys[3]);

    let refs = workspace.glob_files(reference_files)?;
    if refs.is_empty() {
        return Ok(CheckResult::fail(
            "no reference files",
            format!("pattern '{reference_files}' matched nothing"),
        ));
    }

    let mut valid = BTreeSet::new();
    let mut invalid_refs: Vec<(PathBuf, String)> = Vec::new();
    for path in &refs {
        match workspace.read_json(path)? {
            JsonDocument::Parsed(data) => match collect_values(&data, reference_field) {
                Some(values) => valid.extend(values),
                None => invalid_refs.push((path.clone(), format!("missing {reference_field}"))),
            },
            JsonDocument::Malformed { .. } => invalid_refs.push((path.clone(), "invalid JSON".into())),
        }
    }

    if !valid.is_empty() {
        for (path, note) in invalid_refs.iter_mut() {
            let found = quoted_occurrences(&workspace.read_text(path)?, &valid);
            if !found.is_empty() {
                *note = format!("{note}, {} values found as text", found.len());
            }
        }
    }
    let ref_notes: Vec<String> = invalid_refs
        .iter()
        .map(|(path, note)| format!("{} ({note})", file_name(path)))
        .collect();

    if valid.is_empty() {
        return Ok(CheckResult::dependency_failure(
            "no reference values could be extracted",
            if ref_notes.is_empty() {
                format!("{reference_files} carry no {reference_field} values")
            } else {
                format!("unusable reference files: {}", ref_notes.join(", "))
            },
        ));
    }

    let sources = workspace.glob_files(source_files)?;
    if sources.is_empty() {
        return Ok(CheckResult::fail(
            "no source files",
            format!("pattern '{source_files}' matched nothing"),
        ));
    }

    let mut all_ok = true;
    let mut text_mode = false;
    let mut lines = Vec::with_capacity(sources.len());
    let mut skipped_sources = Vec::new();
    for path in &sources {
        let name = file_name(path);
        match workspace.read_json(path)? {
            JsonDocument::Parsed(data) => {
                let values = collect_values(&data, source_field).unwrap_or_default();
                let unknown: Vec<&String> = values.iter().filter(|v| !valid.contains(*v)).collect();
                if unknown.is_empty() {
                    lines.push(format!("{name}: consistent"));
                } else {
                    all_ok = false;
                    lines.push(format!(
                        "{name}: references unknown values {}",
                        unknown.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ));
                }
            }
            JsonDocument::Malformed { raw, .. } => {
                let found = quoted_occurrences(&raw, &valid);
                if found.is_empty() {
                    all_ok = false;
                    skipped_sources.push(format!("{name} (invalid JSON, nothing found)"));
                    lines.push(format!("{name}: invalid JSON, no known values found"));
                } else {
                    text_mode = true;
                    warn!("{} is not valid JSON, checked references by text search", name);
                    skipped_sources.push(format!("{name} (invalid JSON, text search)"));
                    lines.push(format!("{name}: consistent (text search, {} values)", found.len()));
                }
            }
        }
    }

    let mut details = lines.join("; ");
    if !ref_notes.is_empty() {
        details.push_str(&format!(" [skipped {} reference files: {}]", ref_notes.len(), ref_notes.join(", ")));
    }
    if !skipped_sources.is_empty() {
        details.push_str(&format!(
            " [skipped {} source files: {}]",
            skipped_sources.len(),
            skipped_sources.join(", ")
        ));
    }

    let result = CheckResult::from_bool(
        all_ok,
        if all_ok {
            "every reference resolves"
        } else {
            "unresolved references"
        },
        details,
    );
    Ok(if text_mode {
        result.with_method(EvaluationMethod::TextSearchFallback)
    } else {
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::fixtures::write;
    use quillgrade_core::{Transcript, Verdict};
    use serde_json::json;
    use tempfile::TempDir;

    async fn run(dir: &TempDir, params: Value) -> CheckResult {
        let transcript = Transcript::default();
        let workspace = WorkspaceAccessor::new(dir.path());
        let ctx = CheckContext::new(&transcript, &workspace);
        let item = CheckItem::new(CheckType::CrossFileConsistency, params);
        CrossFileChecker.evaluate(&item, &ctx).await
    }

    #[tokio::test]
    async fn test_count_mode() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/outlines/1.json", "{}");
        write(dir.path(), "workspace/scripts/1.json", "{}");
        write(dir.path(), "workspace/scripts/2.json", "{}");

        let result = run(&dir, json!({"match_type": "count", "dir1": "workspace/outlines", "dir2": "workspace/scripts/"})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("1 files"));
    }

    #[tokio::test]
    async fn test_field_value_pairs_by_number() {
        let dir = TempDir::new().unwrap();
        for n in [2, 10] {
            write(dir.path(), &format!("workspace/outlines/episode_{n}.json"), &format!(r#"{{"scene_count": {n}}}"#));
            let scenes: Vec<u32> = (0..n).collect();
            write(dir.path(), &format!("workspace/scripts/episode_{n}.json"), &json!({"scenes": scenes}).to_string());
        }

        let result = run(&dir, json!({"match_type": "field_value", "operation": "count",
            "file1_pattern": "workspace/outlines/episode_{N}.json", "file1_field": "scene_count",
            "file2_pattern": "workspace/scripts/episode_{N}.json", "file2_field": "scenes"})).await;
        assert_eq!(result.check_result, Verdict::Pass, "{}", result.details);
    }

    #[tokio::test]
    async fn test_field_value_parse_error_is_dependency_failure() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/a/ep_1.json", r#"{"title": "x"}"#);
        write(dir.path(), "workspace/b/ep_1.json", "{broken");

        let result = run(&dir, json!({"match_type": "field_value",
            "file1_pattern": "workspace/a/ep_{N}.json", "file1_field": "title",
            "file2_pattern": "workspace/b/ep_{N}.json", "file2_field": "title"})).await;
        assert_eq!(result.check_result, Verdict::Skip);
        assert!(result.dependency_failure);
    }

    #[tokio::test]
    async fn test_reference_integrity() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/characters/a.json", r#"{"character_name": "林远"}"#);
        write(dir.path(), "workspace/characters/b.json", r#"{"character_name": "苏晴"}"#);
        write(
            dir.path(),
            "workspace/outlines/1.json",
            r#"{"scenes_detail": [{"characters": ["林远"]}, {"characters": ["苏晴", "路人"]}]}"#,
        );

        let params = json!({"source_files": "workspace/outlines/*.json", "source_field": "scenes_detail[*].characters",
            "reference_files": "workspace/characters/*.json", "reference_field": "character_name"});
        let result = run(&dir, params).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("路人"));
    }

    #[tokio::test]
    async fn test_reference_text_search_fallback() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/characters/a.json", r#"{"character_name": "林远"}"#);
        write(dir.path(), "workspace/characters/b.json", r#"{"character_name": "苏晴",}"#);
        write(dir.path(), "workspace/outlines/1.json", r#"{"characters": ["林远", "苏晴"],}"#);

        let params = json!({"source_files": "workspace/outlines/*.json", "source_field": "characters",
            "reference_files": "workspace/characters/*.json", "reference_field": "character_name"});
        let result = run(&dir, params).await;
        assert_eq!(result.check_result, Verdict::Pass);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::TextSearchFallback));
        assert!(result.details.contains("b.json (invalid JSON"));
    }

    #[tokio::test]
    async fn test_reference_without_values_is_dependency_failure() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/characters/a.json", "{oops");
        write(dir.path(), "workspace/outlines/1.json", r#"{"characters": ["x"]}"#);

        let params = json!({"source_files": "workspace/outlines/*.json", "source_field": "characters",
            "reference_files": "workspace/characters/*.json", "reference_field": "character_name"});
        let result = run(&dir, params).await;
        assert_eq!(result.check_result, Verdict::Skip);
        assert!(result.dependency_failure);
    }
}
