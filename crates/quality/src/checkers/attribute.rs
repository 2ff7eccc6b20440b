//! `entity_attribute_equals`: a field of one or more workspace files
//! against an expected-value [`Constraint`].

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType, EvaluationMethod};
use quillgrade_judge::{ChatMessage, Judge};
use quillgrade_storage::{file_name, JsonDocument, WorkspaceAccessor};
use regex::Regex;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use super::by_rule;
use crate::constraint::Constraint;
use crate::engine::{CheckContext, CheckError, Checker, Result};
use crate::field::{nested, plain, truthy, values_equal, FieldPath};
use crate::params::{CountParam, Params};

const EXTRACTION_LIMIT: usize = 8000;

/// Checks file attributes.
#[derive(Debug, Default)]
pub struct AttributeChecker;

#[async_trait]
impl Checker for AttributeChecker {
    fn check_type(&self) -> CheckType {
        CheckType::EntityAttributeEquals
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let params = Params::of(item);
        let entity_type = params.str("entity_type").unwrap_or("file");
        if entity_type != "file" {
            return Ok(CheckResult::skip(
                format!("unsupported entity type `{entity_type}`"),
                "only `file` entities can be checked",
            ));
        }

        let target = params.require_str("target_id")?;
        let key = params.require_str("attribute_key")?;
        let expected = params.get("expected_value").unwrap_or(&Value::Null);

        let result = if target.contains(" + ") {
            cross_target(target, key, ctx.workspace)?
        } else if target.contains('*') {
            glob_target(target, key, expected, ctx.workspace)?
        } else {
            single_target(target, key, expected, ctx).await?
        };
        Ok(by_rule(result))
    }
}

/// Outcome of comparing one document.
struct Comparison {
    ok: bool,
    message: String,
}

fn compare(data: &Value, key: &str, constraint: &Constraint) -> Comparison {
    match FieldPath::parse(key) {
        FieldPath::Plain(path) => {
            let actual = nested(data, path);
            let shown = actual.map_or_else(|| "none".to_string(), plain);
            if constraint.matches(actual) {
                Comparison {
                    ok: true,
                    message: format!("{path} = {shown}, as expected"),
                }
            } else {
                Comparison {
                    ok: false,
                    message: format!("{path} = {shown}, expected {constraint}"),
                }
            }
        }
        FieldPath::Wildcard { array, item } => {
            let Some(Value::Array(elements)) = nested(data, array) else {
                return Comparison {
                    ok: false,
                    message: format!("{array} is not an array"),
                };
            };
            let Some(field) = item else {
                let ok = constraint.matches(Some(&Value::Array(elements.clone())));
                return Comparison {
                    ok,
                    message: if ok {
                        format!("{array} satisfies {constraint}")
                    } else {
                        format!("{array} violates {constraint}")
                    },
                };
            };
            for (idx, element) in elements.iter().enumerate() {
                let value = element.as_object().and_then(|o| o.get(field));
                if !constraint.matches(value) {
                    return Comparison {
                        ok: false,
                        message: format!(
                            "{array}[{idx}].{field} = {}, violates {constraint}",
                            value.map_or_else(|| "none".to_string(), plain)
                        ),
                    };
                }
            }
            Comparison {
                ok: true,
                message: format!("every {array}[*].{field} satisfies {constraint}"),
            }
        }
    }
}

fn single_verdict(comparison: Comparison) -> CheckResult {
    if comparison.ok {
        CheckResult::pass("attribute matches", comparison.message)
    } else {
        CheckResult::fail("attribute does not match", comparison.message)
    }
}

async fn single_target(
    target: &str,
    key: &str,
    expected: &Value,
    ctx: &CheckContext<'_>,
) -> Result<CheckResult> {
    let workspace = ctx.workspace;
    let path = workspace.resolve_or_direct(target);

    if key == "naming_pattern" {
        return naming_pattern(target, &path, expected, workspace);
    }

    if key == "exists" || key == "_exists" {
        let exists = path.exists();
        return Ok(CheckResult::from_bool(
            exists,
            if exists { "file exists" } else { "file does not exist" },
            target,
        )
        .with_method(EvaluationMethod::Existence));
    }

    if !path.exists() {
        return Ok(CheckResult::dependency_failure(
            "prerequisite file missing",
            format!("{target} does not exist, cannot check {key}"),
        ));
    }

    let constraint = Constraint::parse(expected)?;
    match workspace.read_json(&path)? {
        JsonDocument::Parsed(data) => Ok(single_verdict(compare(&data, key, &constraint))),
        JsonDocument::Malformed {
            raw,
            line,
            column,
            message,
        } => match ctx.judge {
            Some(judge) => {
                warn!("{} is not valid JSON, extracting {} through the judge", target, key);
                semantic_extraction(judge, target, key, expected, &raw).await
            }
            None => {
                let mut result = CheckResult::fail(
                    "file is not valid JSON",
                    format!("{target} line {line} column {column}: {message}; no judge for semantic extraction"),
                );
                result.json_parse_error = true;
                Ok(result)
            }
        },
    }
}

async fn semantic_extraction(
    judge: &Judge,
    target: &str,
    key: &str,
    expected: &Value,
    raw: &str,
) -> Result<CheckResult> {
    let excerpt: String = raw.chars().take(EXTRACTION_LIMIT).collect();
    let prompt = format!(
        "The following file content is not valid JSON. Extract the value its author intended for one field.\n\n\
         **File content (raw text):**\n{excerpt}\n\n\
         **Field path:** {key}\n**Expected value:** {expected}\n\n\
         Ignore syntax errors and decide what value the author meant for {key}. \
         Return it verbatim, including special characters.\n\n\
         Reply as a JSON object:\n\
         {{\"extracted_value\": \"...\", \"matched\": true/false, \"reason\": \"...\"}}"
    );
    let messages = [
        ChatMessage::system("You are a precise text analyst. You extract the intended value of a field from imperfectly formatted text."),
        ChatMessage::user(prompt),
    ];

    let reply = match judge.judge_json(&messages).await {
        Ok(reply) => reply,
        Err(e) => {
            let mut result = CheckResult::fail(
                "file is not valid JSON and semantic extraction failed",
                format!("{target}: {e}"),
            );
            result.json_parse_error = true;
            return Ok(result);
        }
    };

    let matched = reply.get("matched").is_some_and(truthy);
    let extracted = reply.get("extracted_value").map(plain).unwrap_or_default();
    let reason = reply.get("reason").map(plain).unwrap_or_default();
    let details = format!(
        "{target} is not valid JSON; extracted {key} = '{extracted}', expected {expected}. {reason}"
    );
    info!("Semantic extraction for {}: matched={}", target, matched);

    Ok(if matched {
        CheckResult::pass("attribute matches (semantic extraction)", details)
    } else {
        CheckResult::fail("attribute does not match (semantic extraction)", details)
    }
    .with_semantic_fallback())
}

fn naming_pattern(
    target: &str,
    dir: &Path,
    expected: &Value,
    workspace: &WorkspaceAccessor,
) -> Result<CheckResult> {
    if !dir.exists() {
        return Ok(CheckResult::fail("directory does not exist", target));
    }
    if !dir.is_dir() {
        return Ok(CheckResult::fail("path is not a directory", target));
    }

    let files: Vec<String> = workspace
        .list_dir(dir)?
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .map(|entry| entry.name)
        .collect();
    if files.is_empty() {
        return Ok(CheckResult::fail("directory is empty", target));
    }

    let pattern = expected
        .get("regex")
        .and_then(Value::as_str)
        .ok_or_else(|| CheckError::InvalidParams("naming_pattern needs `expected_value.regex`".into()))?;
    let re = Regex::new(&format!("^(?:{pattern})")).map_err(|e| CheckError::Pattern(format!("{pattern}: {e}")))?;

    let mismatched: Vec<&String> = files.iter().filter(|name| !re.is_match(name)).collect();
    Ok(if mismatched.is_empty() {
        CheckResult::pass(
            "all file names follow the pattern",
            format!("{} files match {pattern}", files.len()),
        )
    } else {
        CheckResult::fail(
            "some file names break the pattern",
            format!(
                "{}/{} files do not match {pattern}: {}",
                mismatched.len(),
                files.len(),
                mismatched.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            ),
        )
    })
}

fn glob_target(
    target: &str,
    key: &str,
    expected: &Value,
    workspace: &WorkspaceAccessor,
) -> Result<CheckResult> {
    let files = workspace.glob_files(target)?;
    if files.is_empty() {
        return Ok(CheckResult::fail(
            "no matching files",
            format!("pattern '{target}' matched nothing"),
        ));
    }

    if let Some(wanted) = expected.get("contains_value") {
        let min_count = match expected.get("min_count").map(CountParam::parse) {
            None => 1,
            Some(Some(CountParam::Fixed(n))) => n,
            Some(Some(CountParam::Unresolved(raw))) => {
                return Ok(CheckResult::skip("min_count not resolved", raw));
            }
            Some(None) => return Err(CheckError::InvalidParams("`min_count` is not a count".into())),
        };

        let mut matched = 0;
        let mut lines = Vec::with_capacity(files.len());
        for path in &files {
            let name = file_name(path);
            match workspace.read_json(path)? {
                JsonDocument::Parsed(data) => {
                    let actual = nested(&data, key);
                    if actual.is_some_and(|a| values_equal(a, wanted)) {
                        matched += 1;
                    }
                    lines.push(format!("{name}: {key} = {}", actual.map_or_else(|| "none".into(), plain)));
                }
                JsonDocument::Malformed { .. } => lines.push(format!("{name}: not valid JSON")),
            }
        }
        let details = format!(
            "{matched}/{} files have {key} = {}, need >= {min_count}; {}",
            files.len(),
            plain(wanted),
            lines.join("; ")
        );
        return Ok(CheckResult::from_bool(
            matched >= min_count,
            if matched >= min_count {
                "enough files carry the value"
            } else {
                "too few files carry the value"
            },
            details,
        ));
    }

    let constraint = Constraint::parse(expected)?;
    let mut all_ok = true;
    let mut lines = Vec::with_capacity(files.len());
    for path in &files {
        let name = file_name(path);
        match workspace.read_json(path)? {
            JsonDocument::Parsed(data) => {
                let comparison = compare(&data, key, &constraint);
                all_ok &= comparison.ok;
                lines.push(format!("{name}: {}", comparison.message));
            }
            JsonDocument::Malformed { line, column, .. } => {
                all_ok = false;
                lines.push(format!("{name}: not valid JSON (line {line}, column {column})"));
            }
        }
    }
    Ok(CheckResult::from_bool(
        all_ok,
        if all_ok {
            "every file matches"
        } else {
            "some files do not match"
        },
        lines.join("; "),
    ))
}

fn cross_target(target: &str, key: &str, workspace: &WorkspaceAccessor) -> Result<CheckResult> {
    let parts: Vec<&str> = target.split(" + ").map(str::trim).collect();
    let [characters, other] = parts.as_slice() else {
        return Err(CheckError::InvalidParams(format!(
            "cross-file target needs exactly two paths: {target}"
        )));
    };

    if key != "main_characters_in_outline" && key != "main_characters_in_chapters" {
        return Ok(CheckResult::skip(
            format!("unsupported cross-file attribute `{key}`"),
            target.to_string(),
        ));
    }

    let names = match main_character_names(characters, workspace)? {
        Ok(names) => names,
        Err(skip) => return Ok(skip),
    };

    let (text, scope) = if key == "main_characters_in_outline" {
        let Some(path) = workspace.resolve(other) else {
            return Ok(CheckResult::dependency_failure(
                "prerequisite file missing",
                format!("{other} does not exist"),
            ));
        };
        let text = match workspace.read_json(&path)? {
            JsonDocument::Parsed(outline) => outline.to_string(),
            JsonDocument::Malformed { raw, .. } => {
                warn!("{} is not valid JSON, searching it as text", other);
                raw
            }
        };
        (text, "outline")
    } else {
        let pattern = if other.ends_with('/') {
            format!("{other}*.md")
        } else {
            other.to_string()
        };
        let chapters = workspace.glob_files(&pattern)?;
        if chapters.is_empty() {
            return Ok(CheckResult::dependency_failure(
                "no chapter files",
                format!("pattern '{pattern}' matched nothing"),
            ));
        }
        let mut text = String::new();
        for path in &chapters {
            text.push_str(&workspace.read_text(path)?);
            text.push('\n');
        }
        (text, "chapters")
    };

    let (found, missing): (Vec<&String>, Vec<&String>) = names.iter().partition(|name| text.contains(name.as_str()));
    let join = |names: &[&String]| names.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ");
    Ok(if missing.is_empty() {
        CheckResult::pass(
            format!("every main character appears in the {scope}"),
            format!("found {}: {}", found.len(), join(&found[..])),
        )
    } else {
        CheckResult::fail(
            format!("some main characters are absent from the {scope}"),
            format!(
                "found {}: {}; missing {}: {}",
                found.len(),
                join(&found[..]),
                missing.len(),
                join(&missing[..])
            ),
        )
    })
}

/// `main_characters[].name` of a character file, or the skip explaining why
/// it is unusable.
fn main_character_names(
    rel: &str,
    workspace: &WorkspaceAccessor,
) -> Result<std::result::Result<Vec<String>, CheckResult>> {
    let Some(path) = workspace.resolve(rel) else {
        return Ok(Err(CheckResult::dependency_failure(
            "prerequisite file missing",
            format!("{rel} does not exist"),
        )));
    };
    let data = match workspace.read_json(&path)? {
        JsonDocument::Parsed(data) => data,
        JsonDocument::Malformed { line, column, .. } => {
            return Ok(Err(CheckResult::dependency_failure(
                "prerequisite file is not valid JSON",
                format!("{rel} line {line} column {column}"),
            )));
        }
    };

    let names: Vec<String> = data
        .get("main_characters")
        .and_then(Value::as_array)
        .map(|chars| {
            chars
                .iter()
                .filter_map(|c| c.get("name")?.as_str())
                .filter(|n| !n.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if names.is_empty() {
        let keys = data
            .as_object()
            .map(|o| o.keys().take(5).cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        return Ok(Err(CheckResult::dependency_failure(
            "no named main characters",
            format!("{rel} has no main_characters[].name; top-level keys: {keys}"),
        )));
    }
    Ok(Ok(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::fixtures::{judge, write};
    use quillgrade_core::{Transcript, Verdict};
    use serde_json::json;
    use tempfile::TempDir;

    fn item(params: Value) -> CheckItem {
        CheckItem::new(CheckType::EntityAttributeEquals, params)
    }

    async fn run(dir: &TempDir, params: Value) -> CheckResult {
        let transcript = Transcript::default();
        let workspace = WorkspaceAccessor::new(dir.path());
        let ctx = CheckContext::new(&transcript, &workspace);
        AttributeChecker.evaluate(&item(params), &ctx).await
    }

    #[tokio::test]
    async fn test_nested_field_and_array_constraint() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "workspace/topic_brief.json",
            r#"{"meta": {"genre": "xianxia"}, "hooks": [{"text": "a"}, {"text": "b"}, {"text": "c"}]}"#,
        );

        let result = run(&dir, json!({"entity_type": "file", "target_id": "workspace/topic_brief.json",
            "attribute_key": "meta.genre", "expected_value": "xianxia"})).await;
        assert_eq!(result.check_result, Verdict::Pass);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::Rule));

        let result = run(&dir, json!({"entity_type": "file", "target_id": "workspace/topic_brief.json",
            "attribute_key": "hooks", "expected_value": {"array_min_length": 3, "array_item_type": "dict"}})).await;
        assert_eq!(result.check_result, Verdict::Pass);

        let result = run(&dir, json!({"entity_type": "file", "target_id": "workspace/topic_brief.json",
            "attribute_key": "hooks[*].text", "expected_value": {"enum": ["a", "b"]}})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("hooks[2].text"));
    }

    #[tokio::test]
    async fn test_missing_file_is_dependency_failure() {
        let dir = TempDir::new().unwrap();
        let result = run(&dir, json!({"entity_type": "file", "target_id": "workspace/outline.json",
            "attribute_key": "title", "expected_value": "x"})).await;
        assert_eq!(result.check_result, Verdict::Skip);
        assert!(result.dependency_failure);

        let exists = run(&dir, json!({"entity_type": "file", "target_id": "workspace/outline.json",
            "attribute_key": "_exists"})).await;
        assert_eq!(exists.check_result, Verdict::Fail);
        assert_eq!(exists.evaluation_method, Some(EvaluationMethod::Existence));
    }

    #[tokio::test]
    async fn test_malformed_json_without_judge_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/outline.json", "{\"status\": \"done\",}");
        let result = run(&dir, json!({"entity_type": "file", "target_id": "workspace/outline.json",
            "attribute_key": "status", "expected_value": "done"})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.json_parse_error);
        assert!(!result.semantic_fallback);
    }

    #[tokio::test]
    async fn test_malformed_json_uses_semantic_extraction() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/outline.json", "{\"trend\": \"↗\",}");
        let transcript = Transcript::default();
        let workspace = WorkspaceAccessor::new(dir.path());
        let (judge, client) = judge(&[Some(r#"{"extracted_value": "↗", "matched": true, "reason": "same"}"#)]);
        let ctx = CheckContext::new(&transcript, &workspace).with_judge(Some(&judge));

        let it = item(json!({"entity_type": "file", "target_id": "workspace/outline.json",
            "attribute_key": "trend", "expected_value": "↗"}));
        let result = AttributeChecker.evaluate(&it, &ctx).await;
        assert_eq!(result.check_result, Verdict::Pass);
        assert!(result.semantic_fallback);
        assert!(result.json_parse_error);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::SemanticExtraction));
        assert!(client.prompts.lock().unwrap()[0].contains("trend"));
    }

    #[tokio::test]
    async fn test_glob_contains_value_counts_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/characters/a.json", r#"{"role": "villain"}"#);
        write(dir.path(), "workspace/characters/b.json", r#"{"role": "hero"}"#);
        write(dir.path(), "workspace/characters/c.json", r#"{"role": "villain"}"#);

        let params = |min: u64| json!({"entity_type": "file", "target_id": "workspace/characters/*.json",
            "attribute_key": "role", "expected_value": {"contains_value": "villain", "min_count": min}});
        assert_eq!(run(&dir, params(2)).await.check_result, Verdict::Pass);
        assert_eq!(run(&dir, params(3)).await.check_result, Verdict::Fail);

        let none = run(&dir, json!({"entity_type": "file", "target_id": "workspace/none/*.json",
            "attribute_key": "role", "expected_value": "x"})).await;
        assert_eq!(none.check_result, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_naming_pattern() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/chapters/chapter_01.md", "x");
        write(dir.path(), "workspace/chapters/draft.md", "x");
        let result = run(&dir, json!({"entity_type": "file", "target_id": "workspace/chapters",
            "attribute_key": "naming_pattern", "expected_value": {"regex": "chapter_\\d+\\.md$"}})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("draft.md"));

        let bad = run(&dir, json!({"entity_type": "file", "target_id": "workspace/chapters",
            "attribute_key": "naming_pattern", "expected_value": {}})).await;
        assert_eq!(bad.check_result, Verdict::Fail);
        assert!(bad.reason.contains("aborted"));
    }

    #[tokio::test]
    async fn test_main_characters_cross_targets() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "workspace/characters.json",
            r#"{"main_characters": [{"name": "林远"}, {"name": "苏晴"}, {"name": ""}]}"#,
        );
        write(dir.path(), "workspace/outline.json", "{\"summary\": \"林远 meets 苏晴\",");
        write(dir.path(), "workspace/chapters/chapter_1.md", "林远 walked alone.");

        let outline = run(&dir, json!({"entity_type": "file",
            "target_id": "workspace/characters.json + workspace/outline.json",
            "attribute_key": "main_characters_in_outline"})).await;
        assert_eq!(outline.check_result, Verdict::Pass);

        let chapters = run(&dir, json!({"entity_type": "file",
            "target_id": "workspace/characters.json + workspace/chapters/",
            "attribute_key": "main_characters_in_chapters"})).await;
        assert_eq!(chapters.check_result, Verdict::Fail);
        assert!(chapters.details.contains("苏晴"));

        let missing = run(&dir, json!({"entity_type": "file",
            "target_id": "workspace/cast.json + workspace/outline.json",
            "attribute_key": "main_characters_in_outline"})).await;
        assert!(missing.dependency_failure);

        let other = run(&dir, json!({"entity_type": "file",
            "target_id": "workspace/characters.json + workspace/outline.json",
            "attribute_key": "relations"})).await;
        assert_eq!(other.check_result, Verdict::Skip);
    }

    #[tokio::test]
    async fn test_non_file_entity_skips() {
        let dir = TempDir::new().unwrap();
        let result = run(&dir, json!({"entity_type": "database", "target_id": "x", "attribute_key": "y"})).await;
        assert_eq!(result.check_result, Verdict::Skip);
    }
}
