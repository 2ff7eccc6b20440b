//! `semantic_check`: judge-decided and programmatic content checks.
//!
//! The analysis target picks one of four modes:
//!
//! | mode | selected by | judged text |
//! |------|-------------|-------------|
//! | response | `target_type: response` (default) | the agent's final reply |
//! | file field | `target_type: file_field` | one field per matching file |
//! | file content | `target_type: file_content` | all matching files together |
//! | raw | `analysis_target`, `use_raw_content` or `target_type: file_content_raw` | raw file text, JSON or not |
//!
//! Raw mode also hosts the character-count range check and the chapter
//! heuristics, neither of which needs a judge. Whenever the judge is
//! missing or fails, `expected_keywords` are matched instead and the
//! result says so through its evaluation method.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType, EvaluationMethod, Flaw};
use quillgrade_judge::{ChatMessage, Judge, JudgeError};
use quillgrade_storage::{file_name, sort_by_chapter_number, JsonDocument, WorkspaceAccessor};
use regex::Regex;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::whitelist::{extra_entries, locate_dir};
use crate::criteria::load_criteria;
use crate::engine::{CheckContext, CheckError, Checker, Result};
use crate::field::{head_tail, nested, plain, truthy, FieldPath};
use crate::heuristics::{planned_chapter_count, Chapter, ContentHeuristics, HeuristicMethod};
use crate::params::{CountParam, Params};

const PASS_SCORE: f64 = 75.0;
const RAW_FIELD_CHARS: usize = 500;
const CONTENT_LIMIT: usize = 30_000;
const RAW_LIMIT: usize = 50_000;
const OUTLINE: &str = "workspace/outline.json";

/// Which text a semantic item is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Response,
    FileField,
    FileContent,
    Raw,
}

impl Mode {
    fn of(params: &Params<'_>) -> std::result::Result<Self, String> {
        if params.get("analysis_target").is_some() || params.flag("use_raw_content") {
            return Ok(Self::Raw);
        }
        match params.str("target_type").unwrap_or("response") {
            "response" => Ok(Self::Response),
            "file_field" => Ok(Self::FileField),
            "file_content" => Ok(Self::FileContent),
            "file_content_raw" => Ok(Self::Raw),
            other => Err(other.to_string()),
        }
    }
}

/// What raw mode does with the files it read.
enum RawJob {
    WordCount,
    Heuristic(HeuristicMethod),
    Judge,
}

/// Judge inputs shared by every mode.
struct Rubric {
    criteria: String,
    keywords: Vec<String>,
    use_judge: bool,
}

impl Rubric {
    fn new(params: &Params<'_>, workspace: &WorkspaceAccessor) -> Self {
        let criteria = load_criteria(params, workspace);
        let semantic_rule = params.validation_method() == Some("llm_semantic_analysis");
        Self {
            use_judge: params.flag("use_llm_judge") || (semantic_rule && !criteria.trim().is_empty()),
            keywords: params.strings("expected_keywords"),
            criteria,
        }
    }

    fn has_criteria(&self) -> bool {
        !self.criteria.trim().is_empty()
    }

    fn keyword_hits(&self, text: &str) -> Vec<&str> {
        self.keywords
            .iter()
            .map(String::as_str)
            .filter(|kw| text.contains(kw))
            .collect()
    }

    /// Verdict when the judge cannot decide: keywords if any, otherwise
    /// the judge error, otherwise a skip.
    fn fallback(&self, text: &str, judge_error: Option<JudgeError>) -> CheckResult {
        if !self.keywords.is_empty() {
            let why = match &judge_error {
                Some(e) => format!("judge failed ({e}), keyword matching"),
                None => "keyword matching".to_string(),
            };
            let hits = self.keyword_hits(text);
            let result = if hits.is_empty() {
                CheckResult::fail(
                    "expected keywords missing",
                    format!("{why}: none of {} found", self.keywords.join(", ")),
                )
            } else {
                CheckResult::pass("expected keywords present", format!("{why}: found {}", hits.join(", ")))
            };
            return result.with_method(EvaluationMethod::KeywordFallback);
        }
        match judge_error {
            Some(e) => CheckResult::fail(format!("judge call failed: {e}"), "no expected_keywords to fall back on")
                .with_method(EvaluationMethod::LlmJudge),
            None => CheckResult::skip(
                "no judge configured",
                "this check needs the judge or expected_keywords",
            ),
        }
    }
}

async fn ask(judge: &Judge, prompt: String) -> std::result::Result<Value, JudgeError> {
    judge.judge_json(&[ChatMessage::user(prompt)]).await
}

fn matched(reply: &Value) -> (bool, String) {
    (
        reply.get("matched").is_some_and(truthy),
        reply.get("reason").map(plain).unwrap_or_default(),
    )
}

/// Semantic checker with configurable chapter heuristics.
#[derive(Debug, Default)]
pub struct SemanticChecker {
    heuristics: ContentHeuristics,
}

impl SemanticChecker {
    /// Create a checker using the given heuristics.
    pub fn new(heuristics: ContentHeuristics) -> Self {
        Self { heuristics }
    }

    async fn response(&self, params: &Params<'_>, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let Some(response) = ctx.transcript.final_response().filter(|r| !r.trim().is_empty()) else {
            return Ok(CheckResult::fail("no response content", "the transcript has no final reply"));
        };
        let rubric = Rubric::new(params, ctx.workspace);

        let mut judge_error = None;
        if let (true, Some(judge)) = (rubric.use_judge, ctx.judge) {
            let prompt = format!(
                "Assess whether the agent's reply meets the business requirement.\n\n\
                 **Requirement:** {}\n**Expected key information:** {}\n**Agent reply:** {response}\n\n\
                 Score coverage of the key information from 0 to 100:\n\
                 - 90-100: fully meets the requirement\n\
                 - 70-89: meets the main requirement\n\
                 - 50-69: partially meets it\n\
                 - 0-49: misses important information\n\n\
                 Match by meaning, not exact wording; synonyms count.\n\n\
                 Reply as a JSON object:\n\
                 {{\"score\": 85, \"matched_keywords\": [], \"missing_keywords\": [], \"explanation\": \"...\"}}",
                rubric.criteria,
                rubric.keywords.join(", "),
            );
            match ask(judge, prompt).await {
                Ok(reply) => {
                    let score = reply.get("score").and_then(Value::as_f64).unwrap_or(0.0);
                    let explanation = reply.get("explanation").map(plain).unwrap_or_default();
                    let list = |key: &str| reply.get(key).map(plain).unwrap_or_else(|| "[]".into());
                    let result = if score >= PASS_SCORE {
                        CheckResult::pass(
                            "reply meets the requirement",
                            format!("judge score {score}/100; matched {}. {explanation}", list("matched_keywords")),
                        )
                    } else {
                        CheckResult::fail(
                            "reply misses the requirement",
                            format!("judge score {score}/100; missing {}. {explanation}", list("missing_keywords")),
                        )
                    };
                    return Ok(result.with_method(EvaluationMethod::LlmJudge));
                }
                Err(e) => {
                    warn!("Judge failed on the response check, falling back to keywords: {}", e);
                    judge_error = Some(e);
                }
            }
        }
        Ok(rubric.fallback(&response, judge_error))
    }

    async fn file_field(&self, params: &Params<'_>, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let pattern = params.require_str("file_pattern")?;
        let field_path = params.require_str("field_path")?;
        let min_count = match params.count("min_count")? {
            Some(CountParam::Fixed(n)) => n,
            _ => 1,
        };
        let rubric = Rubric::new(params, ctx.workspace);
        let use_judge = rubric.use_judge && rubric.has_criteria();
        let judge = ctx.judge.filter(|_| use_judge);
        if judge.is_none() && rubric.keywords.is_empty() {
            return Ok(rubric.fallback("", None));
        }

        let files = ctx.workspace.glob_files(pattern)?;
        if files.is_empty() {
            return Ok(CheckResult::fail(
                "no matching files",
                format!("pattern '{pattern}' matched nothing"),
            ));
        }

        let mut judge_calls = FieldJudge {
            judge,
            rubric: &rubric,
            judged: 0,
        };
        let mut matched_files = 0;
        let mut text_mode = false;
        let mut lines = Vec::with_capacity(files.len());

        for path in &files {
            let name = file_name(path);
            match ctx.workspace.read_json(path)? {
                JsonDocument::Parsed(data) => match FieldPath::parse(field_path) {
                    FieldPath::Wildcard { array, item } => {
                        let Some(Value::Array(elements)) = nested(&data, array) else {
                            lines.push(format!("{name}: {array} is not an array"));
                            continue;
                        };
                        let mut hits = 0;
                        let mut notes = Vec::new();
                        for (idx, element) in elements.iter().enumerate() {
                            let value = match (element, item) {
                                (Value::Object(obj), Some(field)) => obj.get(field).cloned().unwrap_or(Value::Null),
                                (other, _) => other.clone(),
                            };
                            if !truthy(&value) {
                                continue;
                            }
                            let (ok, note) = judge_calls.decide(&plain(&value), false).await;
                            hits += usize::from(ok);
                            notes.push(format!("item {}: {note}", idx + 1));
                        }
                        if hits > 0 {
                            matched_files += 1;
                        }
                        lines.push(format!("{name}: {hits}/{} items match; {}", elements.len(), notes.join("; ")));
                    }
                    FieldPath::Plain(path_in_file) => {
                        let value = nested(&data, path_in_file).filter(|v| truthy(v));
                        let Some(value) = value else {
                            lines.push(format!("{name}: {path_in_file} missing or empty"));
                            continue;
                        };
                        let (ok, note) = judge_calls.decide(&plain(value), false).await;
                        matched_files += usize::from(ok);
                        lines.push(format!("{name}: {note}"));
                    }
                },
                JsonDocument::Malformed { raw, .. } => {
                    if !use_judge {
                        lines.push(format!("{name}: invalid JSON, field not extracted"));
                        continue;
                    }
                    text_mode = true;
                    let text = extract_raw_field(&raw, field_path);
                    warn!("{} is not valid JSON, judging {} from raw text", name, field_path);
                    let (ok, note) = judge_calls.decide(&text, true).await;
                    matched_files += usize::from(ok);
                    lines.push(format!("{name}: {note}"));
                }
            }
        }

        let method = if judge_calls.judged > 0 {
            EvaluationMethod::LlmJudge
        } else {
            EvaluationMethod::KeywordFallback
        };
        let mode_note = if text_mode { ", some files read as raw text" } else { "" };
        let details = format!(
            "{matched_files}/{} files match, need >= {min_count}{mode_note}; {}",
            files.len(),
            lines.join("; ")
        );
        Ok(CheckResult::from_bool(
            matched_files >= min_count,
            if matched_files >= min_count {
                "field semantics match"
            } else {
                "field semantics do not match"
            },
            details,
        )
        .with_method(method))
    }

    async fn file_content(&self, params: &Params<'_>, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let pattern = params.require_str("file_pattern")?;
        let rubric = Rubric::new(params, ctx.workspace);
        if !rubric.use_judge || !rubric.has_criteria() {
            return Err(CheckError::InvalidParams(
                "file_content checks need use_llm_judge and judge criteria".into(),
            ));
        }

        let files = ctx.workspace.glob_files(pattern)?;
        if files.is_empty() {
            return Ok(CheckResult::fail(
                "no matching files",
                format!("pattern '{pattern}' matched nothing"),
            ));
        }
        let contents = read_all(ctx.workspace, &files)?;
        let combined = contents
            .iter()
            .map(|(name, text)| format!("File: {name}\n{text}"))
            .collect::<Vec<_>>()
            .join("\n\n=== next file ===\n\n");

        let Some(judge) = ctx.judge else {
            return Ok(rubric.fallback(&combined, None));
        };
        let prompt = format!(
            "Assess whether the files below, taken together, meet the business standard.\n\n\
             **Standard:** {}\n\n**File count:** {}\n\n**Content:**\n{}\n\n\
             Judge the set as a whole: coherence, consistency and overall logic across files. \
             If the content is truncated, reason from what is visible.\n\n\
             Reply as a JSON object:\n{{\"matched\": true/false, \"reason\": \"...\"}}",
            rubric.criteria,
            files.len(),
            head_tail(&combined, CONTENT_LIMIT, CONTENT_LIMIT / 2),
        );
        match ask(judge, prompt).await {
            Ok(reply) => {
                let (ok, reason) = matched(&reply);
                Ok(CheckResult::from_bool(
                    ok,
                    if ok {
                        "content meets the standard"
                    } else {
                        "content misses the standard"
                    },
                    format!("{} files judged; {reason}", files.len()),
                )
                .with_method(EvaluationMethod::LlmJudge))
            }
            Err(e) => {
                warn!("Judge failed on a file content check: {}", e);
                Ok(rubric.fallback(&combined, Some(e)))
            }
        }
    }

    async fn raw(&self, params: &Params<'_>, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let workspace = ctx.workspace;
        let target = params
            .str("file_pattern")
            .or_else(|| params.str("analysis_target"))
            .ok_or_else(|| CheckError::InvalidParams("`file_pattern` or `analysis_target` is required".into()))?;
        let rubric = Rubric::new(params, workspace);

        let job = match params.validation_method() {
            Some("word_count_range") => RawJob::WordCount,
            Some(method) => match HeuristicMethod::from_method(method) {
                Some(heuristic) => RawJob::Heuristic(heuristic),
                None => RawJob::Judge,
            },
            None => RawJob::Judge,
        };
        if matches!(job, RawJob::Judge) && (!rubric.use_judge || !rubric.has_criteria()) {
            return Err(CheckError::InvalidParams(
                "judged raw checks need use_llm_judge (or llm_semantic_analysis) and judge criteria".into(),
            ));
        }

        let mut matched = Vec::new();
        for pattern in target.split(" + ").map(str::trim).filter(|p| !p.is_empty()) {
            matched.extend(workspace.glob_flexible(pattern)?);
        }
        if matched.is_empty() {
            return Ok(CheckResult::fail(
                "no matching files",
                format!("pattern '{target}' matched nothing"),
            ));
        }

        let required = params.strings("required_files");
        let mut whitelist_note = String::new();
        if !required.is_empty() && target.trim_end_matches('/') == "workspace" {
            if let Some(dir) = locate_dir(workspace, "workspace/") {
                let extra = extra_entries(workspace, &dir, &required)?;
                if !extra.is_empty() {
                    return Ok(CheckResult::fail(
                        "workspace holds entries outside the whitelist",
                        format!("whitelist: {}; extra: {}", required.join(", "), extra.join(", ")),
                    )
                    .with_method(EvaluationMethod::Rule));
                }
                whitelist_note = "; whitelist check passed".to_string();
                if let Some(chapters) = chapter_files(workspace, &dir.join("chapters"))? {
                    matched = chapters;
                }
            }
        }

        let files: Vec<PathBuf> = matched.into_iter().filter(|p| p.is_file()).collect();
        if files.is_empty() {
            return Ok(CheckResult::fail(
                "no readable files",
                format!("pattern '{target}' matched only directories"),
            ));
        }
        let contents = read_all(workspace, &files)?;
        let names: Vec<&str> = contents.iter().map(|(name, _)| name.as_str()).collect();
        let context = if names.len() == 1 {
            format!("file: {}", names[0])
        } else {
            let shown = names.iter().take(3).copied().collect::<Vec<_>>().join(", ");
            let more = if names.len() > 3 { ", ..." } else { "" };
            format!("{} files: {shown}{more}", names.len())
        };

        match job {
            RawJob::WordCount => word_count(params, &contents, &context),
            RawJob::Heuristic(method) => {
                let chapters: Vec<Chapter> = contents
                    .into_iter()
                    .map(|(name, text)| Chapter::new(name, text))
                    .collect();
                self.heuristic(method, params, workspace, &chapters)
            }
            RawJob::Judge => {
                let combined = if contents.len() == 1 {
                    contents[0].1.clone()
                } else {
                    contents
                        .iter()
                        .map(|(name, text)| format!("File: {name}\n{text}"))
                        .collect::<Vec<_>>()
                        .join("\n\n=== next file ===\n\n")
                };
                let Some(judge) = ctx.judge else {
                    return Ok(rubric.fallback(&combined, None));
                };
                let prompt = format!(
                    "Assess whether the following content meets the business standard.\n\n\
                     **Standard:**\n{}\n\n**Content ({context}):**\n{}\n\n\
                     The content may or may not be JSON; judge its meaning, not its format. \
                     If it is truncated, reason from what is visible.\n\n\
                     Reply as a JSON object:\n{{\"matched\": true/false, \"reason\": \"...\"}}",
                    rubric.criteria,
                    head_tail(&combined, RAW_LIMIT, RAW_LIMIT / 2),
                );
                match ask(judge, prompt).await {
                    Ok(reply) => Ok(raw_verdict(&reply, files.len(), &whitelist_note)),
                    Err(e) => {
                        warn!("Judge failed on a raw content check: {}", e);
                        Ok(rubric.fallback(&combined, Some(e)))
                    }
                }
            }
        }
    }

    fn heuristic(
        &self,
        method: HeuristicMethod,
        params: &Params<'_>,
        workspace: &WorkspaceAccessor,
        chapters: &[Chapter],
    ) -> Result<CheckResult> {
        debug!("Running {:?} over {} chapters", method, chapters.len());
        Ok(match method {
            HeuristicMethod::ChapterCloning => self.heuristics.chapter_cloning(chapters),
            HeuristicMethod::AlternatingRepetition => self.heuristics.alternating_repetition(chapters),
            HeuristicMethod::LengthStability => self.heuristics.length_stability(chapters),
            HeuristicMethod::ParagraphRepetition => self.heuristics.paragraph_repetition(chapters),
            HeuristicMethod::ChapterCompletion => {
                let planned = match workspace.resolve(OUTLINE) {
                    Some(path) => workspace.read_json(&path)?.value().and_then(planned_chapter_count),
                    None => None,
                };
                let min_ratio = params
                    .first_rule()
                    .and_then(|rule| rule.get("min_completion_ratio"))
                    .and_then(Value::as_f64);
                self.heuristics.chapter_completion(chapters.len(), planned, min_ratio)
            }
        })
    }
}

/// Per-value judging with keyword fallback, counting judge decisions.
struct FieldJudge<'a> {
    judge: Option<&'a Judge>,
    rubric: &'a Rubric,
    judged: usize,
}

impl FieldJudge<'_> {
    async fn decide(&mut self, value: &str, from_raw: bool) -> (bool, String) {
        if let Some(judge) = self.judge {
            let source = if from_raw { " (extracted from raw text)" } else { "" };
            let prompt = format!(
                "Decide whether a single field value matches the business standard by semantic type.\n\n\
                 **Standard:** {}\n**Reference keywords:** {}\n**Field value{source}:** {value}\n\n\
                 Only judge the type of content; counting is done elsewhere. \
                 Synonyms count as matches, and the value matches if any part of it fits the standard.\n\n\
                 Reply as a JSON object:\n{{\"matched\": true/false, \"reason\": \"...\"}}",
                self.rubric.criteria,
                self.rubric.keywords.join(", "),
            );
            match ask(judge, prompt).await {
                Ok(reply) => {
                    self.judged += 1;
                    let (ok, reason) = matched(&reply);
                    let label = if ok { "match" } else { "no match" };
                    return (ok, format!("{label} (judge: {reason})"));
                }
                Err(e) => warn!("Judge failed on a field value, using keywords: {}", e),
            }
        }
        let ok = !self.rubric.keyword_hits(value).is_empty();
        let label = if ok { "match" } else { "no match" };
        (ok, format!("{label} (keywords)"))
    }
}

/// Best-effort value of `field_path` from JSON-invalid text.
fn extract_raw_field(raw: &str, field_path: &str) -> String {
    let key = field_path
        .split(['.', '[', ']'])
        .filter(|s| !s.is_empty() && *s != "*")
        .last()
        .unwrap_or(field_path);
    let captured = Regex::new(&format!(r#""{}"[:\s]*"([^"]+)""#, regex::escape(key)))
        .ok()
        .and_then(|re| re.captures(raw).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()));
    captured.unwrap_or_else(|| raw.chars().take(RAW_FIELD_CHARS).collect())
}

fn read_all(workspace: &WorkspaceAccessor, files: &[PathBuf]) -> Result<Vec<(String, String)>> {
    files
        .iter()
        .map(|path| Ok::<_, CheckError>((file_name(path), workspace.read_text(path)?)))
        .collect()
}

/// Chapter files of a directory: `*.md`, else every file.
fn chapter_files(workspace: &WorkspaceAccessor, dir: &std::path::Path) -> Result<Option<Vec<PathBuf>>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let entries: Vec<PathBuf> = workspace
        .list_dir(dir)?
        .into_iter()
        .filter(|e| !e.is_dir)
        .map(|e| dir.join(e.name))
        .collect();
    let markdown: Vec<PathBuf> = entries
        .iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .cloned()
        .collect();
    let mut chosen = if markdown.is_empty() { entries } else { markdown };
    sort_by_chapter_number(&mut chosen);
    Ok(Some(chosen))
}

fn word_count(params: &Params<'_>, contents: &[(String, String)], context: &str) -> Result<CheckResult> {
    let range = params
        .first_rule()
        .and_then(|rule| rule.get("expected_range"))
        .and_then(Value::as_array)
        .filter(|r| r.len() == 2)
        .and_then(|r| Some((r[0].as_f64()?, r[1].as_f64()?)))
        .ok_or_else(|| CheckError::InvalidParams("word_count_range needs `expected_range` [min, max]".into()))?;

    let total: usize = contents.iter().map(|(_, text)| text.chars().count()).sum();
    let (min, max) = range;
    let ok = min <= total as f64 && total as f64 <= max;
    Ok(CheckResult::from_bool(
        ok,
        if ok {
            "character count within range"
        } else {
            "character count out of range"
        },
        format!("{total} characters, expected [{min}, {max}]; {context}"),
    )
    .with_method(EvaluationMethod::WordCount))
}

fn raw_verdict(reply: &Value, file_count: usize, whitelist_note: &str) -> CheckResult {
    let (ok, reason) = matched(reply);
    let mut result = CheckResult::from_bool(
        ok,
        if ok {
            "content meets the standard"
        } else {
            "content misses the standard"
        },
        format!("{file_count} files judged{whitelist_note}; {reason}"),
    )
    .with_method(EvaluationMethod::LlmJudge);

    if let Some(Value::Array(flaws)) = reply.get("flaws") {
        let count = reply
            .get("flaw_count")
            .and_then(Value::as_u64)
            .map(|n| n as usize);
        result = result.with_flaws(flaws.iter().map(Flaw::from_value).collect(), count);
    }
    result
}

#[async_trait]
impl Checker for SemanticChecker {
    fn check_type(&self) -> CheckType {
        CheckType::SemanticCheck
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let params = Params::of(item);
        match Mode::of(&params) {
            Ok(Mode::Response) => self.response(&params, ctx).await,
            Ok(Mode::FileField) => self.file_field(&params, ctx).await,
            Ok(Mode::FileContent) => self.file_content(&params, ctx).await,
            Ok(Mode::Raw) => self.raw(&params, ctx).await,
            Err(other) => Ok(CheckResult::skip(
                format!("unsupported target_type `{other}`"),
                "expected response, file_field, file_content or file_content_raw",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::fixtures::{judge, write};
    use quillgrade_core::{Transcript, Verdict};
    use serde_json::json;
    use tempfile::TempDir;

    fn transcript(reply: &str) -> Transcript {
        serde_json::from_value(json!({"conversation_history": [
            {"role": "user", "content": "write a novel"},
            {"role": "assistant", "content": reply},
            {"role": "assistant", "content": ""}
        ]}))
        .unwrap()
    }

    async fn run(dir: &TempDir, transcript: &Transcript, judge: Option<&Judge>, params: Value) -> CheckResult {
        let workspace = WorkspaceAccessor::new(dir.path());
        let ctx = CheckContext::new(transcript, &workspace).with_judge(judge);
        SemanticChecker::default()
            .evaluate(&CheckItem::new(CheckType::SemanticCheck, params), &ctx)
            .await
    }

    #[tokio::test]
    async fn test_response_judged_by_score() {
        let dir = TempDir::new().unwrap();
        let t = transcript("The outline and three chapters are done.");
        let (j, _) = judge(&[Some(r#"{"score": 80, "explanation": "covers it"}"#)]);
        let result = run(&dir, &t, Some(&j), json!({"use_llm_judge": true, "llm_judge_criteria": "reports progress"})).await;
        assert_eq!(result.check_result, Verdict::Pass);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::LlmJudge));

        let (j, _) = judge(&[Some(r#"```json
{"score": 40}
```"#)]);
        let result = run(&dir, &t, Some(&j), json!({"use_llm_judge": true, "llm_judge_criteria": "x"})).await;
        assert_eq!(result.check_result, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_response_falls_back_to_keywords() {
        let dir = TempDir::new().unwrap();
        let t = transcript("The outline and three chapters are done.");
        let (j, _) = judge(&[None]);
        let params = json!({"use_llm_judge": true, "llm_judge_criteria": "x", "expected_keywords": ["outline", "epilogue"]});
        let result = run(&dir, &t, Some(&j), params.clone()).await;
        assert_eq!(result.check_result, Verdict::Pass);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::KeywordFallback));
        assert!(result.details.contains("judge failed"));

        let no_judge = run(&dir, &t, None, params).await;
        assert_eq!(no_judge.evaluation_method, Some(EvaluationMethod::KeywordFallback));
    }

    #[tokio::test]
    async fn test_judge_failure_without_keywords_fails() {
        let dir = TempDir::new().unwrap();
        let t = transcript("done");
        let (j, _) = judge(&[Some("not json at all")]);
        let result = run(&dir, &t, Some(&j), json!({"use_llm_judge": true, "llm_judge_criteria": "x"})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.reason.starts_with("judge call failed"));

        let skipped = run(&dir, &t, None, json!({"use_llm_judge": true, "llm_judge_criteria": "x"})).await;
        assert_eq!(skipped.check_result, Verdict::Skip);
    }

    #[tokio::test]
    async fn test_file_field_wildcard_mixed_items() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/topic_brief.json", r#"{"hooks": ["a betrayal at the altar", {"text": "quiet morning"}, null]}"#);
        write(dir.path(), "workspace/other.json", r#"{"hooks": [{"text": "nothing here"}]}"#);

        let params = json!({"target_type": "file_field", "file_pattern": "workspace/*.json",
            "field_path": "hooks[*].text", "expected_keywords": ["betrayal"], "min_count": 1});
        let result = run(&dir, &Transcript::default(), None, params).await;
        assert_eq!(result.check_result, Verdict::Pass, "{}", result.details);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::KeywordFallback));
        assert!(result.details.contains("1/2 files match"));
    }

    #[tokio::test]
    async fn test_file_field_raw_text_through_judge() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/characters/a.json", r#"{"motivation": "protect her sister",}"#);

        let (j, client) = judge(&[Some(r#"{"matched": true, "reason": "protective"}"#)]);
        let params = json!({"target_type": "file_field", "file_pattern": "workspace/characters/*.json",
            "field_path": "motivation", "use_llm_judge": true, "llm_judge_criteria": "protective motives"});
        let result = run(&dir, &Transcript::default(), Some(&j), params).await;
        assert_eq!(result.check_result, Verdict::Pass);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::LlmJudge));
        assert!(client.prompts.lock().unwrap()[0].contains("protect her sister"));
    }

    #[test]
    fn test_extract_raw_field() {
        assert_eq!(extract_raw_field(r#"{"a": {"goal": "revenge",}"#, "a.goal"), "revenge");
        assert_eq!(extract_raw_field(r#"{"hooks": [{"text": "x"}"#, "hooks[*].text"), "x");
        assert_eq!(extract_raw_field("plain words", "goal"), "plain words");
    }

    #[tokio::test]
    async fn test_file_content_requires_judge_settings() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/chapters/1.md", "text");
        let result = run(&dir, &Transcript::default(), None,
            json!({"target_type": "file_content", "file_pattern": "workspace/chapters/*.md"})).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.reason.contains("aborted"));
    }

    #[tokio::test]
    async fn test_raw_word_count() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/chapters/chapter_1.md", &"字".repeat(1200));
        write(dir.path(), "workspace/chapters/chapter_2.md", &"字".repeat(900));

        let params = |min: u64, max: u64| json!({"analysis_target": "chapters/",
            "validation_rules": [{"validation_method": "word_count_range", "expected_range": [min, max]}]});
        let ok = run(&dir, &Transcript::default(), None, params(2000, 3000)).await;
        assert_eq!(ok.check_result, Verdict::Pass);
        assert_eq!(ok.evaluation_method, Some(EvaluationMethod::WordCount));
        assert!(ok.details.contains("2100 characters"));

        let short = run(&dir, &Transcript::default(), None, params(3000, 4000)).await;
        assert_eq!(short.check_result, Verdict::Fail);
    }

    #[tokio::test]
    async fn test_raw_completion_reads_outline() {
        let dir = TempDir::new().unwrap();
        let planned: Vec<Value> = (1..=20).map(|n| json!({"chapter": n})).collect();
        write(dir.path(), "workspace/outline.json", &json!({"chapters": planned}).to_string());
        for n in 1..=3 {
            write(dir.path(), &format!("workspace/chapters/chapter_{n}.md"), "text");
        }

        let params = json!({"analysis_target": "workspace/chapters/*.md",
            "validation_rules": [{"validation_method": "chapter_completion_ratio"}]});
        let result = run(&dir, &Transcript::default(), None, params).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert_eq!(result.evaluation_method, Some(EvaluationMethod::Heuristic));
        assert!(result.details.contains("20"));
    }

    #[tokio::test]
    async fn test_raw_whitelist_then_chapters_with_flaws() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/outline.json", "{}");
        write(dir.path(), "workspace/chapters/chapter_1.md", "The sect gate opened.");
        write(dir.path(), "workspace/chapters/chapter_2.md", "The sect gate closed.");

        let reply = r#"{"matched": false, "reason": "drifts", "flaws": [{"type": "logic", "severity": "high", "location": "chapter_2", "description": "gate contradiction"}]}"#;
        let (j, client) = judge(&[Some(reply)]);
        let params = json!({"analysis_target": "workspace/", "required_files": ["outline.json", "chapters/"],
            "validation_rules": [{"validation_method": "llm_semantic_analysis",
                "evaluation_criteria": {"validation_prompt": "stays on topic"}}]});
        let result = run(&dir, &Transcript::default(), Some(&j), params.clone()).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert_eq!(result.flaw_count, Some(1));
        assert_eq!(result.flaws.as_ref().unwrap()[0].kind, "logic");
        let prompt = client.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("chapter_1.md") && prompt.contains("gate closed"));
        assert!(!prompt.contains("outline.json"));

        write(dir.path(), "workspace/scratch.txt", "x");
        let (j, client) = judge(&[Some(reply)]);
        let result = run(&dir, &Transcript::default(), Some(&j), params).await;
        assert_eq!(result.check_result, Verdict::Fail);
        assert!(result.details.contains("scratch.txt"));
        assert!(client.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_target_type_skips() {
        let dir = TempDir::new().unwrap();
        let result = run(&dir, &Transcript::default(), None, json!({"target_type": "image"})).await;
        assert_eq!(result.check_result, Verdict::Skip);
    }
}
