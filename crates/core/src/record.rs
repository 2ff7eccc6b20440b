//! Verdicts and per-check records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::id::CheckId;
use crate::quality::{CheckItem, CheckType, Dimension, QualityTier};

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Rule satisfied
    Pass,
    /// Rule violated
    Fail,
    /// Not applicable; never counted
    Skip,
}

/// What actually decided a verdict.
///
/// Lets accuracy audits separate judge-decided results from heuristic ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    /// Deterministic rule over parsed data
    Rule,
    /// Existence probe
    Existence,
    /// Character count range
    WordCount,
    /// Programmatic chapter heuristic
    Heuristic,
    /// External LLM judge
    LlmJudge,
    /// Keyword matching after the judge was unavailable or unusable
    KeywordFallback,
    /// Literal search in JSON-invalid text
    TextSearchFallback,
    /// Judge-based field extraction from JSON-invalid text
    SemanticExtraction,
}

/// A fine-grained defect reported by the judge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flaw {
    /// Defect category
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Severity label
    #[serde(default)]
    pub severity: String,
    /// Where in the text
    #[serde(default)]
    pub location: String,
    /// What is wrong
    #[serde(default)]
    pub description: String,
}

impl Flaw {
    /// Read a flaw from loosely shaped judge output; non-string fields are stringified.
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| match value.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        match value {
            Value::Object(_) => Self {
                kind: field("type"),
                severity: field("severity"),
                location: field("location"),
                description: field("description"),
            },
            Value::String(s) => Self {
                description: s.clone(),
                ..Self::default()
            },
            other => Self {
                description: other.to_string(),
                ..Self::default()
            },
        }
    }
}

/// Result of evaluating one check item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// pass / fail / skip
    pub check_result: Verdict,

    /// Short verdict reason
    #[serde(default)]
    pub reason: String,

    /// Audit trail
    #[serde(default)]
    pub details: String,

    /// A prerequisite artifact was missing or unreadable
    #[serde(default, skip_serializing_if = "is_false")]
    pub dependency_failure: bool,

    /// Value recovered from malformed JSON through the judge
    #[serde(default, skip_serializing_if = "is_false")]
    pub semantic_fallback: bool,

    /// The target file did not parse as JSON
    #[serde(default, skip_serializing_if = "is_false")]
    pub json_parse_error: bool,

    /// Structured defects from the judge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flaws: Option<Vec<Flaw>>,

    /// Number of defects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flaw_count: Option<usize>,

    /// Deciding method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_method: Option<EvaluationMethod>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl CheckResult {
    fn with_verdict(verdict: Verdict, reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            check_result: verdict,
            reason: reason.into(),
            details: details.into(),
            dependency_failure: false,
            semantic_fallback: false,
            json_parse_error: false,
            flaws: None,
            flaw_count: None,
            evaluation_method: None,
        }
    }

    /// A passing result.
    pub fn pass(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self::with_verdict(Verdict::Pass, reason, details)
    }

    /// A failing result.
    pub fn fail(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self::with_verdict(Verdict::Fail, reason, details)
    }

    /// A not-applicable result.
    pub fn skip(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self::with_verdict(Verdict::Skip, reason, details)
    }

    /// Pass or fail depending on `ok`.
    pub fn from_bool(ok: bool, reason: impl Into<String>, details: impl Into<String>) -> Self {
        let verdict = if ok { Verdict::Pass } else { Verdict::Fail };
        Self::with_verdict(verdict, reason, details)
    }

    /// Skip caused by a missing or broken prerequisite.
    pub fn dependency_failure(reason: impl Into<String>, details: impl Into<String>) -> Self {
        let mut result = Self::skip(reason, details);
        result.dependency_failure = true;
        result
    }

    /// Record the deciding method.
    pub fn with_method(mut self, method: EvaluationMethod) -> Self {
        self.evaluation_method = Some(method);
        self
    }

    /// Mark as salvaged from malformed JSON.
    pub fn with_semantic_fallback(mut self) -> Self {
        self.semantic_fallback = true;
        self.json_parse_error = true;
        self.evaluation_method = Some(EvaluationMethod::SemanticExtraction);
        self
    }

    /// Attach judge flaws; `flaw_count` defaults to the list length.
    pub fn with_flaws(mut self, flaws: Vec<Flaw>, flaw_count: Option<usize>) -> Self {
        self.flaw_count = Some(flaw_count.unwrap_or(flaws.len()));
        self.flaws = Some(flaws);
        self
    }

    /// Whether the verdict is pass.
    pub fn passed(&self) -> bool {
        self.check_result == Verdict::Pass
    }
}

/// A check result together with the metadata of the item that produced it.
///
/// Unknown keys from older reports are kept in `extra` so a merged report
/// re-serializes untouched entries unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    /// The verdict
    #[serde(flatten)]
    pub result: CheckResult,

    /// Item description
    #[serde(default)]
    pub description: String,

    /// Item check type
    pub check_type: CheckType,

    /// Item dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_id: Option<Dimension>,

    /// Item subcategory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<String>,

    /// Item tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_tier: Option<QualityTier>,

    /// Item critical flag
    #[serde(default)]
    pub is_critical: bool,

    /// Keys this version does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CheckRecord {
    /// Combine a result with its item's metadata.
    pub fn new(item: &CheckItem, result: CheckResult) -> Self {
        Self {
            result,
            description: item.description.clone(),
            check_type: item.check_type.clone(),
            dimension_id: item.dimension_id.clone(),
            subcategory_id: item.subcategory_id.clone(),
            quality_tier: item.quality_tier,
            is_critical: item.is_critical,
            extra: Map::new(),
        }
    }

    /// Shortcut to the verdict.
    pub fn verdict(&self) -> Verdict {
        self.result.check_result
    }
}

/// Completion state of a grading run as written to reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    /// Every planned check ran
    #[default]
    Completed,
    /// The run was cancelled part way
    PartiallyCompleted,
}

/// Raw per-check output of a run, before scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Sample id
    #[serde(default)]
    pub sample_id: String,

    /// Unix seconds when checks were executed
    #[serde(default)]
    pub check_timestamp: i64,

    /// Results keyed by check id
    #[serde(default)]
    pub check_details: BTreeMap<CheckId, CheckRecord>,

    /// Run completion
    #[serde(default)]
    pub completion_status: CompletionStatus,
}
