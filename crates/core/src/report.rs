//! Scored report model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::id::CheckId;
use crate::record::{CheckRecord, CompletionStatus, Verdict};

/// Pass/fail/skip counts of a group of checks.
///
/// Skipped checks never count toward `total`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionAggregate {
    /// passed + failed
    pub total: usize,
    /// Passing checks
    pub passed: usize,
    /// Failing checks
    pub failed: usize,
    /// Not applicable checks
    pub skipped: usize,
    /// passed / total, 0 when total is 0
    pub pass_rate: f64,
    /// Ids of failing checks
    pub failed_items: Vec<CheckId>,
}

/// Contributions to the content score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Starting score
    pub base: f64,
    /// Subtracted for gate failures
    pub gate_penalty: f64,
    /// Subtracted for basic failures
    pub basic_deduction: f64,
    /// Added for advanced passes
    pub advanced_bonus: f64,
    /// Score before clamping
    pub raw_score: f64,
}

/// Grade of the content-quality dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    /// A gate check failed
    GateFailed,
    /// A basic check failed
    Unqualified,
    /// Basics hold, advanced below threshold
    Qualified,
    /// Basics hold, advanced at or above threshold
    Excellent,
}

/// Content-quality dimension, split into gate, basic and advanced layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentQualityAggregate {
    /// Clamped 0..=100 score
    pub overall_score: f64,
    /// Grade
    pub quality_level: QualityLevel,
    /// Whether any gate check failed
    pub gate_triggered: bool,
    /// Gate layer
    pub gate_layer: DimensionAggregate,
    /// Basic layer
    pub basic_layer: DimensionAggregate,
    /// Advanced layer
    pub advanced_layer: DimensionAggregate,
    /// Formula terms
    pub score_breakdown: ScoreBreakdown,
}

impl ContentQualityAggregate {
    /// Sum of the three layers.
    pub fn combined(&self) -> (usize, usize, usize, usize) {
        [&self.gate_layer, &self.basic_layer, &self.advanced_layer]
            .iter()
            .fold((0, 0, 0, 0), |acc, layer| {
                (
                    acc.0 + layer.total,
                    acc.1 + layer.passed,
                    acc.2 + layer.failed,
                    acc.3 + layer.skipped,
                )
            })
    }
}

/// Per-dimension scores. Dimensions without evaluated checks are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    /// Format compliance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_compliance: Option<DimensionAggregate>,
    /// Business rule compliance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_rule_compliance: Option<DimensionAggregate>,
    /// Memory management
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_management: Option<DimensionAggregate>,
    /// Content quality
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_quality: Option<ContentQualityAggregate>,
}

impl DimensionScores {
    /// The process dimensions that are present.
    pub fn process(&self) -> impl Iterator<Item = &DimensionAggregate> {
        [
            self.format_compliance.as_ref(),
            self.business_rule_compliance.as_ref(),
            self.memory_management.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Weights applied to the content and process scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Weight of the content score
    pub content: f64,
    /// Weight of the process score
    pub process: f64,
}

/// Threshold-based overall status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    /// total >= 90
    Excellent,
    /// total >= 70
    Good,
    /// total >= 50
    Fair,
    /// below 50
    Poor,
}

/// Headline numbers of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallResult {
    /// Status band
    pub status: OverallStatus,
    /// Weighted total
    pub total_score: f64,
    /// Content-quality score
    pub content_score: f64,
    /// Mean process pass rate x 100
    pub process_score: f64,
    /// Effective weights
    pub weights: ScoreWeights,
    /// Whether a gate check failed
    pub gate_triggered: bool,
    /// Evaluated checks (pass + fail)
    pub total_checks: usize,
    /// Passing checks
    pub passed_checks: usize,
    /// Failing checks
    pub failed_checks: usize,
    /// Skipped checks
    pub skipped_checks: usize,
    /// passed / total
    pub pass_rate: f64,
}

/// Summary line of a deliverable check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessItem {
    /// Check id
    pub check_id: CheckId,
    /// Description
    pub description: String,
    /// Verdict
    pub result: Verdict,
    /// Reason, for critical items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Details, for critical items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// How completely the agent delivered the requested artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputCompleteness {
    /// pass_rate x 100
    pub score: f64,
    /// passed / (total - skipped)
    pub pass_rate: f64,
    /// Relevant checks, skipped included
    pub total: usize,
    /// Passing
    pub passed: usize,
    /// Failing
    pub failed: usize,
    /// Skipped
    pub skipped: usize,
    /// Critical deliverable checks with their reasons
    pub critical_items: Vec<CompletenessItem>,
    /// Every deliverable check
    pub all_items: Vec<CompletenessItem>,
}

/// Final scored report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Scoring scheme version
    pub check_version: String,
    /// Sample id
    pub sample_id: String,
    /// Unix seconds of check execution
    pub check_timestamp: i64,
    /// Per-dimension scores
    pub dimension_scores: DimensionScores,
    /// Headline numbers
    pub overall_result: OverallResult,
    /// Deliverable summary
    pub output_completeness: OutputCompleteness,
    /// Raw per-check records
    pub check_details: BTreeMap<CheckId, CheckRecord>,
    /// Run completion
    pub completion_status: CompletionStatus,
}
