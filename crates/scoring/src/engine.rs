//! Report assembly from raw results.

use quillgrade_core::{
    CheckId, CheckRecord, ContentQualityAggregate, Dimension, DimensionAggregate, DimensionScores,
    ExecutionResult, OverallResult, OverallStatus, QualityTier, Report, ScoreWeights,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::aggregate::{content_quality, round_to, tally};
use crate::completeness::output_completeness;
use crate::policy::ScoringPolicy;

/// Where a record lands in the aggregation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Process(Dimension),
    Gate,
    Basic,
    Advanced,
}

/// Turns raw results into a scored report.
///
/// Scoring reads nothing but its input, so scoring the same result twice
/// gives identical numbers.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    policy: ScoringPolicy,
}

impl ScoringEngine {
    /// Create an engine with the default policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy.
    pub fn with_policy(mut self, policy: ScoringPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The active policy.
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    fn bucket(&self, id: &CheckId, record: &CheckRecord) -> Option<Bucket> {
        let subcategory = record.subcategory_id.as_deref();
        if self.policy.is_display_only(subcategory) {
            debug!("{} is display-only", id);
            return None;
        }
        match record.dimension_id.as_ref()? {
            Dimension::ContentQuality if self.policy.is_gate(subcategory) => Some(Bucket::Gate),
            Dimension::ContentQuality => match record.quality_tier {
                Some(QualityTier::Basic) => Some(Bucket::Basic),
                Some(QualityTier::Advanced) => Some(Bucket::Advanced),
                _ => {
                    warn!("Content check {} has no tier, not scored", id);
                    None
                }
            },
            dim if dim.is_process() => Some(Bucket::Process(dim.clone())),
            other => {
                debug!("{} has unscored dimension {}", id, other.as_str());
                None
            }
        }
    }

    /// Aggregate per dimension and layer.
    pub fn dimension_scores(&self, details: &BTreeMap<CheckId, CheckRecord>) -> DimensionScores {
        let mut buckets: BTreeMap<Bucket, Vec<(&CheckId, &CheckRecord)>> = BTreeMap::new();
        for (id, record) in details {
            if let Some(bucket) = self.bucket(id, record) {
                buckets.entry(bucket).or_default().push((id, record));
            }
        }
        let mut take = |bucket: Bucket| tally(buckets.remove(&bucket).unwrap_or_default());
        let present = |agg: DimensionAggregate| (agg.total > 0).then_some(agg);

        let format_compliance = present(take(Bucket::Process(Dimension::FormatCompliance)));
        let business_rule_compliance = present(take(Bucket::Process(Dimension::BusinessRuleCompliance)));
        let memory_management = present(take(Bucket::Process(Dimension::MemoryManagement)));
        let content = content_quality(
            take(Bucket::Gate),
            take(Bucket::Basic),
            take(Bucket::Advanced),
            self.policy.advanced_excellent_rate,
        );
        let content_quality = (content.combined().0 > 0).then_some(content);

        DimensionScores {
            format_compliance,
            business_rule_compliance,
            memory_management,
            content_quality,
        }
    }

    /// Headline numbers from dimension scores.
    ///
    /// The total is `content * 0.7 + process * 0.3` (the policy weights) when
    /// both sides have evaluated items. When only one side does, it carries
    /// the whole total (weights 1.0 / 0.0) and the effective weights are
    /// reported in `weights`.
    pub fn overall(&self, scores: &DimensionScores) -> OverallResult {
        let process: Vec<&DimensionAggregate> = scores.process().collect();
        let process_score = if process.is_empty() {
            0.0
        } else {
            process.iter().map(|d| d.pass_rate * 100.0).sum::<f64>() / process.len() as f64
        };
        let content_score = scores
            .content_quality
            .as_ref()
            .map(|c| c.overall_score)
            .unwrap_or(0.0);

        let weights = match (scores.content_quality.is_some(), !process.is_empty()) {
            (true, false) => ScoreWeights { content: 1.0, process: 0.0 },
            (false, true) => ScoreWeights { content: 0.0, process: 1.0 },
            _ => ScoreWeights {
                content: self.policy.content_weight,
                process: self.policy.process_weight,
            },
        };
        let total_score = round_to(content_score * weights.content + process_score * weights.process, 2);

        let mut counts = process
            .iter()
            .fold((0, 0, 0, 0), |acc, d| (acc.0 + d.total, acc.1 + d.passed, acc.2 + d.failed, acc.3 + d.skipped));
        if let Some(content) = &scores.content_quality {
            let (total, passed, failed, skipped) = content.combined();
            counts = (counts.0 + total, counts.1 + passed, counts.2 + failed, counts.3 + skipped);
        }
        let (total_checks, passed_checks, failed_checks, skipped_checks) = counts;

        OverallResult {
            status: self.status(total_score),
            total_score,
            content_score,
            process_score: round_to(process_score, 2),
            weights,
            gate_triggered: scores
                .content_quality
                .as_ref()
                .is_some_and(|c: &ContentQualityAggregate| c.gate_triggered),
            total_checks,
            passed_checks,
            failed_checks,
            skipped_checks,
            pass_rate: if total_checks > 0 {
                round_to(passed_checks as f64 / total_checks as f64, 3)
            } else {
                0.0
            },
        }
    }

    /// Status band of a total score.
    pub fn status(&self, total_score: f64) -> OverallStatus {
        let p = &self.policy;
        if total_score >= p.excellent_threshold {
            OverallStatus::Excellent
        } else if total_score >= p.good_threshold {
            OverallStatus::Good
        } else if total_score >= p.fair_threshold {
            OverallStatus::Fair
        } else {
            OverallStatus::Poor
        }
    }

    /// Score a raw result set into a report.
    pub fn score(&self, result: &ExecutionResult) -> Report {
        let dimension_scores = self.dimension_scores(&result.check_details);
        let overall_result = self.overall(&dimension_scores);
        info!(
            "Scored {}: {:?} total={} content={} process={}",
            result.sample_id,
            overall_result.status,
            overall_result.total_score,
            overall_result.content_score,
            overall_result.process_score
        );
        Report {
            check_version: self.policy.check_version.clone(),
            sample_id: result.sample_id.clone(),
            check_timestamp: result.check_timestamp,
            dimension_scores,
            overall_result,
            output_completeness: output_completeness(&result.check_details),
            check_details: result.check_details.clone(),
            completion_status: result.completion_status,
        }
    }

    /// Re-score an existing report's raw records, keeping its timestamp.
    pub fn rescore(&self, report: &Report) -> Report {
        self.score(&ExecutionResult {
            sample_id: report.sample_id.clone(),
            check_timestamp: report.check_timestamp,
            check_details: report.check_details.clone(),
            completion_status: report.completion_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillgrade_core::{CheckItem, CheckResult, CheckType, QualityLevel, Verdict};
    use serde_json::json;

    fn record(dim: Dimension, subcategory: &str, tier: Option<QualityTier>, verdict: Verdict) -> CheckRecord {
        let item = CheckItem::new(CheckType::SemanticCheck, json!({})).with_dimension(dim, subcategory, tier);
        let result = match verdict {
            Verdict::Pass => CheckResult::pass("", ""),
            Verdict::Fail => CheckResult::fail("", ""),
            Verdict::Skip => CheckResult::skip("", ""),
        };
        CheckRecord::new(&item, result)
    }

    /// Gate 4/4 pass, basic 2 of 10 fail, advanced 3 of 5 pass, plus process checks.
    fn sample() -> ExecutionResult {
        let mut details = BTreeMap::new();
        let mut add = |key: String, record: CheckRecord| {
            details.insert(CheckId::new(key), record);
        };
        for (n, gate) in ["chapter_output_existence", "chapter_cloning", "alternating_repetition", "chapter_completion"]
            .iter()
            .enumerate()
        {
            add(format!("gate_{n}"), record(Dimension::ContentQuality, gate, Some(QualityTier::Basic), Verdict::Pass));
        }
        for n in 0..10 {
            let verdict = if n < 2 { Verdict::Fail } else { Verdict::Pass };
            add(format!("basic_{n}"), record(Dimension::ContentQuality, "plot", Some(QualityTier::Basic), verdict));
        }
        for n in 0..5 {
            let verdict = if n < 3 { Verdict::Pass } else { Verdict::Fail };
            add(format!("adv_{n}"), record(Dimension::ContentQuality, "style", Some(QualityTier::Advanced), verdict));
        }
        add("fmt_1".into(), record(Dimension::FormatCompliance, "json", None, Verdict::Pass));
        add("fmt_2".into(), record(Dimension::FormatCompliance, "json", None, Verdict::Fail));
        add("fmt_3".into(), record(Dimension::FormatCompliance, "json", None, Verdict::Skip));
        add("mem_1".into(), record(Dimension::MemoryManagement, "reads", None, Verdict::Pass));
        add("naming".into(), record(Dimension::ContentQuality, "character_naming_quality", Some(QualityTier::Basic), Verdict::Fail));
        add("untiered".into(), record(Dimension::ContentQuality, "misc", None, Verdict::Fail));
        ExecutionResult {
            sample_id: "s".into(),
            check_timestamp: 42,
            check_details: details,
            ..ExecutionResult::default()
        }
    }

    #[test]
    fn test_content_formula_and_total() {
        let report = ScoringEngine::new().score(&sample());
        let content = report.dimension_scores.content_quality.as_ref().unwrap();
        assert_eq!(content.overall_score, 72.0);
        // Any basic failure makes the content unqualified, whatever the score.
        assert_eq!(content.quality_level, QualityLevel::Unqualified);
        assert_eq!(content.gate_layer.total, 4);
        assert_eq!(content.basic_layer.total, 10);

        // process = mean(50, 100) = 75; total = 72*0.7 + 75*0.3
        let overall = &report.overall_result;
        assert_eq!(overall.process_score, 75.0);
        assert_eq!(overall.total_score, 72.9);
        assert_eq!(overall.status, OverallStatus::Good);
        assert_eq!(overall.total_checks, 4 + 10 + 5 + 2 + 1);
        assert_eq!(overall.skipped_checks, 1);
        assert!(report.dimension_scores.business_rule_compliance.is_none());
        assert!(report.check_details.contains_key("naming"));
        assert_eq!(report.check_timestamp, 42);
    }

    #[test]
    fn test_pass_and_fail_sum_to_total() {
        let scores = ScoringEngine::new().dimension_scores(&sample().check_details);
        for dim in scores.process() {
            assert_eq!(dim.passed + dim.failed, dim.total);
        }
        let content = scores.content_quality.unwrap();
        for layer in [&content.gate_layer, &content.basic_layer, &content.advanced_layer] {
            assert_eq!(layer.passed + layer.failed, layer.total);
        }
    }

    #[test]
    fn test_rescore_is_idempotent() {
        let engine = ScoringEngine::new();
        let first = engine.score(&sample());
        let second = engine.rescore(&first);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_single_side_weights() {
        let mut only_process = BTreeMap::new();
        only_process.insert(CheckId::from("a"), record(Dimension::BusinessRuleCompliance, "x", None, Verdict::Pass));
        let report = ScoringEngine::new().score(&ExecutionResult {
            check_details: only_process,
            ..ExecutionResult::default()
        });
        assert_eq!(report.overall_result.weights, ScoreWeights { content: 0.0, process: 1.0 });
        assert_eq!(report.overall_result.total_score, 100.0);
        assert_eq!(report.overall_result.status, OverallStatus::Excellent);
    }

    #[test]
    fn test_gate_tag_overrides_declared_tier() {
        let mut details = BTreeMap::new();
        details.insert(
            CheckId::from("clone"),
            record(Dimension::ContentQuality, "chapter_cloning", Some(QualityTier::Advanced), Verdict::Fail),
        );
        let scores = ScoringEngine::new().dimension_scores(&details);
        let content = scores.content_quality.unwrap();
        assert_eq!(content.gate_layer.failed, 1);
        assert_eq!(content.advanced_layer.total, 0);
        assert_eq!(content.quality_level, QualityLevel::GateFailed);
        assert_eq!(content.overall_score, 40.0);
    }

    #[test]
    fn test_status_bands() {
        let engine = ScoringEngine::new();
        assert_eq!(engine.status(90.0), OverallStatus::Excellent);
        assert_eq!(engine.status(89.99), OverallStatus::Good);
        assert_eq!(engine.status(50.0), OverallStatus::Fair);
        assert_eq!(engine.status(49.9), OverallStatus::Poor);
    }
}
