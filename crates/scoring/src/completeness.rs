//! Deliverable summary: did the agent produce what was asked for.

use quillgrade_core::{
    CheckId, CheckRecord, CheckType, CompletenessItem, EvaluationMethod, OutputCompleteness,
    Verdict,
};
use std::collections::BTreeMap;

use crate::aggregate::round_to;

const DELIVERABLE_SUBCATEGORIES: &[&str] = &["output_completeness", "range_constraint"];

fn is_deliverable(record: &CheckRecord) -> bool {
    matches!(
        record.result.evaluation_method,
        Some(EvaluationMethod::WordCount | EvaluationMethod::Existence)
    ) || record.check_type == CheckType::CreateOperationVerified
        || record
            .subcategory_id
            .as_deref()
            .is_some_and(|s| DELIVERABLE_SUBCATEGORIES.contains(&s))
}

/// Summarize deliverable checks: character counts, existence probes,
/// create checks and the completeness subcategories.
pub fn output_completeness(details: &BTreeMap<CheckId, CheckRecord>) -> OutputCompleteness {
    let relevant: Vec<(&CheckId, &CheckRecord)> =
        details.iter().filter(|(_, r)| is_deliverable(r)).collect();

    let count = |verdict: Verdict| relevant.iter().filter(|(_, r)| r.verdict() == verdict).count();
    let (passed, failed, skipped) = (count(Verdict::Pass), count(Verdict::Fail), count(Verdict::Skip));
    let effective = relevant.len() - skipped;
    let pass_rate = if effective > 0 {
        passed as f64 / effective as f64
    } else {
        0.0
    };

    let summary = |id: &CheckId, record: &CheckRecord, full: bool| CompletenessItem {
        check_id: id.clone(),
        description: record.description.clone(),
        result: record.verdict(),
        reason: full.then(|| record.result.reason.clone()),
        details: full.then(|| record.result.details.clone()),
    };

    OutputCompleteness {
        score: round_to(pass_rate * 100.0, 2),
        pass_rate: round_to(pass_rate, 3),
        total: relevant.len(),
        passed,
        failed,
        skipped,
        critical_items: relevant
            .iter()
            .filter(|(_, r)| r.is_critical)
            .map(|(id, r)| summary(*id, *r, true))
            .collect(),
        all_items: relevant.iter().map(|(id, r)| summary(*id, *r, false)).collect(),
    }
}
