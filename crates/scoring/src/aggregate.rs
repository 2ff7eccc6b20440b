//! Pass-rate tallies and the content-quality formula.

use quillgrade_core::{
    CheckId, CheckRecord, ContentQualityAggregate, DimensionAggregate, QualityLevel,
    ScoreBreakdown, Verdict,
};

const CONTENT_BASE: f64 = 60.0;
const GATE_PENALTY: f64 = 20.0;
const BASIC_POOL: f64 = 60.0;
const ADVANCED_POOL: f64 = 40.0;

/// Round to `digits` decimals.
pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Count verdicts of a group. Skipped records never reach `total`.
pub fn tally<'a>(records: impl IntoIterator<Item = (&'a CheckId, &'a CheckRecord)>) -> DimensionAggregate {
    let mut agg = DimensionAggregate::default();
    for (id, record) in records {
        match record.verdict() {
            Verdict::Pass => agg.passed += 1,
            Verdict::Fail => {
                agg.failed += 1;
                agg.failed_items.push(id.clone());
            }
            Verdict::Skip => agg.skipped += 1,
        }
    }
    agg.total = agg.passed + agg.failed;
    agg.pass_rate = if agg.total > 0 {
        round_to(agg.passed as f64 / agg.total as f64, 3)
    } else {
        0.0
    };
    agg
}

/// Score the content layers with the base-60 model.
///
/// ```text
/// 60 - gate_fail*20 - basic_fail*(60/basic_total) + advanced_pass*(40/advanced_total)
/// ```
/// clamped to 0..=100.
pub fn content_quality(
    gate: DimensionAggregate,
    basic: DimensionAggregate,
    advanced: DimensionAggregate,
    advanced_excellent_rate: f64,
) -> ContentQualityAggregate {
    let share = |pool: f64, count: usize, total: usize| {
        if total > 0 {
            count as f64 * pool / total as f64
        } else {
            0.0
        }
    };
    let gate_penalty = gate.failed as f64 * GATE_PENALTY;
    let basic_deduction = share(BASIC_POOL, basic.failed, basic.total);
    let advanced_bonus = share(ADVANCED_POOL, advanced.passed, advanced.total);
    let raw_score = CONTENT_BASE - gate_penalty - basic_deduction + advanced_bonus;

    let gate_triggered = gate.failed > 0;
    let advanced_rate = if advanced.total > 0 {
        advanced.passed as f64 / advanced.total as f64
    } else {
        0.0
    };
    let quality_level = if gate_triggered {
        QualityLevel::GateFailed
    } else if basic.failed > 0 {
        QualityLevel::Unqualified
    } else if advanced.total == 0 || advanced_rate < advanced_excellent_rate {
        QualityLevel::Qualified
    } else {
        QualityLevel::Excellent
    };

    ContentQualityAggregate {
        overall_score: round_to(raw_score.clamp(0.0, 100.0), 2),
        quality_level,
        gate_triggered,
        gate_layer: gate,
        basic_layer: basic,
        advanced_layer: advanced,
        score_breakdown: ScoreBreakdown {
            base: CONTENT_BASE,
            gate_penalty: round_to(gate_penalty, 2),
            basic_deduction: round_to(basic_deduction, 2),
            advanced_bonus: round_to(advanced_bonus, 2),
            raw_score: round_to(raw_score, 2),
        },
    }
}
