//! Scoring policy knobs.

/// Tunable parts of scoring. The defaults are the published scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    /// Content subcategories scored in the gate layer whatever their tier
    pub gate_subcategories: Vec<String>,
    /// Subcategories recorded in reports but left out of every aggregate
    pub display_only_subcategories: Vec<String>,
    /// Weight of the content score when both sides are present
    pub content_weight: f64,
    /// Weight of the process score when both sides are present
    pub process_weight: f64,
    /// Minimum total for `Excellent`
    pub excellent_threshold: f64,
    /// Minimum total for `Good`
    pub good_threshold: f64,
    /// Minimum total for `Fair`
    pub fair_threshold: f64,
    /// Advanced pass rate needed for `excellent` content
    pub advanced_excellent_rate: f64,
    /// Version label written to reports
    pub check_version: String,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            gate_subcategories: [
                "chapter_output_existence",
                "chapter_cloning",
                "alternating_repetition",
                "chapter_completion",
            ]
            .map(String::from)
            .to_vec(),
            display_only_subcategories: vec!["character_naming_quality".to_string()],
            content_weight: 0.7,
            process_weight: 0.3,
            excellent_threshold: 90.0,
            good_threshold: 70.0,
            fair_threshold: 50.0,
            advanced_excellent_rate: 0.7,
            check_version: "novel_writing_v1.0".to_string(),
        }
    }
}

impl ScoringPolicy {
    /// Whether a subcategory belongs to the gate layer.
    pub fn is_gate(&self, subcategory: Option<&str>) -> bool {
        subcategory.is_some_and(|s| self.gate_subcategories.iter().any(|g| g == s))
    }

    /// Whether a subcategory is excluded from aggregates.
    pub fn is_display_only(&self, subcategory: Option<&str>) -> bool {
        subcategory.is_some_and(|s| self.display_only_subcategories.iter().any(|d| d == s))
    }
}
