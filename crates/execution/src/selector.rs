//! Run modes and check selection.

use quillgrade_core::{CheckItem, Checklist, ExecutionResult};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::{ExecutionError, Result};

/// Which checklist items a run evaluates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Every item; prior results are not consulted.
    Full,
    /// Items whose id is absent from the prior result; existing entries are kept.
    IncrementalAdd,
    /// Exactly the selected items; their results overwrite prior entries.
    Targeted(Vec<String>),
}

impl RunMode {
    /// Whether fresh results replace same-id prior entries.
    pub fn overwrites(&self) -> bool {
        matches!(self, Self::Targeted(_))
    }

    /// Whether the prior result set is read at all.
    pub fn uses_prior(&self) -> bool {
        !matches!(self, Self::Full)
    }
}

/// A single `--only-checks` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Id(String),
    Position(usize),
}

impl Selector {
    /// Parse one entry: a bare integer, `check_N`, the legacy `检查项N`, or an id.
    fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ExecutionError::InvalidSelection("empty check selector".into()));
        }
        let numeric = raw
            .strip_prefix("check_")
            .or_else(|| raw.strip_prefix("检查项"))
            .unwrap_or(raw);
        match numeric.parse::<usize>() {
            Ok(0) => Err(ExecutionError::InvalidSelection(format!(
                "check positions start at 1: {raw}"
            ))),
            Ok(position) => Ok(Self::Position(position)),
            Err(_) => Ok(Self::Id(raw.to_string())),
        }
    }

    fn matches(&self, item: &CheckItem) -> bool {
        match self {
            Self::Id(id) => item.id().as_str() == id,
            Self::Position(position) => item.position() == *position || item.id().as_str() == format!("检查项{position}"),
        }
    }
}

/// Items a run evaluates, in checklist order.
///
/// A checklist whose items collide on an id is rejected, since the colliding
/// results would overwrite each other.
pub fn select<'a>(
    checklist: &'a Checklist,
    mode: &RunMode,
    prior: Option<&ExecutionResult>,
) -> Result<Vec<&'a CheckItem>> {
    if let Some((id, first, second)) = checklist.first_duplicate() {
        return Err(ExecutionError::DuplicateId {
            id: id.to_string(),
            first,
            second,
        });
    }
    let items = checklist.items();
    match mode {
        RunMode::Full => Ok(items.iter().collect()),
        RunMode::IncrementalAdd => {
            let Some(prior) = prior else {
                return Ok(items.iter().collect());
            };
            let planned: Vec<&CheckItem> = items
                .iter()
                .filter(|item| !prior.check_details.contains_key(item.id()))
                .collect();
            debug!(
                "{} of {} items already graded",
                items.len() - planned.len(),
                items.len()
            );
            Ok(planned)
        }
        RunMode::Targeted(raw) => {
            let selectors = raw
                .iter()
                .map(|s| Selector::parse(s))
                .collect::<Result<Vec<_>>>()?;
            let mut unmatched: BTreeSet<&str> = raw.iter().map(|s| s.trim()).collect();
            let planned: Vec<&CheckItem> = items
                .iter()
                .filter(|item| {
                    let hits: Vec<usize> = selectors
                        .iter()
                        .enumerate()
                        .filter(|(_, sel)| sel.matches(item))
                        .map(|(idx, _)| idx)
                        .collect();
                    for idx in &hits {
                        unmatched.remove(raw[*idx].trim());
                    }
                    !hits.is_empty()
                })
                .collect();
            if !unmatched.is_empty() {
                warn!(
                    "Selected checks not in the checklist: {}",
                    unmatched.into_iter().collect::<Vec<_>>().join(", ")
                );
            }
            Ok(planned)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillgrade_core::{CheckId, CheckRecord, CheckResult, CheckType};
    use serde_json::json;

    fn checklist() -> Checklist {
        Checklist::new(
            "sample",
            vec![
                CheckItem::new(CheckType::JsonSchema, json!({})).with_id("大纲结构"),
                CheckItem::new(CheckType::SemanticCheck, json!({})),
                CheckItem::new(CheckType::SemanticCheck, json!({})).with_id("章节克隆检测"),
            ],
        )
    }

    fn ids(items: &[&CheckItem]) -> Vec<String> {
        items.iter().map(|i| i.id().to_string()).collect()
    }

    #[test]
    fn test_targeted_accepts_every_spelling() {
        let list = checklist();
        for selector in ["2", "check_2", "检查项2"] {
            let mode = RunMode::Targeted(vec![selector.into()]);
            assert_eq!(ids(&select(&list, &mode, None).unwrap()), vec!["check_2"]);
        }
        let mode = RunMode::Targeted(vec!["章节克隆检测".into(), "missing".into()]);
        assert_eq!(ids(&select(&list, &mode, None).unwrap()), vec!["章节克隆检测"]);
    }

    #[test]
    fn test_invalid_selectors() {
        let list = checklist();
        assert!(select(&list, &RunMode::Targeted(vec!["0".into()]), None).is_err());
        assert!(select(&list, &RunMode::Targeted(vec![" ".into()]), None).is_err());
        assert!(select(&list, &RunMode::Targeted(vec![]), None).unwrap().is_empty());
    }

    #[test]
    fn test_incremental_skips_graded_ids() {
        let list = checklist();
        let mut prior = ExecutionResult::default();
        let item = &list.items()[0];
        prior
            .check_details
            .insert(CheckId::from("大纲结构"), CheckRecord::new(item, CheckResult::pass("", "")));
        let planned = select(&list, &RunMode::IncrementalAdd, Some(&prior)).unwrap();
        assert_eq!(ids(&planned), vec!["check_2", "章节克隆检测"]);
        assert_eq!(select(&list, &RunMode::IncrementalAdd, None).unwrap().len(), 3);
    }

    #[test]
    fn test_colliding_ids_are_rejected() {
        let repeated = Checklist::new(
            "s",
            vec![
                CheckItem::new(CheckType::JsonSchema, json!({})).with_id("dup"),
                CheckItem::new(CheckType::JsonSchema, json!({})).with_id("dup"),
            ],
        );
        let positional = Checklist::new(
            "s",
            vec![
                CheckItem::new(CheckType::JsonSchema, json!({})).with_id("dup"),
                CheckItem::new(CheckType::JsonSchema, json!({})),
                CheckItem::new(CheckType::JsonSchema, json!({})).with_id("check_2"),
            ],
        );
        for (list, shared) in [(&repeated, "dup"), (&positional, "check_2")] {
            match select(list, &RunMode::Full, None) {
                Err(ExecutionError::DuplicateId { id, .. }) => assert_eq!(id, shared),
                other => panic!("expected a duplicate id error, got {other:?}"),
            }
        }
    }
}
