//! Expected-value constraints of attribute checks.
//!
//! A checklist writes a constraint either as a literal (compared for
//! equality) or as an object of predicates:
//!
//! ```json
//! {"array_min_length": 3, "array_item_type": "object"}
//! {"regex": "^ch_\\d+\\.md$"}
//! {"min": 1, "max": 10}
//! {"contains_value": "villain", "min_count": 2}
//! ```
//!
//! `regex` stands alone and ignores every other key. The remaining
//! predicates are ANDed. Unknown keys are ignored.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;

use crate::engine::{CheckError, Result};
use crate::field::{is_placeholder, values_equal};
use crate::params::CountParam;

/// Element type demanded by `array_item_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    /// `dict` / `object`
    Object,
    /// `str` / `string`
    String,
    /// `int` / `integer`
    Integer,
    /// `float` / `number`
    Number,
    /// Anything else; matches nothing
    Unknown(String),
}

impl ItemType {
    fn parse(name: &str) -> Self {
        match name {
            "dict" | "object" => Self::Object,
            "str" | "string" => Self::String,
            "int" | "integer" => Self::Integer,
            "float" | "number" => Self::Number,
            other => Self::Unknown(other.to_string()),
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Unknown(_) => false,
        }
    }
}

/// One composable predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Numeric value within `min..=max`
    Range {
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
    /// Array containing `value` at least `min_count` times
    ContainsValue {
        /// Searched element
        value: Value,
        /// Minimum occurrences
        min_count: usize,
    },
    /// Array with at least this many elements
    ArrayMinLength(usize),
    /// Array with at most this many elements
    ArrayMaxLength(usize),
    /// Array whose every element has this type
    ArrayItemType(ItemType),
    /// Value (or every array element) among these
    OneOf(Vec<Value>),
}

impl Predicate {
    fn holds(&self, actual: &Value) -> bool {
        match self {
            Self::Range { min, max } => actual
                .as_f64()
                .is_some_and(|n| *min <= n && n <= *max),
            Self::ContainsValue { value, min_count } => actual.as_array().is_some_and(|items| {
                items.iter().filter(|item| values_equal(item, value)).count() >= *min_count
            }),
            Self::ArrayMinLength(n) => actual.as_array().is_some_and(|a| a.len() >= *n),
            Self::ArrayMaxLength(n) => actual.as_array().is_some_and(|a| a.len() <= *n),
            Self::ArrayItemType(kind) => actual
                .as_array()
                .is_some_and(|items| items.iter().all(|item| kind.accepts(item))),
            Self::OneOf(allowed) => {
                let member = |v: &Value| allowed.iter().any(|a| values_equal(a, v));
                match actual {
                    Value::Array(items) => items.iter().all(member),
                    single => member(single),
                }
            }
        }
    }
}

/// An expected-value constraint.
#[derive(Debug, Clone)]
pub enum Constraint {
    /// Literal equality
    Exact(Value),
    /// String matching a pattern at its start
    Regex(Regex),
    /// Conjunction of predicates (empty means always true)
    All(Vec<Predicate>),
}

impl Constraint {
    /// Build a constraint from the checklist's `expected_value`.
    pub fn parse(expected: &Value) -> Result<Self> {
        let Value::Object(spec) = expected else {
            return Ok(Self::Exact(expected.clone()));
        };

        if let Some(pattern) = spec.get("regex") {
            let pattern = pattern
                .as_str()
                .ok_or_else(|| CheckError::InvalidParams("`regex` must be a string".into()))?;
            return Regex::new(&format!("^(?:{pattern})"))
                .map(Self::Regex)
                .map_err(|e| CheckError::Pattern(format!("{pattern}: {e}")));
        }

        Ok(Self::All(predicates(spec)?))
    }

    /// Whether a (possibly missing) value satisfies the constraint.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let actual = actual.unwrap_or(&Value::Null);
        match self {
            Self::Exact(expected) => values_equal(actual, expected),
            Self::Regex(re) => actual.as_str().is_some_and(|s| re.is_match(s)),
            Self::All(predicates) => predicates.iter().all(|p| p.holds(actual)),
        }
    }
}

fn predicates(spec: &Map<String, Value>) -> Result<Vec<Predicate>> {
    let mut out = Vec::new();
    let length = |key: &str| -> Result<Option<usize>> {
        match spec.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or_else(|| CheckError::InvalidParams(format!("`{key}` must be a non-negative integer"))),
        }
    };

    if let (Some(min), Some(max)) = (spec.get("min"), spec.get("max")) {
        match (min.as_f64(), max.as_f64()) {
            (Some(min), Some(max)) => out.push(Predicate::Range { min, max }),
            _ => return Err(CheckError::InvalidParams("`min`/`max` must be numbers".into())),
        }
    }

    if let Some(value) = spec.get("contains_value") {
        let min_count = match spec.get("min_count").map(CountParam::parse) {
            None => Some(1),
            Some(Some(CountParam::Fixed(n))) => Some(n),
            Some(Some(CountParam::Unresolved(_))) => None,
            Some(None) => return Err(CheckError::InvalidParams("`min_count` is not a count".into())),
        };
        match min_count {
            Some(min_count) => out.push(Predicate::ContainsValue {
                value: value.clone(),
                min_count,
            }),
            // Unfilled placeholder: still require an array.
            None => out.push(Predicate::ArrayMinLength(0)),
        }
    }

    if let Some(n) = length("array_min_length")? {
        out.push(Predicate::ArrayMinLength(n));
    }
    if let Some(n) = length("array_max_length")? {
        out.push(Predicate::ArrayMaxLength(n));
    }
    if let Some(kind) = spec.get("array_item_type") {
        out.push(Predicate::ArrayItemType(ItemType::parse(kind.as_str().unwrap_or_default())));
    }
    if let Some(allowed) = spec.get("enum").filter(|v| !is_placeholder(v)) {
        if let Value::Array(values) = allowed {
            out.push(Predicate::OneOf(values.clone()));
        }
    }
    Ok(out)
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(value) => write!(f, "{value}"),
            Self::Regex(re) => write!(f, "regex {}", re.as_str()),
            Self::All(predicates) => write!(f, "{predicates:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(expected: Value, actual: Value) -> bool {
        Constraint::parse(&expected).unwrap().matches(Some(&actual))
    }

    #[test]
    fn test_exact_and_missing() {
        assert!(check(json!("completed"), json!("completed")));
        assert!(check(json!(5), json!(5.0)));
        assert!(!Constraint::parse(&json!("x")).unwrap().matches(None));
    }

    #[test]
    fn test_regex_is_exclusive_and_anchored_at_start() {
        // min/max would fail for a string, but regex ignores the other keys
        assert!(check(json!({"regex": "ch_\\d+", "min": 1, "max": 2}), json!("ch_12.md")));
        assert!(!check(json!({"regex": "ch_\\d+"}), json!("draft_ch_1")));
        assert!(!check(json!({"regex": "ch"}), json!(3)));
        assert!(matches!(
            Constraint::parse(&json!({"regex": "("})),
            Err(CheckError::Pattern(_))
        ));
    }

    #[test]
    fn test_array_predicates_compose() {
        let expected = json!({"array_min_length": 2, "array_max_length": 3, "array_item_type": "object"});
        assert!(check(expected.clone(), json!([{}, {}])));
        assert!(!check(expected.clone(), json!([{}])));
        assert!(!check(expected.clone(), json!([{}, "x"])));
        assert!(!check(expected, json!({"not": "array"})));
    }

    #[test]
    fn test_range_contains_and_enum() {
        assert!(check(json!({"min": 1, "max": 10}), json!(7)));
        assert!(!check(json!({"min": 1, "max": 10}), json!("7")));
        assert!(check(json!({"contains_value": "hero", "min_count": 2}), json!(["hero", "x", "hero"])));
        assert!(!check(json!({"contains_value": "hero", "min_count": 2}), json!(["hero"])));
        assert!(check(json!({"contains_value": "hero", "min_count": "{{n}}"}), json!([])));
        assert!(check(json!({"enum": ["a", "b"], "array_item_type": "string"}), json!(["a", "b", "a"])));
        assert!(!check(json!({"enum": ["a", "b"]}), json!("c")));
        assert!(check(json!({"enum": "{{genres}}"}), json!("anything")));
    }
}
