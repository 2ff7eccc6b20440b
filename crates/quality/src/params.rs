//! Typed access to an item's free-form `params` map.

use quillgrade_core::CheckItem;
use serde_json::{Map, Value};

use crate::engine::{CheckError, Result};
use crate::field::is_placeholder;

/// A count parameter as written in a checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountParam {
    /// A concrete number
    Fixed(usize),
    /// `{{…}}` or `dynamic`, left for the sample generator to fill
    Unresolved(String),
}

impl CountParam {
    /// Read a count from a number, a numeric string or a placeholder.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
                .map(|n| Self::Fixed(n as usize)),
            Value::String(s) if is_placeholder(value) || s.trim() == "dynamic" => {
                Some(Self::Unresolved(s.clone()))
            }
            Value::String(s) => s.trim().parse().ok().map(Self::Fixed),
            _ => None,
        }
    }
}

/// Borrowed view of an item's parameters.
#[derive(Clone, Copy)]
pub struct Params<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    /// View the parameters of `item`.
    pub fn of(item: &'a CheckItem) -> Self {
        Self { map: &item.params }
    }

    /// Raw value.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).filter(|v| !v.is_null())
    }

    /// Non-empty string value.
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Required non-empty string value.
    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)
            .ok_or_else(|| CheckError::InvalidParams(format!("`{key}` is required")))
    }

    /// Boolean flag, false unless literally `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// List of strings; a single string counts as a one-element list.
    pub fn strings(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    /// Count parameter, `None` when absent.
    pub fn count(&self, key: &str) -> Result<Option<CountParam>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => CountParam::parse(value)
                .map(Some)
                .ok_or_else(|| CheckError::InvalidParams(format!("`{key}` is not a count: {value}"))),
        }
    }

    /// First entry of `validation_rules`.
    pub fn first_rule(&self) -> Option<&'a Map<String, Value>> {
        self.get("validation_rules")?
            .as_array()?
            .first()?
            .as_object()
    }

    /// `validation_method` of the first validation rule.
    pub fn validation_method(&self) -> Option<&'a str> {
        self.first_rule()?.get("validation_method")?.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillgrade_core::CheckType;
    use serde_json::json;

    #[test]
    fn test_count_forms() {
        assert_eq!(CountParam::parse(&json!(4)), Some(CountParam::Fixed(4)));
        assert_eq!(CountParam::parse(&json!("12")), Some(CountParam::Fixed(12)));
        assert_eq!(
            CountParam::parse(&json!("{{chapter_count}}")),
            Some(CountParam::Unresolved("{{chapter_count}}".into()))
        );
        assert!(matches!(CountParam::parse(&json!("dynamic")), Some(CountParam::Unresolved(_))));
        assert_eq!(CountParam::parse(&json!("many")), None);
    }

    #[test]
    fn test_params_accessors() {
        let item = CheckItem::new(
            CheckType::SemanticCheck,
            json!({
                "file_pattern": "workspace/*.json",
                "blank": "  ",
                "use_llm_judge": true,
                "expected_keywords": "hook",
                "validation_rules": [{"validation_method": "word_count_range", "expected_range": [1, 2]}]
            }),
        );
        let params = Params::of(&item);
        assert_eq!(params.str("file_pattern"), Some("workspace/*.json"));
        assert!(params.require_str("blank").is_err());
        assert!(params.flag("use_llm_judge"));
        assert_eq!(params.strings("expected_keywords"), vec!["hook".to_string()]);
        assert_eq!(params.validation_method(), Some("word_count_range"));
    }
}
