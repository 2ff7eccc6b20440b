//! Field paths and loose value comparison over parsed JSON.

use serde_json::Value;

/// A field reference inside a JSON document.
///
/// `a.b` walks nested objects; `list[*].name` visits every element of
/// `list` and reads `name` from each object element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath<'p> {
    /// Dotted object path
    Plain(&'p str),
    /// Array path plus optional per-item key
    Wildcard {
        /// Dotted path to the array
        array: &'p str,
        /// Key read from each element
        item: Option<&'p str>,
    },
}

impl<'p> FieldPath<'p> {
    /// Parse a path string.
    pub fn parse(path: &'p str) -> Self {
        match path.split_once("[*]") {
            Some((array, rest)) => {
                let item = rest.trim_start_matches('.');
                Self::Wildcard {
                    array,
                    item: (!item.is_empty()).then_some(item),
                }
            }
            None => Self::Plain(path),
        }
    }
}

/// Walk a dotted path through nested objects.
pub fn nested<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|key| !key.is_empty())
        .try_fold(data, |value, key| value.as_object()?.get(key))
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| values_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Text form of a value: strings unquoted, everything else as JSON.
pub fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Whether a value carries content (not null, false, zero or empty).
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Whether a string is an unfilled template placeholder.
pub fn is_placeholder(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.trim_start().starts_with("{{"))
}

/// Truncate to the first and last `keep` characters when longer than `limit`.
pub fn head_tail(text: &str, limit: usize, keep: usize) -> String {
    let count = text.chars().count();
    if count <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(keep).collect();
    let tail: String = text.chars().skip(count.saturating_sub(keep)).collect();
    format!("{head}\n\n... [content omitted] ...\n\n{tail}")
}
