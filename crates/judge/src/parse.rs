//! Tolerant JSON extraction from judge replies.
//!
//! Models asked for a JSON object still wrap it in prose or code fences
//! now and then. Extraction strategies are tried in order; the first that
//! yields an object wins.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

type Strategy = fn(&str) -> Option<Value>;

const STRATEGIES: [(&str, Strategy); 3] = [
    ("direct", direct),
    ("fenced", fenced),
    ("braces", braces),
];

/// Recover a JSON object from a raw judge reply.
///
/// Returns `None` when no strategy produces an object.
pub fn parse_judge_response(raw: &str) -> Option<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let value = strategy(raw)?;
        tracing::trace!("Judge reply parsed by {} strategy", name);
        Some(value)
    })
}

fn object(value: Value) -> Option<Value> {
    value.is_object().then_some(value)
}

fn direct(raw: &str) -> Option<Value> {
    serde_json::from_str(raw).ok().and_then(object)
}

fn fenced(raw: &str) -> Option<Value> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let fence = FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").ok())
        .as_ref()?;
    fence
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| direct(body.as_str()))
}

fn braces(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    if let Some(end) = raw.rfind('}').filter(|end| *end > start) {
        if let Some(value) = direct(&raw[start..=end]) {
            return Some(value);
        }
    }
    // Trailing prose containing braces: take the first complete value.
    serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok)
        .and_then(object)
}
