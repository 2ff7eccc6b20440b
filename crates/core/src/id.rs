//! Stable identifiers for check items.

use serde::{Deserialize, Serialize};

/// How a check item was identified in its checklist.
///
/// A semantic id survives checklist edits; a positional index does not.
/// Both are collapsed into a [`CheckId`] exactly once, when the checklist
/// is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CheckIdentity {
    /// Author-supplied semantic id
    Semantic(String),
    /// 1-based position in the checklist
    Positional(usize),
}

impl CheckIdentity {
    /// Pick the semantic id when present and non-blank, otherwise the position.
    pub fn from_declared(declared: Option<&str>, position: usize) -> Self {
        match declared.map(str::trim) {
            Some(id) if !id.is_empty() => Self::Semantic(id.to_string()),
            _ => Self::Positional(position),
        }
    }
}

/// Key of a check item in results and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    /// Create from a raw key.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Label used for items that carry no semantic id.
    pub fn positional(position: usize) -> Self {
        Self(format!("check_{position}"))
    }

    /// Borrow the key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<CheckIdentity> for CheckId {
    fn from(identity: CheckIdentity) -> Self {
        match identity {
            CheckIdentity::Semantic(id) => Self(id),
            CheckIdentity::Positional(position) => Self::positional(position),
        }
    }
}

impl From<&str> for CheckId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::borrow::Borrow<str> for CheckId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semantic_id_wins() {
        let id: CheckId = CheckIdentity::from_declared(Some("章节克隆检测"), 7).into();
        assert_eq!(id.as_str(), "章节克隆检测");
    }

    #[test]
    fn test_blank_id_falls_back_to_position() {
        let id: CheckId = CheckIdentity::from_declared(Some("  "), 3).into();
        assert_eq!(id, CheckId::positional(3));
        assert_eq!(id.to_string(), "check_3");

        let id: CheckId = CheckIdentity::from_declared(None, 12).into();
        assert_eq!(id.as_str(), "check_12");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = CheckId::new("hooks_count");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"hooks_count\"");
    }
}
