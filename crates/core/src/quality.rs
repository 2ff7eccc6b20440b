//! Checklist model - check items, types, dimensions and tiers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::id::{CheckId, CheckIdentity};

/// Kind of evaluation a check item asks for.
///
/// Unknown names are preserved in [`CheckType::Other`] so a checklist
/// written for a newer grader still loads; such items are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CheckType {
    EntityAttributeEquals,
    CreateOperationVerified,
    JsonSchema,
    CrossFileConsistency,
    ToolCalledWithParams,
    ToolCallAbsence,
    SemanticCheck,
    FileWhitelistCheck,
    Other(String),
}

impl CheckType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::EntityAttributeEquals => "entity_attribute_equals",
            Self::CreateOperationVerified => "create_operation_verified",
            Self::JsonSchema => "json_schema",
            Self::CrossFileConsistency => "cross_file_consistency",
            Self::ToolCalledWithParams => "tool_called_with_params",
            Self::ToolCallAbsence => "tool_call_absence",
            Self::SemanticCheck => "semantic_check",
            Self::FileWhitelistCheck => "file_whitelist_check",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for CheckType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "entity_attribute_equals" => Self::EntityAttributeEquals,
            "create_operation_verified" => Self::CreateOperationVerified,
            "json_schema" => Self::JsonSchema,
            "cross_file_consistency" => Self::CrossFileConsistency,
            "tool_called_with_params" => Self::ToolCalledWithParams,
            "tool_call_absence" => Self::ToolCallAbsence,
            "semantic_check" => Self::SemanticCheck,
            "file_whitelist_check" => Self::FileWhitelistCheck,
            _ => Self::Other(s),
        }
    }
}

impl From<CheckType> for String {
    fn from(t: CheckType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for CheckType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability dimension a check item contributes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Dimension {
    FormatCompliance,
    BusinessRuleCompliance,
    MemoryManagement,
    ContentQuality,
    Other(String),
}

impl Dimension {
    /// The three pass-rate dimensions, in report order.
    pub const PROCESS: [Dimension; 3] = [
        Dimension::FormatCompliance,
        Dimension::BusinessRuleCompliance,
        Dimension::MemoryManagement,
    ];

    /// Wire name of the dimension.
    pub fn as_str(&self) -> &str {
        match self {
            Self::FormatCompliance => "format_compliance",
            Self::BusinessRuleCompliance => "business_rule_compliance",
            Self::MemoryManagement => "memory_management",
            Self::ContentQuality => "content_quality",
            Self::Other(name) => name,
        }
    }

    /// Whether this is one of the pass-rate (non content) dimensions.
    pub fn is_process(&self) -> bool {
        Self::PROCESS.contains(self)
    }
}

impl From<String> for Dimension {
    fn from(s: String) -> Self {
        match s.as_str() {
            "format_compliance" => Self::FormatCompliance,
            "business_rule_compliance" => Self::BusinessRuleCompliance,
            "memory_management" => Self::MemoryManagement,
            "content_quality" => Self::ContentQuality,
            _ => Self::Other(s),
        }
    }
}

impl From<Dimension> for String {
    fn from(d: Dimension) -> Self {
        d.as_str().to_string()
    }
}

/// Content-quality tier of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Basic,
    Advanced,
    #[serde(other)]
    Unknown,
}

/// One check item of a checklist.
///
/// Items are immutable once loaded. The identity is resolved by
/// [`Checklist::new`]; downstream code only ever sees [`CheckItem::id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckItem {
    /// Declared semantic id, if any
    #[serde(rename = "id", default, skip_serializing_if = "Option::is_none")]
    pub declared_id: Option<String>,

    /// Evaluation kind
    pub check_type: CheckType,

    /// Capability dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_id: Option<Dimension>,

    /// Capability subcategory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory_id: Option<String>,

    /// Content-quality tier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_tier: Option<QualityTier>,

    /// Critical flag
    #[serde(default)]
    pub is_critical: bool,

    /// Human readable description
    #[serde(default)]
    pub description: String,

    /// Type specific parameters
    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(skip)]
    id: CheckId,

    #[serde(skip)]
    position: usize,
}

impl CheckItem {
    /// Build an item directly (mostly useful in tests and tooling).
    pub fn new(check_type: CheckType, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            declared_id: None,
            check_type,
            dimension_id: None,
            subcategory_id: None,
            quality_tier: None,
            is_critical: false,
            description: String::new(),
            params,
            id: CheckId::default(),
            position: 0,
        }
    }

    /// Set the declared semantic id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.declared_id = Some(id.into());
        self
    }

    /// Set dimension, subcategory and tier.
    pub fn with_dimension(
        mut self,
        dimension: Dimension,
        subcategory: impl Into<String>,
        tier: Option<QualityTier>,
    ) -> Self {
        self.dimension_id = Some(dimension);
        self.subcategory_id = Some(subcategory.into());
        self.quality_tier = tier;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Resolved identifier.
    pub fn id(&self) -> &CheckId {
        &self.id
    }

    /// 1-based position in the checklist.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Ids or subcategory ids this item supersedes (`params.replaces`).
    pub fn replaces(&self) -> Vec<String> {
        match self.params.get("replaces") {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        }
    }

    /// Look up a parameter.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// An ordered checklist with resolved identities.
#[derive(Debug, Clone, Default)]
pub struct Checklist {
    /// Sample / data id the checklist belongs to
    pub sample_id: String,
    items: Vec<CheckItem>,
}

impl Checklist {
    /// Resolve identities and positions of the given items.
    pub fn new(sample_id: impl Into<String>, items: Vec<CheckItem>) -> Self {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, mut item)| {
                item.position = index + 1;
                item.id = CheckIdentity::from_declared(item.declared_id.as_deref(), item.position)
                    .into();
                item
            })
            .collect();
        Self {
            sample_id: sample_id.into(),
            items,
        }
    }

    /// Items in checklist order.
    pub fn items(&self) -> &[CheckItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the checklist is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find an item by resolved id.
    pub fn get(&self, id: &str) -> Option<&CheckItem> {
        self.items.iter().find(|item| item.id.as_str() == id)
    }

    /// The first resolved id shared by two items, with both 1-based positions.
    ///
    /// Results are keyed by id, so a checklist with a collision cannot be graded.
    pub fn first_duplicate(&self) -> Option<(&CheckId, usize, usize)> {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        self.items.iter().find_map(|item| {
            seen.insert(item.id.as_str(), item.position)
                .map(|earlier| (&item.id, earlier, item.position))
        })
    }
}
