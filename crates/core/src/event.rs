//! Agent transcript - the ordered, role-tagged events of a run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function invocation requested by the assistant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name
    #[serde(default)]
    pub name: String,

    /// Arguments, either an object or a JSON-encoded string
    #[serde(default)]
    pub arguments: Value,
}

impl FunctionCall {
    /// Arguments as an object. String-encoded arguments are decoded;
    /// anything that does not decode to an object yields `None`.
    pub fn arguments_map(&self) -> Option<Map<String, Value>> {
        match &self.arguments {
            Value::Object(map) => Some(map.clone()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            },
            Value::Null => Some(Map::new()),
            _ => None,
        }
    }
}

/// One entry of an event's `tool_calls`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Invoked function
    #[serde(default)]
    pub function: FunctionCall,
}

/// One transcript event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    /// system / user / assistant / tool
    #[serde(default)]
    pub role: String,

    /// Message content (string, content-part list, or null)
    #[serde(default)]
    pub content: Value,

    /// Tool calls carried by assistant events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl TranscriptEvent {
    /// Whether the event was produced by the assistant.
    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    /// Flattened text content.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        }
    }
}

/// Read-only view of what the agent did during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Ordered events
    #[serde(default, alias = "conversation_history")]
    pub events: Vec<TranscriptEvent>,

    /// Explicit final response, when the runner recorded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

impl Transcript {
    /// Create from events.
    pub fn new(events: Vec<TranscriptEvent>) -> Self {
        Self {
            events,
            response: None,
        }
    }

    /// Every function call made by the assistant, in order.
    pub fn assistant_calls(&self) -> impl Iterator<Item = &FunctionCall> {
        self.events
            .iter()
            .filter(|event| event.is_assistant())
            .filter_map(|event| event.tool_calls.as_ref())
            .flatten()
            .map(|call| &call.function)
    }

    /// The agent's final response text.
    pub fn final_response(&self) -> Option<String> {
        if let Some(response) = self.response.as_ref().filter(|r| !r.trim().is_empty()) {
            return Some(response.clone());
        }
        self.events
            .iter()
            .rev()
            .filter(|event| event.is_assistant())
            .map(TranscriptEvent::text)
            .find(|text| !text.trim().is_empty())
    }
}
