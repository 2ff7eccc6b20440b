//! Judge client trait and the OpenAI-compatible HTTP implementation.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error type for judge calls.
#[derive(Debug, Error)]
pub enum JudgeError {
    /// Model, endpoint or key missing
    #[error("judge is not configured (model, base url and api key are required)")]
    NotConfigured,

    /// Transport failure
    #[error("judge request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("judge returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// No message content in the reply
    #[error("judge returned an empty response")]
    EmptyResponse,

    /// No JSON object could be recovered from the reply
    #[error("judge response is not JSON: {0}")]
    Unparseable(String),

    /// Every attempt failed
    #[error("judge failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Last error message
        last: String,
    },
}

/// Result type for judge operations.
pub type Result<T> = std::result::Result<T, JudgeError>;

/// Judge connection and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Model name
    pub model: Option<String>,
    /// OpenAI-compatible base URL (without `/chat/completions`)
    pub base_url: Option<String>,
    /// Bearer token
    pub api_key: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Attempts per call, first try included
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub retry_delay_ms: u64,
    /// Calls allowed in flight at once
    pub max_concurrent_calls: usize,
    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: None,
            base_url: None,
            api_key: None,
            timeout_secs: 120,
            max_attempts: 3,
            retry_delay_ms: 1000,
            max_concurrent_calls: 4,
            temperature: None,
        }
    }
}

impl JudgeConfig {
    /// Whether model, endpoint and key are all present.
    pub fn is_complete(&self) -> bool {
        [&self.model, &self.base_url, &self.api_key]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// system / user / assistant
    pub role: String,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Something that can answer chat messages.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Send messages and return the raw reply text.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiJudgeClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiJudgeClient {
    /// Build a client from a complete configuration.
    pub fn new(config: &JudgeConfig) -> Result<Self> {
        let (Some(model), Some(base_url), Some(api_key)) =
            (&config.model, &config.base_url, &config.api_key)
        else {
            return Err(JudgeError::NotConfigured);
        };
        if !config.is_complete() {
            return Err(JudgeError::NotConfigured);
        }

        Ok(Self {
            client: ClientBuilder::new()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.clone(),
            model: model.clone(),
            temperature: config.temperature,
        })
    }

    fn payload(&self, messages: &[ChatMessage]) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "response_format": {"type": "json_object"},
        });
        if let Some(temperature) = self.temperature {
            payload["temperature"] = json!(temperature);
        }
        payload
    }
}

#[async_trait]
impl JudgeClient for OpenAiJudgeClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("POST {} ({} messages)", url, messages.len());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(messages))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(JudgeError::Status { status, body });
        }

        let body: Value = response.json().await?;
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .filter(|content| !content.trim().is_empty())
            .map(str::to_string)
            .ok_or(JudgeError::EmptyResponse)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_config() -> JudgeConfig {
        JudgeConfig {
            model: Some("judge-model".into()),
            base_url: Some("http://localhost:9/v1/".into()),
            api_key: Some("sk-test".into()),
            ..JudgeConfig::default()
        }
    }

    #[test]
    fn test_incomplete_config_is_rejected() {
        let config = JudgeConfig {
            api_key: Some("  ".into()),
            ..complete_config()
        };
        assert!(!config.is_complete());
        assert!(matches!(OpenAiJudgeClient::new(&config), Err(JudgeError::NotConfigured)));
    }

    #[test]
    fn test_payload_requests_json_object() {
        let client = OpenAiJudgeClient::new(&complete_config()).unwrap();
        assert_eq!(client.base_url, "http://localhost:9/v1");

        let payload = client.payload(&[ChatMessage::user("grade this")]);
        assert_eq!(payload["response_format"]["type"], "json_object");
        assert_eq!(payload["messages"][0]["role"], "user");
        assert!(payload.get("temperature").is_none());
    }
}
