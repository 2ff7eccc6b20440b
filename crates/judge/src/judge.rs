//! Retrying, concurrency-bounded judge.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::client::{ChatMessage, JudgeClient, JudgeConfig, JudgeError, OpenAiJudgeClient, Result};
use crate::parse::parse_judge_response;

/// Shared handle to the external judge.
///
/// The judge is the scarce resource of a grading run: every call holds a
/// semaphore permit, so concurrent checkers never exceed
/// `max_concurrent_calls` requests in flight.
#[derive(Clone)]
pub struct Judge {
    client: Arc<dyn JudgeClient>,
    config: JudgeConfig,
    permits: Arc<Semaphore>,
}

impl Judge {
    /// Wrap a client with default retry settings.
    pub fn new(client: Arc<dyn JudgeClient>) -> Self {
        let config = JudgeConfig::default();
        Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent_calls.max(1))),
            config,
        }
    }

    /// Build an HTTP-backed judge from a complete configuration.
    pub fn from_config(config: JudgeConfig) -> Result<Self> {
        let client = OpenAiJudgeClient::new(&config)?;
        Ok(Self::new(Arc::new(client)).with_config(config))
    }

    /// Replace retry and concurrency settings.
    pub fn with_config(mut self, config: JudgeConfig) -> Self {
        self.permits = Arc::new(Semaphore::new(config.max_concurrent_calls.max(1)));
        self.config = config;
        self
    }

    /// Model identifier.
    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Ask the judge and return the JSON object it answered with.
    ///
    /// Transport errors and unparseable replies are retried up to
    /// `max_attempts` times with a fixed delay.
    pub async fn judge_json(&self, messages: &[ChatMessage]) -> Result<Value> {
        let attempts = self.config.max_attempts.max(1);
        let mut last = JudgeError::EmptyResponse;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
            debug!(
                "Judge call attempt {}/{} model={}",
                attempt,
                attempts,
                self.client.model_name()
            );
            for (idx, message) in messages.iter().enumerate() {
                debug!("Judge request {} ({}): {}", idx + 1, message.role, preview(&message.content, 250));
            }

            let reply = {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| JudgeError::NotConfigured)?;
                self.client.complete(messages).await
            };

            match reply {
                Ok(raw) => {
                    debug!("Judge response: {}", preview(&raw, 500));
                    match parse_judge_response(&raw) {
                        Some(value) => return Ok(value),
                        None => last = JudgeError::Unparseable(preview(&raw, 100)),
                    }
                }
                Err(e) => last = e,
            }
            warn!("Judge attempt {}/{} failed: {}", attempt, attempts, last);
        }

        Err(JudgeError::Exhausted {
            attempts,
            last: last.to_string(),
        })
    }
}

/// Head and tail of long text for logs.
fn preview(text: &str, keep: usize) -> String {
    let count = text.chars().count();
    if count <= keep * 2 {
        return text.to_string();
    }
    let head: String = text.chars().take(keep).collect();
    let tail: String = text.chars().skip(count - keep).collect();
    format!("{head}\n... [{} chars omitted] ...\n{tail}", count - keep * 2)
}
