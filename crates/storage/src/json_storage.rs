//! JSON file storage implementation.
//!
//! Reads checklists (JSON object, JSON array or JSON lines), transcripts and
//! prior results, and writes pretty-printed reports.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, Checklist, ExecutionResult, Report, Transcript};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use super::{Result, ResultStore, StorageError};

async fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).await.map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> StorageError + '_ {
    move |source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Load a checklist file. `sample_id` selects an envelope when the file
/// holds several `{data_id, check_list}` entries.
pub async fn load_checklist(path: &Path, sample_id: Option<&str>) -> Result<Checklist> {
    let text = read(path).await?;
    let checklist = parse_checklist(&text, sample_id).map_err(|e| match e {
        StorageError::InvalidInput(msg) => {
            StorageError::InvalidInput(format!("{}: {msg}", path.display()))
        }
        other => other,
    })?;
    info!(
        "Loaded checklist {} with {} items from {}",
        checklist.sample_id,
        checklist.len(),
        path.display()
    );
    Ok(checklist)
}

/// Parse checklist text in any supported shape.
pub fn parse_checklist(text: &str, sample_id: Option<&str>) -> Result<Checklist> {
    let values: Vec<Value> = match serde_json::from_str::<Value>(text) {
        Ok(Value::Array(items)) if !items.iter().any(is_envelope) => {
            return build(sample_id.unwrap_or("unknown"), items);
        }
        Ok(Value::Array(entries)) => entries,
        Ok(value) => vec![value],
        Err(_) => text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(n, line)| {
                serde_json::from_str::<Value>(line).map_err(|e| {
                    StorageError::InvalidInput(format!("line {}: {e}", n + 1))
                })
            })
            .collect::<Result<_>>()?,
    };

    let (envelopes, items): (Vec<Value>, Vec<Value>) = values.into_iter().partition(is_envelope);

    if envelopes.is_empty() {
        return build(sample_id.unwrap_or("unknown"), items);
    }

    let envelope = match sample_id {
        Some(wanted) => envelopes
            .into_iter()
            .find(|e| e.get("data_id").and_then(Value::as_str) == Some(wanted))
            .ok_or_else(|| StorageError::InvalidInput(format!("no checklist for sample {wanted}")))?,
        None => envelopes
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::InvalidInput("empty checklist".into()))?,
    };

    let id = envelope
        .get("data_id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let items = match envelope.get("check_list") {
        Some(Value::Array(items)) => items.clone(),
        _ => return Err(StorageError::InvalidInput("check_list is not a list".into())),
    };
    build(&id, items)
}

fn is_envelope(value: &Value) -> bool {
    value.get("check_list").is_some()
}

fn build(sample_id: &str, raw_items: Vec<Value>) -> Result<Checklist> {
    let items = raw_items
        .into_iter()
        .enumerate()
        .map(|(n, raw)| {
            serde_json::from_value::<CheckItem>(raw)
                .map_err(|e| StorageError::InvalidInput(format!("check item {}: {e}", n + 1)))
        })
        .collect::<Result<Vec<_>>>()?;
    let checklist = Checklist::new(sample_id, items);
    if let Some((id, first, second)) = checklist.first_duplicate() {
        return Err(StorageError::InvalidInput(format!(
            "check items {first} and {second} share the id {id}"
        )));
    }
    Ok(checklist)
}

/// Load a transcript: an object with `conversation_history` or a bare event list.
pub async fn load_transcript(path: &Path) -> Result<Transcript> {
    let text = read(path).await?;
    let value: Value = serde_json::from_str(&text).map_err(json_err(path))?;
    let transcript = match value {
        Value::Array(_) => Transcript::new(serde_json::from_value(value).map_err(json_err(path))?),
        other => serde_json::from_value(other).map_err(json_err(path))?,
    };
    info!(
        "Loaded transcript with {} events from {}",
        transcript.events.len(),
        path.display()
    );
    Ok(transcript)
}

/// File-based JSON result store.
#[derive(Debug, Clone)]
pub struct JsonResultStore {
    output: PathBuf,
    prior: Option<PathBuf>,
}

impl JsonResultStore {
    /// Create a store writing to `output`.
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            prior: None,
        }
    }

    /// Read prior results from `path` (a report or a raw execution result).
    pub fn with_prior(mut self, path: impl Into<PathBuf>) -> Self {
        self.prior = Some(path.into());
        self
    }

    /// Output path.
    pub fn output(&self) -> &Path {
        &self.output
    }
}

#[async_trait]
impl ResultStore for JsonResultStore {
    async fn load_prior(&self) -> Result<Option<ExecutionResult>> {
        let Some(path) = &self.prior else {
            return Ok(None);
        };
        if !fs::try_exists(path).await.unwrap_or(false) {
            warn!("Prior result {} does not exist, running every check", path.display());
            return Ok(None);
        }
        let text = read(path).await?;
        let prior: ExecutionResult = serde_json::from_str(&text).map_err(json_err(path))?;
        info!(
            "Loaded prior result with {} checks from {}",
            prior.check_details.len(),
            path.display()
        );
        Ok(Some(prior))
    }

    async fn save_report(&self, report: &Report) -> Result<()> {
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let body = serde_json::to_string_pretty(report).map_err(json_err(&self.output))?;
        fs::write(&self.output, body).await.map_err(|source| StorageError::Io {
            path: self.output.clone(),
            source,
        })?;
        info!("Report written to {}", self.output.display());
        Ok(())
    }
}
