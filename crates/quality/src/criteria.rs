//! Judge criteria lookup.

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use quillgrade_storage::WorkspaceAccessor;

use crate::params::Params;

/// Resolve the criteria text handed to the judge.
///
/// Looked up in order: inline `llm_judge_criteria`, the first validation
/// rule's `evaluation_criteria.validation_prompt` (for
/// `llm_semantic_analysis`), then `llm_judge_criteria_file` with an
/// optional `llm_judge_criteria_section`. Returns an empty string when
/// nothing is found.
pub fn load_criteria(params: &Params<'_>, workspace: &WorkspaceAccessor) -> String {
    if let Some(inline) = params.str("llm_judge_criteria") {
        return inline.to_string();
    }

    if params.validation_method() == Some("llm_semantic_analysis") {
        let prompt = params
            .first_rule()
            .and_then(|rule| rule.get("evaluation_criteria"))
            .and_then(|c| c.get("validation_prompt"))
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty());
        if let Some(prompt) = prompt {
            return prompt.to_string();
        }
    }

    let Some(file) = params.str("llm_judge_criteria_file") else {
        return String::new();
    };
    let path = workspace.path(file);
    let content = match workspace.read_text(&path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Judge criteria file unavailable: {}", e);
            return String::new();
        }
    };

    match params.str("llm_judge_criteria_section") {
        None => content,
        Some(section) => extract_section(&content, section).unwrap_or_else(|| {
            warn!("Section {} not found in {}", section, path.display());
            String::new()
        }),
    }
}

/// Find the `llm_judge_criteria: |` block under a `## [N. ]<section>` heading.
///
/// The block runs until a `---` line, the next `## ` heading or the end of
/// the file, and is dedented by the indentation of its first non-blank line.
pub fn extract_section(content: &str, section: &str) -> Option<String> {
    let pattern = format!(
        r"(?s)## (?:\d+\.\s+)?{}.*?llm_judge_criteria:\s*\|(.*?)(?:\n---\n|\n## |\z)",
        regex::escape(section)
    );
    let re = Regex::new(&pattern).ok()?;
    let block = re.captures(content)?.get(1)?.as_str();
    Some(dedent(block))
}

fn dedent(block: &str) -> String {
    let lines: Vec<&str> = block.split('\n').collect();
    let indent = lines
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .unwrap_or(0);

    lines
        .into_iter()
        .map(|l| {
            if l.len() > indent && l.is_char_boundary(indent) {
                &l[indent..]
            } else {
                l
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
