//! `json_schema`: required top-level fields of every matching file.

use async_trait::async_trait;
use quillgrade_core::{CheckItem, CheckResult, CheckType};
use quillgrade_storage::{file_name, JsonDocument};

use super::by_rule;
use crate::engine::{CheckContext, Checker, Result};
use crate::params::Params;

/// Verifies file structure.
#[derive(Debug, Default)]
pub struct JsonSchemaChecker;

#[async_trait]
impl Checker for JsonSchemaChecker {
    fn check_type(&self) -> CheckType {
        CheckType::JsonSchema
    }

    async fn run(&self, item: &CheckItem, ctx: &CheckContext<'_>) -> Result<CheckResult> {
        let params = Params::of(item);
        let pattern = params.require_str("file_pattern")?;
        let required = params.strings("required_fields");

        let files = ctx.workspace.glob_files(pattern)?;
        if files.is_empty() {
            return Ok(by_rule(CheckResult::fail(
                "no matching files",
                format!("pattern '{pattern}' matched nothing"),
            )));
        }

        let mut all_ok = true;
        let mut malformed = false;
        let mut lines = Vec::with_capacity(files.len());
        for path in &files {
            let name = file_name(path);
            match ctx.workspace.read_json(path)? {
                JsonDocument::Parsed(data) => {
                    let missing: Vec<&str> = required
                        .iter()
                        .filter(|field| data.get(field.as_str()).is_none())
                        .map(String::as_str)
                        .collect();
                    if missing.is_empty() {
                        lines.push(format!("{name}: complete"));
                    } else {
                        all_ok = false;
                        lines.push(format!("{name}: missing {}", missing.join(", ")));
                    }
                }
                JsonDocument::Malformed { line, column, .. } => {
                    all_ok = false;
                    malformed = true;
                    lines.push(format!("{name}: invalid JSON at line {line} column {column}"));
                }
            }
        }

        let mut result = CheckResult::from_bool(
            all_ok,
            if all_ok {
                "every file is complete"
            } else {
                "some files are incomplete"
            },
            lines.join("; "),
        );
        result.json_parse_error = malformed;
        Ok(by_rule(result))
    }
}
