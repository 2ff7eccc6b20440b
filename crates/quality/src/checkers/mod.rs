//! One [`Checker`](crate::Checker) per check type.

pub mod attribute;
pub mod create_count;
pub mod cross_file;
pub mod json_schema;
pub mod semantic;
pub mod tool_calls;
pub mod whitelist;

pub use attribute::AttributeChecker;
pub use create_count::CreateCountChecker;
pub use cross_file::CrossFileChecker;
pub use json_schema::JsonSchemaChecker;
pub use semantic::SemanticChecker;
pub use tool_calls::{ToolCallAbsenceChecker, ToolCalledChecker};
pub use whitelist::WhitelistChecker;

use quillgrade_core::{CheckResult, EvaluationMethod};

/// Tag a result as rule-decided unless a more specific method is set.
pub(crate) fn by_rule(result: CheckResult) -> CheckResult {
    if result.evaluation_method.is_some() {
        result
    } else {
        result.with_method(EvaluationMethod::Rule)
    }
}
