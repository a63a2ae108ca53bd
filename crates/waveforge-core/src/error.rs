//! Fatal error surface for the core crate.
//!
//! Per the error handling design, most failures (task non-zero exit, timeout,
//! cancellation) never reach here — they are recorded as a [`crate::model::TaskStatus`]
//! instead. The variants below are the ones that escape as real errors: they all occur
//! at a boundary (parse-time validation, scheduling) rather than during task execution.

use thiserror::Error;

/// A single structural problem found while validating a parsed workflow.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    /// The task id the issue concerns, if any.
    pub task_id: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(task_id: impl Into<Option<String>>, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.task_id {
            Some(id) => write!(f, "[{id}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    /// Known task id collision, missing dependency, bad shell, empty matrix
    /// dimension, invalid regex: all surface as a batch of [`ValidationIssue`]s
    /// at the validation boundary.
    #[error("workflow failed validation: {}", summarize(.0))]
    Validation(Vec<ValidationIssue>),

    /// A cycle was found in the dependency graph during scheduling; carries the
    /// cycle path for diagnostics, e.g. `a -> c -> b -> a`.
    #[error("circular dependency detected: {path}")]
    CircularDependency { path: String },

    /// Expression could not be evaluated (malformed `${{ }}` syntax, unbalanced
    /// braces). This is a programmer/author error, not a runtime task failure.
    #[error("invalid expression: {0}")]
    Expression(String),
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type CoreResult<T> = Result<T, CoreError>;
