use crate::error::CoreError;
use crate::model::TaskStatus;

use super::parser::Parser;
use super::{scan_spans, Span, Value};

/// Everything the evaluator needs to resolve a reference, supplied by whoever owns
/// the run (the `WorkflowContext` in `waveforge-exec`). Kept as a trait so this crate
/// never depends on the executor crate.
pub trait EvalContext {
    /// `tasks.<id>.<property>`; `None` for unknown id.
    fn task_result(&self, task_id: &str) -> Option<TaskResultView>;
    /// `env.<NAME>`, looked up in the *declared* environment only (no host fallback).
    fn env_var(&self, name: &str) -> Option<String>;
    /// `workflow.<field>`.
    fn workflow_field(&self, field: &str) -> Option<String>;
    /// `matrix.<key>`, from the currently-evaluating task's matrixValues.
    fn matrix_value(&self, key: &str) -> Option<String>;
    /// `params.<name>`, CLI-supplied.
    fn param(&self, name: &str) -> Option<String>;
    /// Whether the run has been marked cancelled (`cancelled()`).
    fn is_cancelled(&self) -> bool;
}

/// A read-only projection of a [`crate::model::TaskResult`] as seen by the evaluator.
pub struct TaskResultView {
    pub status: TaskStatus,
    pub output: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Stateless; holds no data beyond what's needed to parse+evaluate one expression at a
/// time, so a single instance can be shared across an entire run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Resolve every `${{ … }}` span in `input`, concatenating with the surrounding
    /// literal text.
    pub fn interpolate(
        &self,
        input: &str,
        ctx: &dyn EvalContext,
        deps: &[String],
    ) -> Result<String, CoreError> {
        let spans = scan_spans(input);
        if spans.len() == 1 {
            if let Span::Expr(e) = spans[0] {
                // Whole-string single expression: avoid stringly round-tripping a
                // value that downstream code might want to treat specially (matrix
                // references unresolved at this layer are returned verbatim).
                return self.eval_expr_str(e, ctx, deps);
            }
        }
        let mut out = String::new();
        for span in spans {
            match span {
                Span::Literal(s) => out.push_str(s),
                Span::Expr(e) => out.push_str(&self.eval_expr_str(e, ctx, deps)?),
            }
        }
        Ok(out)
    }

    /// Evaluate a task's `if` field (already unwrapped from `${{ }}` or raw) as a bool.
    pub fn evaluate_condition(
        &self,
        condition: &str,
        ctx: &dyn EvalContext,
        deps: &[String],
    ) -> Result<bool, CoreError> {
        // Accept both `${{ success() }}` and a bare `success()`.
        let inner = strip_braces(condition);
        let value = self.eval(inner, ctx, deps)?;
        Ok(value.to_bool())
    }

    fn eval_expr_str(
        &self,
        expr: &str,
        ctx: &dyn EvalContext,
        deps: &[String],
    ) -> Result<String, CoreError> {
        Ok(self.eval(expr, ctx, deps)?.to_display_string())
    }

    fn eval(&self, expr: &str, ctx: &dyn EvalContext, deps: &[String]) -> Result<Value, CoreError> {
        let mut parser = Parser::new(expr, ctx, deps);
        let value = parser.parse_expr()?;
        parser.expect_end()?;
        Ok(value)
    }
}

fn strip_braces(s: &str) -> &str {
    let s = s.trim();
    if let Some(inner) = s.strip_prefix("${{").and_then(|r| r.strip_suffix("}}")) {
        inner.trim()
    } else {
        s
    }
}
