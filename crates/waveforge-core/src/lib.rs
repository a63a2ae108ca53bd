//! # Workflow Engine Core
//!
//! Data model, expression evaluation, matrix expansion, cycle detection and DAG
//! scheduling for the YAML-driven workflow execution engine. This crate has no
//! knowledge of how a task is actually executed (that is `waveforge-exec`); it only
//! turns a parsed [`Workflow`](model::Workflow) into an [`ExecutionPlan`](model::ExecutionPlan)
//! and resolves `${{ … }}` expressions against whatever context the caller supplies.
//!
//! ## Pipeline
//!
//! ```text
//! Workflow -> validate -> cycle::check_cycles -> matrix::expand_workflow_tasks -> scheduler::build_plan -> ExecutionPlan
//! ```

pub mod cycle;
pub mod error;
pub mod expr;
pub mod matrix;
pub mod model;
pub mod scheduler;
pub mod util;
pub mod validate;

use error::CoreError;
use model::{ExecutionPlan, Workflow};

/// Run the full pre-execution pipeline: validate, expand matrices, check for cycles,
/// build the execution plan. This is what `waveforge-cli`'s `validate`/`run` commands
/// and `waveforge-cron`'s orchestrator call before handing a plan to the runner.
pub fn build_execution_plan(workflow: &Workflow) -> Result<ExecutionPlan, CoreError> {
    validate::validate_workflow(workflow)?;
    cycle::check_cycles(&workflow.tasks)?;
    let expanded = matrix::expand_workflow_tasks(&workflow.tasks)?;
    Ok(scheduler::build_plan(&expanded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(id: &str, deps: &[&str]) -> model::Task {
        model::Task {
            id: id.to_string(),
            name: None,
            run: "echo hi".to_string(),
            shell: None,
            working_directory: None,
            env: BTreeMap::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            condition: None,
            input: None,
            output: None,
            timeout_ms: None,
            continue_on_error: false,
            retry_count: 0,
            retry_delay_ms: 0,
            matrix: None,
            execution_environment: None,
            matrix_values: None,
        }
    }

    #[test]
    fn end_to_end_pipeline_builds_a_plan() {
        let workflow = Workflow {
            name: "demo".into(),
            description: None,
            tasks: vec![task("a", &[]), task("b", &["a"])],
            env: BTreeMap::new(),
            default_timeout_ms: 5000,
            default_shell: None,
            webhooks: vec![],
            execution_environment: None,
            watch: None,
            max_parallelism: -1,
            stop_on_first_failure: false,
        };
        let plan = build_execution_plan(&workflow).unwrap();
        assert_eq!(plan.waves.len(), 2);
    }

    #[test]
    fn rejects_a_cyclic_workflow() {
        let workflow = Workflow {
            name: "demo".into(),
            description: None,
            tasks: vec![task("a", &["b"]), task("b", &["a"])],
            env: BTreeMap::new(),
            default_timeout_ms: 5000,
            default_shell: None,
            webhooks: vec![],
            execution_environment: None,
            watch: None,
            max_parallelism: -1,
            stop_on_first_failure: false,
        };
        assert!(build_execution_plan(&workflow).is_err());
    }
}
