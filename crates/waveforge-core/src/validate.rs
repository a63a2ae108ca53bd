//! Parse-time validation: the checks that must pass before a [`crate::model::Workflow`]
//! is allowed anywhere near matrix expansion or scheduling.

use std::collections::HashSet;

use crate::error::{CoreError, ValidationIssue};
use crate::model::Workflow;

pub fn validate_workflow(workflow: &Workflow) -> Result<(), CoreError> {
    let mut issues = Vec::new();

    if workflow.default_timeout_ms == 0 {
        issues.push(ValidationIssue::new(None, "defaultTimeoutMs must be > 0"));
    }
    if workflow.tasks.is_empty() {
        issues.push(ValidationIssue::new(None, "workflow has no tasks"));
    }

    let mut seen_ids: HashSet<String> = HashSet::new();
    for task in &workflow.tasks {
        if task.id.trim().is_empty() {
            issues.push(ValidationIssue::new(None, "task id must not be empty"));
            continue;
        }
        let lower = task.id.to_lowercase();
        if !seen_ids.insert(lower) {
            issues.push(ValidationIssue::new(
                task.id.clone(),
                format!("duplicate task id '{}' (case-insensitive)", task.id),
            ));
        }
        if let Some(timeout) = task.timeout_ms {
            if timeout == 0 {
                issues.push(ValidationIssue::new(task.id.clone(), "timeoutMs must be > 0"));
            }
        }
        if let Some(spec) = &task.matrix {
            for (name, values) in &spec.dimensions {
                if name.trim().is_empty() {
                    issues.push(ValidationIssue::new(task.id.clone(), "matrix dimension name is empty"));
                }
                if values.is_empty() {
                    issues.push(ValidationIssue::new(
                        task.id.clone(),
                        format!("matrix dimension '{name}' has no values"),
                    ));
                }
            }
        }
    }

    let known_ids: HashSet<String> = workflow.tasks.iter().map(|t| t.id.to_lowercase()).collect();
    for task in &workflow.tasks {
        for dep in &task.depends_on {
            if !known_ids.contains(&dep.to_lowercase()) {
                issues.push(ValidationIssue::new(
                    task.id.clone(),
                    format!("dependsOn references unknown task '{dep}'"),
                ));
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Validation(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;
    use std::collections::BTreeMap;

    fn minimal_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: None,
            run: "echo hi".to_string(),
            shell: None,
            working_directory: None,
            env: BTreeMap::new(),
            depends_on: vec![],
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

    fn minimal_workflow(tasks: Vec<Task>) -> Workflow {
        Workflow {
            name: "wf".into(),
            description: None,
            tasks,
            env: BTreeMap::new(),
            default_timeout_ms: 1000,
            default_shell: None,
            webhooks: vec![],
            execution_environment: None,
            watch: None,
            max_parallelism: -1,
            stop_on_first_failure: false,
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let wf = minimal_workflow(vec![minimal_task("a"), minimal_task("A")]);
        assert!(validate_workflow(&wf).is_err());
    }

    #[test]
    fn rejects_missing_dependency() {
        let mut b = minimal_task("b");
        b.depends_on = vec!["missing".into()];
        let wf = minimal_workflow(vec![minimal_task("a"), b]);
        assert!(validate_workflow(&wf).is_err());
    }

    #[test]
    fn accepts_well_formed_workflow() {
        let mut b = minimal_task("b");
        b.depends_on = vec!["a".into()];
        let wf = minimal_workflow(vec![minimal_task("a"), b]);
        assert!(validate_workflow(&wf).is_ok());
    }
}
