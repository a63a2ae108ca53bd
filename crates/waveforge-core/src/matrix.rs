//! Matrix expansion: turns a parameterized task template into N concrete tasks,
//! one per combination of dimension values, then rewrites dependencies in a second
//! pass so fan-out lanes (shared matrix axis) stay independent while plain fan-in
//! dependencies converge onto every expansion.

use std::collections::BTreeMap;

use crate::error::{CoreError, ValidationIssue};
use crate::expr::{Span, scan_spans};
use crate::model::Task;

/// Expand every matrix template in `tasks` and rewrite dependencies accordingly.
/// Non-templated tasks pass through unchanged (aside from dependency rewriting).
pub fn expand_workflow_tasks(tasks: &[Task]) -> Result<Vec<Task>, CoreError> {
    let mut issues = Vec::new();
    let mut expansions: BTreeMap<String, Vec<Task>> = BTreeMap::new();

    for task in tasks {
        match &task.matrix {
            Some(spec) => match expand_task(task, spec) {
                Ok(expanded) => {
                    expansions.insert(task.id.clone(), expanded);
                }
                Err(mut e) => issues.append(&mut e),
            },
            None => {
                expansions.insert(task.id.clone(), vec![task.clone()]);
            }
        }
    }

    if !issues.is_empty() {
        return Err(CoreError::Validation(issues));
    }

    // Second pass: dependency rewriting, now that every task's expansion set is known.
    let mut output = Vec::new();
    for task in tasks {
        for mut expanded in expansions.get(&task.id).cloned().unwrap_or_default() {
            let mut new_deps = Vec::new();
            for dep_id in &task.depends_on {
                let dep_expansions = expansions.get(dep_id).cloned().unwrap_or_default();
                if dep_expansions.len() <= 1 {
                    new_deps.push(dep_id.clone());
                    continue;
                }
                let lane = expanded
                    .matrix_values
                    .as_ref()
                    .and_then(|t_values| {
                        dep_expansions
                            .iter()
                            .find(|d| {
                                d.matrix_values
                                    .as_ref()
                                    .map(|d_values| shares_lane(t_values, d_values))
                                    .unwrap_or(false)
                            })
                            .map(|d| d.id.clone())
                    });
                match lane {
                    Some(id) => new_deps.push(id),
                    None => new_deps.extend(dep_expansions.iter().map(|d| d.id.clone())),
                }
            }
            expanded.depends_on = new_deps;
            output.push(expanded);
        }
    }
    Ok(output)
}

fn shares_lane(t_values: &BTreeMap<String, String>, d_values: &BTreeMap<String, String>) -> bool {
    let shared: Vec<&String> = t_values.keys().filter(|k| d_values.contains_key(*k)).collect();
    !shared.is_empty() && shared.iter().all(|k| t_values.get(*k) == d_values.get(*k))
}

fn expand_task(task: &Task, spec: &crate::model::MatrixSpec) -> Result<Vec<Task>, Vec<ValidationIssue>> {
    let mut issues = Vec::new();
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
    if !issues.is_empty() {
        return Err(issues);
    }

    let mut combos: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for (name, values) in &spec.dimensions {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for v in values {
                let mut c = combo.clone();
                c.push((name.clone(), v.clone()));
                next.push(c);
            }
        }
        combos = next;
    }

    let combo_map = |c: &[(String, String)]| -> BTreeMap<String, String> {
        c.iter().cloned().collect()
    };

    combos.retain(|c| {
        let map = combo_map(c);
        !spec.exclude.iter().any(|ex| matches_all_ci(ex, &map))
    });

    for include in &spec.include {
        let mut merged_any = false;
        for combo in combos.iter_mut() {
            let map = combo_map(combo);
            let shared: Vec<&String> = include.keys().filter(|k| map.contains_key(*k)).collect();
            if !shared.is_empty() && shared.iter().all(|k| ci_eq(&map[*k], &include[*k])) {
                for (k, v) in include {
                    if !map.contains_key(k) {
                        combo.push((k.clone(), v.clone()));
                    }
                }
                merged_any = true;
            }
        }
        if !merged_any {
            combos.push(include.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
        }
    }

    let mut expanded = Vec::with_capacity(combos.len());
    for combo in &combos {
        let matrix_values: BTreeMap<String, String> = combo_map(combo);
        let mut t = task.clone();
        t.matrix = None;
        t.matrix_values = Some(matrix_values.clone());

        let interpolated_id = interpolate_matrix_only(&task.id, &matrix_values);
        t.id = if interpolated_id != task.id {
            interpolated_id
        } else {
            let suffix: String = combo
                .iter()
                .map(|(_, v)| sanitize(v))
                .collect::<Vec<_>>()
                .join("-");
            format!("{}-{}", task.id, suffix)
        };

        if let Some(name) = &task.name {
            t.name = Some(interpolate_matrix_only(name, &matrix_values));
        }
        t.run = interpolate_matrix_only(&task.run, &matrix_values);
        if let Some(wd) = &task.working_directory {
            t.working_directory = Some(interpolate_matrix_only(wd, &matrix_values));
        }
        if let Some(cond) = &task.condition {
            t.condition = Some(interpolate_matrix_only(cond, &matrix_values));
        }
        t.env = task
            .env
            .iter()
            .map(|(k, v)| (k.clone(), interpolate_matrix_only(v, &matrix_values)))
            .collect();
        t.input = task.input.clone().map(|input| match input {
            crate::model::TaskInput::Text { value } => crate::model::TaskInput::Text {
                value: interpolate_matrix_only(&value, &matrix_values),
            },
            crate::model::TaskInput::File { path } => crate::model::TaskInput::File {
                path: interpolate_matrix_only(&path, &matrix_values),
            },
            other => other,
        });

        expanded.push(t);
    }
    Ok(expanded)
}

fn matches_all_ci(pattern: &BTreeMap<String, String>, candidate: &BTreeMap<String, String>) -> bool {
    pattern
        .iter()
        .all(|(k, v)| candidate.get(k).map(|cv| ci_eq(cv, v)).unwrap_or(false))
}

fn ci_eq(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

fn sanitize(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    replaced.trim_matches('_').to_string()
}

/// Substitute only `${{ matrix.<key> }}` spans with values from `matrix_values`,
/// leaving every other `${{ }}` expression untouched for later (runtime) evaluation.
fn interpolate_matrix_only(input: &str, matrix_values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for span in scan_spans(input) {
        match span {
            Span::Literal(s) => out.push_str(s),
            Span::Expr(e) => {
                let trimmed = e.trim();
                let lower = trimmed.to_lowercase();
                if let Some(key) = lower.strip_prefix("matrix.") {
                    match matrix_values.get(key) {
                        Some(v) => out.push_str(v),
                        None => out.push_str(&format!("${{{{ {trimmed} }}}}")),
                    }
                } else {
                    out.push_str(&format!("${{{{ {trimmed} }}}}"));
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatrixSpec;

    fn base_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            name: None,
            run: "echo ${{ matrix.os }}".to_string(),
            shell: None,
            working_directory: None,
            env: BTreeMap::new(),
            depends_on: Vec::new(),
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
    fn expands_cartesian_product() {
        let mut build = base_task("build");
        build.matrix = Some(MatrixSpec {
            dimensions: vec![("os".into(), vec!["ubuntu".into(), "macos".into()])],
            include: vec![],
            exclude: vec![],
        });
        let mut test = base_task("test");
        test.depends_on = vec!["build".into()];
        test.matrix = Some(MatrixSpec {
            dimensions: vec![("os".into(), vec!["ubuntu".into(), "macos".into()])],
            include: vec![],
            exclude: vec![],
        });

        let expanded = expand_workflow_tasks(&[build, test]).unwrap();
        let ids: Vec<&str> = expanded.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&"build-ubuntu"));
        assert!(ids.contains(&"build-macos"));
        assert!(ids.contains(&"test-ubuntu"));
        assert!(ids.contains(&"test-macos"));

        let test_ubuntu = expanded.iter().find(|t| t.id == "test-ubuntu").unwrap();
        assert_eq!(test_ubuntu.depends_on, vec!["build-ubuntu".to_string()]);
        let test_macos = expanded.iter().find(|t| t.id == "test-macos").unwrap();
        assert_eq!(test_macos.depends_on, vec!["build-macos".to_string()]);
    }

    #[test]
    fn fan_in_when_dependency_not_expanded() {
        let setup = base_task("setup");
        let mut build = base_task("build");
        build.depends_on = vec!["setup".into()];
        build.matrix = Some(MatrixSpec {
            dimensions: vec![("os".into(), vec!["ubuntu".into(), "macos".into()])],
            include: vec![],
            exclude: vec![],
        });

        let expanded = expand_workflow_tasks(&[setup, build]).unwrap();
        for t in expanded.iter().filter(|t| t.id.starts_with("build")) {
            assert_eq!(t.depends_on, vec!["setup".to_string()]);
        }
    }

    #[test]
    fn exclude_drops_combination() {
        let mut t = base_task("build");
        t.matrix = Some(MatrixSpec {
            dimensions: vec![
                ("os".into(), vec!["ubuntu".into(), "macos".into()]),
                ("arch".into(), vec!["x64".into(), "arm64".into()]),
            ],
            include: vec![],
            exclude: vec![[("os".into(), "macos".into()), ("arch".into(), "x64".into())]
                .into_iter()
                .collect()],
        });
        let expanded = expand_workflow_tasks(std::slice::from_ref(&t)).unwrap();
        assert_eq!(expanded.len(), 3);
    }
}
