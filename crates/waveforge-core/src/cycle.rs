//! Cycle detection: standard three-color DFS run on the original, pre-expansion
//! task list so a cyclic workflow fails cheaply before the (more expensive) matrix
//! expansion pass runs.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::model::Task;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Returns `Ok(())` if `tasks` has no dependency cycle, else a [`CoreError::CircularDependency`]
/// naming one concrete cycle path (e.g. `a -> c -> b -> a`).
pub fn check_cycles(tasks: &[Task]) -> Result<(), CoreError> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let mut colors: HashMap<&str, Color> = tasks.iter().map(|t| (t.id.as_str(), Color::White)).collect();
    let mut stack: Vec<&str> = Vec::new();

    for task in tasks {
        if colors[task.id.as_str()] == Color::White {
            visit(task.id.as_str(), &by_id, &mut colors, &mut stack)?;
        }
    }
    Ok(())
}

fn visit<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a Task>,
    colors: &mut HashMap<&'a str, Color>,
    stack: &mut Vec<&'a str>,
) -> Result<(), CoreError> {
    colors.insert(id, Color::Gray);
    stack.push(id);

    if let Some(task) = by_id.get(id) {
        for dep in &task.depends_on {
            let dep_id = dep.as_str();
            let Some(&dep_key) = by_id.keys().find(|k| k.eq_ignore_ascii_case(dep_id)) else {
                continue; // missing deps are a separate validation concern, not a cycle
            };
            match colors.get(dep_key).copied().unwrap_or(Color::White) {
                Color::White => visit(dep_key, by_id, colors, stack)?,
                Color::Gray => {
                    let cycle_start = stack.iter().position(|&s| s == dep_key).unwrap_or(0);
                    let mut path: Vec<&str> = stack[cycle_start..].to_vec();
                    path.push(dep_key);
                    return Err(CoreError::CircularDependency {
                        path: path.join(" -> "),
                    });
                }
                Color::Black => {}
            }
        }
    }

    stack.pop();
    colors.insert(id, Color::Black);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
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
    fn no_cycle_in_diamond() {
        let tasks = vec![
            task("root", &[]),
            task("l", &["root"]),
            task("r", &["root"]),
            task("join", &["l", "r"]),
        ];
        assert!(check_cycles(&tasks).is_ok());
    }

    #[test]
    fn detects_cycle() {
        let tasks = vec![task("a", &["b"]), task("b", &["c"]), task("c", &["a"])];
        let err = check_cycles(&tasks).unwrap_err();
        match err {
            CoreError::CircularDependency { path } => {
                assert!(path.contains("a"));
                assert!(path.contains("b"));
                assert!(path.contains("c"));
            }
            _ => panic!("expected CircularDependency"),
        }
    }
}
