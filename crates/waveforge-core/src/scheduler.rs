//! DAG scheduler: assigns expanded tasks to waves by longest-path level.

use std::collections::HashMap;

use crate::model::{ExecutionPlan, ExecutionWave, Task};

/// Build an [`ExecutionPlan`] from the already-expanded, already-cycle-checked task
/// list. Always-tasks (`if` containing `always()`) are siphoned off into a synthetic
/// final wave rather than leveled.
pub fn build_plan(tasks: &[Task]) -> ExecutionPlan {
    let (regular, always): (Vec<Task>, Vec<Task>) =
        tasks.iter().cloned().partition(|t| !t.is_always_task());

    let mut level_by_id: HashMap<String, i64> = HashMap::new();
    let by_id: HashMap<&str, &Task> = regular.iter().map(|t| (t.id.as_str(), t)).collect();

    for task in &regular {
        compute_level(task.id.as_str(), &by_id, &mut level_by_id);
    }

    let max_level = level_by_id.values().copied().max().unwrap_or(-1);
    let mut waves: Vec<ExecutionWave> = Vec::new();
    if max_level >= 0 {
        for level in 0..=max_level {
            let tasks_at_level: Vec<Task> = regular
                .iter()
                .filter(|t| level_by_id.get(t.id.as_str()).copied().unwrap_or(0) == level)
                .cloned()
                .collect();
            if !tasks_at_level.is_empty() {
                waves.push(ExecutionWave {
                    index: waves.len(),
                    tasks: tasks_at_level,
                });
            }
        }
    }

    ExecutionPlan {
        waves,
        always_tasks: always,
    }
}

fn compute_level<'a>(
    id: &'a str,
    by_id: &HashMap<&'a str, &'a Task>,
    memo: &mut HashMap<String, i64>,
) -> i64 {
    if let Some(&level) = memo.get(id) {
        return level;
    }
    // Guard against a dependency cycle slipping through (should have been rejected by
    // the cycle detector already): treat a self-referential lookup as level 0.
    memo.insert(id.to_string(), 0);

    let Some(task) = by_id.get(id) else {
        // Missing-dependency reference inside an expanded task: safeguard default.
        memo.insert(id.to_string(), 0);
        return 0;
    };

    let mut max_dep_level: i64 = -1;
    for dep in &task.depends_on {
        let dep_key = by_id.keys().find(|k| k.eq_ignore_ascii_case(dep)).copied();
        let dep_level = match dep_key {
            Some(key) => compute_level(key, by_id, memo),
            None => 0,
        };
        max_dep_level = max_dep_level.max(dep_level);
    }

    let level = max_dep_level + 1;
    memo.insert(id.to_string(), level);
    level
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn task(id: &str, deps: &[&str], always: bool) -> Task {
        Task {
            id: id.to_string(),
            name: None,
            run: "echo hi".to_string(),
            shell: None,
            working_directory: None,
            env: BTreeMap::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            condition: if always { Some("${{ always() }}".to_string()) } else { None },
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
    fn sequential_chain_produces_three_waves() {
        let tasks = vec![
            task("a", &[], false),
            task("b", &["a"], false),
            task("c", &["b"], false),
        ];
        let plan = build_plan(&tasks);
        assert_eq!(plan.waves.len(), 3);
        for wave in &plan.waves {
            assert_eq!(wave.tasks.len(), 1);
        }
    }

    #[test]
    fn diamond_produces_three_waves_with_parallel_middle() {
        let tasks = vec![
            task("root", &[], false),
            task("l", &["root"], false),
            task("r", &["root"], false),
            task("join", &["l", "r"], false),
        ];
        let plan = build_plan(&tasks);
        assert_eq!(plan.waves.len(), 3);
        assert_eq!(plan.waves[1].tasks.len(), 2);
    }

    #[test]
    fn always_tasks_are_not_leveled() {
        let tasks = vec![task("main", &[], false), task("cleanup", &[], true)];
        let plan = build_plan(&tasks);
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.always_tasks.len(), 1);
        assert_eq!(plan.always_tasks[0].id, "cleanup");
    }
}
