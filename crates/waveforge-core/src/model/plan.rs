use super::task::Task;

/// A maximal subset of tasks whose dependencies have all been scheduled in
/// earlier waves; the tasks within one wave may run concurrently.
#[derive(Debug, Clone)]
pub struct ExecutionWave {
    pub index: usize,
    pub tasks: Vec<Task>,
}

/// The output of the DAG scheduler: an ordered list of waves plus the
/// tasks siphoned off as always-tasks, which run in a synthetic final wave
/// regardless of upstream outcome.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub waves: Vec<ExecutionWave>,
    pub always_tasks: Vec<Task>,
}

impl ExecutionPlan {
    pub fn total_tasks(&self) -> usize {
        self.waves.iter().map(|w| w.tasks.len()).sum::<usize>() + self.always_tasks.len()
    }

    pub fn is_dry(&self) -> bool {
        self.total_tasks() == 0
    }
}
