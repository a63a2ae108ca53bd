//! Wave Executor: runs one [`ExecutionWave`] in parallel (default) or step mode,
//! merging the run-level and per-task cancellation signals, and registers every
//! completed [`TaskResult`] back into the [`WorkflowContext`].

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use waveforge_core::model::{ExecutionWave, Task, TaskStatus};

use crate::context::WorkflowContext;
use crate::events::{EventPublisher, TaskEvent};
use crate::executor::{resolve_effective_environment, ExecutorDispatcher};

/// What the caller asked the Wave Executor to do after each task completes, in step
/// mode: pause for external release, or keep going immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    Off,
    On,
}

/// A single-slot latch the UI releases, backed by a semaphore initialized empty.
#[derive(Clone)]
pub struct StepGate {
    semaphore: Arc<Semaphore>,
}

impl Default for StepGate {
    fn default() -> Self {
        Self { semaphore: Arc::new(Semaphore::new(0)) }
    }
}

impl StepGate {
    /// Blocks until `release` is called once.
    pub async fn wait(&self) {
        let permit = self.semaphore.acquire().await.expect("semaphore never closed");
        permit.forget();
    }

    /// Unblocks exactly one pending `wait`.
    pub fn release(&self) {
        self.semaphore.add_permits(1);
    }
}

pub struct WaveExecutor<'a> {
    dispatcher: &'a ExecutorDispatcher,
}

impl<'a> WaveExecutor<'a> {
    pub fn new(dispatcher: &'a ExecutorDispatcher) -> Self {
        Self { dispatcher }
    }

    /// Run every task in `wave` (or the synthetic always-tasks wave), honoring
    /// `max_parallelism` (a semaphore bound on concurrent launches; `None` = unbounded)
    /// and the supplied step-mode gate. `run_token` is the signal each task's combined
    /// cancellation token links against — pass a non-cancellable token for always-tasks,
    /// which must run regardless of the run's cancellation state.
    pub async fn run_wave(
        &self,
        wave: &ExecutionWave,
        context: &WorkflowContext,
        publisher: &EventPublisher,
        run_token: CancellationToken,
        max_parallelism: Option<usize>,
        step_mode: StepMode,
        step_gate: &StepGate,
    ) -> Vec<waveforge_core::model::TaskResult> {
        if step_mode == StepMode::On {
            return self.run_sequential(&wave.tasks, context, publisher, run_token, step_gate).await;
        }
        self.run_parallel(&wave.tasks, context, publisher, run_token, max_parallelism).await
    }

    async fn run_parallel(
        &self,
        tasks: &[Task],
        context: &WorkflowContext,
        publisher: &EventPublisher,
        run_token: CancellationToken,
        max_parallelism: Option<usize>,
    ) -> Vec<waveforge_core::model::TaskResult> {
        let semaphore = max_parallelism.map(|n| Arc::new(Semaphore::new(n.max(1))));

        let futures = tasks.iter().map(|task| {
            let semaphore = semaphore.clone();
            let run_token = run_token.clone();
            async move {
                let _permit = match &semaphore {
                    Some(sem) => Some(sem.acquire().await.expect("semaphore never closed")),
                    None => None,
                };
                self.run_one_task(task, context, publisher, run_token).await
            }
        });

        futures::future::join_all(futures).await
    }

    async fn run_sequential(
        &self,
        tasks: &[Task],
        context: &WorkflowContext,
        publisher: &EventPublisher,
        run_token: CancellationToken,
        step_gate: &StepGate,
    ) -> Vec<waveforge_core::model::TaskResult> {
        let mut results = Vec::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            let result = self.run_one_task(task, context, publisher, run_token.clone()).await;
            results.push(result);
            if i + 1 < tasks.len() {
                publisher.publish_workflow(crate::events::WorkflowEvent::StepPaused);
                step_gate.wait().await;
                publisher.publish_workflow(crate::events::WorkflowEvent::StepResumed);
            }
        }
        results
    }

    async fn run_one_task(
        &self,
        task: &Task,
        context: &WorkflowContext,
        publisher: &EventPublisher,
        run_token: CancellationToken,
    ) -> waveforge_core::model::TaskResult {
        // A child of `run_token`: cancelling it (via `request_task_cancellation`) only
        // ever affects this task, never its siblings or the run; cancelling `run_token`
        // itself cascades down into it, merging per-task cancellation with the run's.
        let per_task_token = context.get_or_create_task_cancellation(&task.id, &run_token);

        let env = resolve_effective_environment(
            context.workflow.execution_environment.as_ref(),
            task.execution_environment.as_ref(),
        );
        let executor = self.dispatcher.select(&env);
        tracing::debug!(task_id = %task.id, executor = executor.name(), "dispatching task");

        let task_index = context.stats.next_task_index();
        let result = executor.execute(task, context, publisher, task_index, per_task_token).await;

        context.remove_task_cancellation(&task.id);
        context.record_result(result.clone());

        match result.status {
            TaskStatus::Succeeded => context.stats.increment_succeeded(),
            TaskStatus::Skipped => {
                context.stats.increment_skipped();
                publisher.publish_task(TaskEvent::TaskSkipped {
                    task_id: task.id.clone(),
                    reason: result.error.clone().unwrap_or_default(),
                });
                return result;
            }
            TaskStatus::Cancelled => {
                context.stats.increment_failed();
                publisher.publish_task(TaskEvent::TaskCancelled {
                    task_id: task.id.clone(),
                    reason: result.error.clone().unwrap_or_default(),
                });
                return result;
            }
            _ => context.stats.increment_failed(),
        }

        publisher.publish_task(TaskEvent::TaskCompleted { task_id: task.id.clone(), result: result.clone() });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkflowContext;
    use crate::executor::ExecutorDispatcher;
    use std::collections::BTreeMap;
    use waveforge_core::model::Workflow;

    fn task(id: &str, run: &str) -> Task {
        Task {
            id: id.to_string(),
            name: None,
            run: run.to_string(),
            shell: None,
            working_directory: None,
            env: BTreeMap::new(),
            depends_on: vec![],
            condition: None,
            input: None,
            output: None,
            timeout_ms: Some(2_000),
            continue_on_error: false,
            retry_count: 0,
            retry_delay_ms: 0,
            matrix: None,
            execution_environment: None,
            matrix_values: None,
        }
    }

    fn context_with(tasks: Vec<Task>) -> WorkflowContext {
        let workflow = Workflow {
            name: "t".into(),
            description: None,
            tasks,
            env: BTreeMap::new(),
            default_timeout_ms: 2_000,
            default_shell: None,
            webhooks: vec![],
            execution_environment: None,
            watch: None,
            max_parallelism: -1,
            stop_on_first_failure: false,
        };
        WorkflowContext::new(
            std::sync::Arc::new(workflow),
            "run-1",
            ".",
            BTreeMap::new(),
            BTreeMap::new(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn run_wave_parallel_executes_every_task_and_records_results() {
        let tasks = vec![task("a", "echo a"), task("b", "echo b")];
        let context = context_with(tasks.clone());
        let dispatcher = ExecutorDispatcher::default();
        let executor = WaveExecutor::new(&dispatcher);
        let publisher = EventPublisher::new("wf", "run-1");
        let wave = ExecutionWave { index: 0, tasks };

        let results = executor
            .run_wave(&wave, &context, &publisher, context.run_cancellation_token(), None, StepMode::Off, &StepGate::default())
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == TaskStatus::Succeeded));
        assert_eq!(context.ordered_results().len(), 2);
    }

    #[tokio::test]
    async fn run_wave_bounds_concurrency_with_max_parallelism() {
        let tasks = vec![task("a", "echo a"), task("b", "echo b"), task("c", "echo c")];
        let context = context_with(tasks.clone());
        let dispatcher = ExecutorDispatcher::default();
        let executor = WaveExecutor::new(&dispatcher);
        let publisher = EventPublisher::new("wf", "run-1");
        let wave = ExecutionWave { index: 0, tasks };

        let results = executor
            .run_wave(&wave, &context, &publisher, context.run_cancellation_token(), Some(1), StepMode::Off, &StepGate::default())
            .await;

        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn step_gate_blocks_until_released() {
        let gate = StepGate::default();
        let gate2 = gate.clone();
        let waiter = tokio::spawn(async move {
            gate2.wait().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        gate.release();
        waiter.await.unwrap();
    }
}
