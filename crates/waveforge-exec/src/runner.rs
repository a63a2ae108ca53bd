//! Workflow Runner: the orchestration entry point. Builds the [`ExecutionPlan`],
//! drives the [`WaveExecutor`] wave by wave, runs always-tasks under an uncancellable
//! token, and emits the workflow-level event stream.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use waveforge_core::error::CoreError;
use waveforge_core::model::Workflow;

use crate::context::WorkflowContext;
use crate::events::{EventPublisher, OverallStatus, WorkflowEvent};
use crate::executor::ExecutorDispatcher;
use crate::wave::{StepGate, StepMode, WaveExecutor};
use crate::webhook::WebhookNotifier;

/// Caller-supplied knobs for one invocation of [`run_workflow`]. Separate from
/// [`Workflow`] because these vary per-run (CLI flags, a retriggered schedule) rather
/// than being part of the parsed document.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub run_id: Option<String>,
    pub working_directory: Option<String>,
    pub params: BTreeMap<String, String>,
    pub additional_environment: BTreeMap<String, String>,
    pub dry_run: bool,
    pub step_mode: bool,
}

/// The final account of one run, returned once the context reaches a terminal state.
/// Mirrors the `WorkflowCompleted` event's payload plus enough detail for `--json`
/// reporting (SPEC_FULL.md's supplemental `RunSummary`).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: OverallStatus,
    pub duration_ms: u64,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub results: Vec<waveforge_core::model::TaskResult>,
}

/// Ties the plan builder, wave executor, context, event publisher and webhook notifier
/// together into the full run lifecycle. One instance per invocation; cheap to build.
pub struct Runner<'a> {
    dispatcher: &'a ExecutorDispatcher,
    notifier: &'a dyn WebhookNotifier,
}

impl<'a> Runner<'a> {
    pub fn new(dispatcher: &'a ExecutorDispatcher, notifier: &'a dyn WebhookNotifier) -> Self {
        Self { dispatcher, notifier }
    }

    /// Drives one full run of `workflow` to completion. `parent_cancellation` is the
    /// caller's token (process Ctrl-C, an orchestrator's per-schedule handle, or
    /// `CancellationToken::new()` for a standalone run); the context links a child of it
    /// as the run-level signal.
    pub async fn run(
        &self,
        workflow: Arc<Workflow>,
        options: RunOptions,
        parent_cancellation: CancellationToken,
    ) -> Result<(RunSummary, EventPublisher), CoreError> {
        let plan = waveforge_core::build_execution_plan(&workflow)?;

        let run_id = options.run_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let working_directory = options
            .working_directory
            .clone()
            .unwrap_or_else(|| ".".to_string());

        let mut declared_env = workflow.env.clone();
        declared_env.extend(options.additional_environment.clone());

        let publisher = EventPublisher::new(workflow.name.clone(), run_id.clone());
        let context = WorkflowContext::new(
            Arc::clone(&workflow),
            run_id.clone(),
            working_directory,
            declared_env,
            options.params.clone(),
            parent_cancellation,
        );

        publisher.publish_workflow(WorkflowEvent::WorkflowStarted { total_tasks: plan.total_tasks() });
        self.notifier
            .register_webhooks(&run_id, &workflow.name, &workflow.webhooks, &publisher)
            .await;

        let summary = if options.dry_run {
            self.run_dry(&plan, &context, &run_id).await
        } else {
            self.run_plan(&plan, &context, &publisher, &run_id, options.step_mode).await
        };

        self.notifier.unregister_webhooks(&run_id).await;
        Ok((summary, publisher))
    }

    async fn run_dry(
        &self,
        plan: &waveforge_core::model::ExecutionPlan,
        context: &WorkflowContext,
        run_id: &str,
    ) -> RunSummary {
        for wave in &plan.waves {
            for task in &wave.tasks {
                context.record_result(waveforge_core::model::TaskResult::pending(&task.id));
            }
        }
        for task in &plan.always_tasks {
            context.record_result(waveforge_core::model::TaskResult::pending(&task.id));
        }
        RunSummary {
            run_id: run_id.to_string(),
            status: OverallStatus::Pending,
            duration_ms: context.elapsed_ms(),
            succeeded: 0,
            failed: 0,
            skipped: 0,
            results: context.ordered_results(),
        }
    }

    async fn run_plan(
        &self,
        plan: &waveforge_core::model::ExecutionPlan,
        context: &WorkflowContext,
        publisher: &EventPublisher,
        run_id: &str,
        step_mode: bool,
    ) -> RunSummary {
        let wave_executor = WaveExecutor::new(self.dispatcher);
        let step_gate = StepGate::default();
        let step_mode = if step_mode { StepMode::On } else { StepMode::Off };
        let run_token = context.run_cancellation_token();
        let max_parallelism = match context.workflow.max_parallelism {
            n if n > 0 => Some(n as usize),
            _ => None,
        };

        if step_mode == StepMode::On {
            publisher.publish_workflow(WorkflowEvent::StepPaused);
            step_gate.wait().await;
            publisher.publish_workflow(WorkflowEvent::StepResumed);
        }

        for (i, wave) in plan.waves.iter().enumerate() {
            if run_token.is_cancelled() {
                break;
            }

            publisher.publish_workflow(WorkflowEvent::WaveStarted { wave_index: i });
            let results = wave_executor
                .run_wave(wave, context, publisher, run_token.clone(), max_parallelism, step_mode, &step_gate)
                .await;

            let succeeded = results.iter().filter(|r| r.status == waveforge_core::model::TaskStatus::Succeeded).count() as u32;
            let failed = results.iter().filter(|r| r.status.is_failed()).count() as u32;
            let skipped = results.iter().filter(|r| r.was_skipped()).count() as u32;
            publisher.publish_workflow(WorkflowEvent::WaveCompleted { wave_index: i, succeeded, failed, skipped });

            if context.workflow.stop_on_first_failure {
                let blocking_failure = wave.tasks.iter().zip(results.iter()).any(|(task, result)| {
                    result.is_failed() && !task.continue_on_error
                });
                if blocking_failure {
                    break;
                }
            }

            let is_last_wave = i + 1 == plan.waves.len();
            if step_mode == StepMode::On && !(is_last_wave && plan.always_tasks.is_empty()) {
                publisher.publish_workflow(WorkflowEvent::StepPaused);
                step_gate.wait().await;
                publisher.publish_workflow(WorkflowEvent::StepResumed);
            }
        }

        if !plan.always_tasks.is_empty() {
            let always_wave = waveforge_core::model::ExecutionWave { index: plan.waves.len(), tasks: plan.always_tasks.clone() };
            // Always-tasks run under a fresh, never-cancelled token: cleanup must
            // proceed even if the run itself was cancelled or failed.
            let uncancellable = CancellationToken::new();
            publisher.publish_workflow(WorkflowEvent::WaveStarted { wave_index: always_wave.index });
            let results = wave_executor
                .run_wave(&always_wave, context, publisher, uncancellable, max_parallelism, StepMode::Off, &step_gate)
                .await;
            let succeeded = results.iter().filter(|r| r.status == waveforge_core::model::TaskStatus::Succeeded).count() as u32;
            let failed = results.iter().filter(|r| r.status.is_failed()).count() as u32;
            let skipped = results.iter().filter(|r| r.was_skipped()).count() as u32;
            publisher.publish_workflow(WorkflowEvent::WaveCompleted { wave_index: always_wave.index, succeeded, failed, skipped });
        }

        let status = context.overall_status();
        if status == OverallStatus::Cancelled {
            publisher.publish_workflow(WorkflowEvent::WorkflowCancelled { reason: "run was cancelled".to_string() });
        }

        let stats = context.stats.snapshot();
        let duration_ms = context.elapsed_ms();
        publisher.publish_workflow(WorkflowEvent::WorkflowCompleted {
            status,
            duration_ms,
            succeeded: stats.succeeded,
            failed: stats.failed,
            skipped: stats.skipped,
        });

        RunSummary {
            run_id: run_id.to_string(),
            status,
            duration_ms,
            succeeded: stats.succeeded,
            failed: stats.failed,
            skipped: stats.skipped,
            results: context.ordered_results(),
        }
    }
}

/// Request a full run cancellation — the public counterpart of
/// [`WorkflowContext::request_run_cancellation`], exposed here so callers that only
/// hold a [`CancellationToken`] (not the context) can still trigger it.
pub fn request_cancellation(token: &CancellationToken) {
    token.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::NoopWebhookNotifier;
    use std::collections::BTreeMap;
    use waveforge_core::model::Task;

    fn task(id: &str, run: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: None,
            run: run.to_string(),
            shell: None,
            working_directory: None,
            env: BTreeMap::new(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            condition: None,
            input: None,
            output: None,
            timeout_ms: Some(5_000),
            continue_on_error: false,
            retry_count: 0,
            retry_delay_ms: 0,
            matrix: None,
            execution_environment: None,
            matrix_values: None,
        }
    }

    fn workflow(tasks: Vec<Task>) -> Workflow {
        Workflow {
            name: "demo".into(),
            description: None,
            tasks,
            env: BTreeMap::new(),
            default_timeout_ms: 5_000,
            default_shell: None,
            webhooks: vec![],
            execution_environment: None,
            watch: None,
            max_parallelism: -1,
            stop_on_first_failure: false,
        }
    }

    #[tokio::test]
    async fn dry_run_marks_every_task_pending_without_executing() {
        let wf = Arc::new(workflow(vec![task("a", "echo hi", &[]), task("b", "echo bye", &["a"])]));
        let dispatcher = ExecutorDispatcher::default();
        let notifier = NoopWebhookNotifier;
        let runner = Runner::new(&dispatcher, &notifier);

        let options = RunOptions { dry_run: true, ..Default::default() };
        let (summary, _publisher) = runner.run(wf, options, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.results.len(), 2);
        assert!(summary
            .results
            .iter()
            .all(|r| r.status == waveforge_core::model::TaskStatus::Pending));
    }

    #[tokio::test]
    async fn real_run_executes_tasks_and_reaches_a_terminal_status() {
        let wf = Arc::new(workflow(vec![task("a", "echo hi", &[])]));
        let dispatcher = ExecutorDispatcher::default();
        let notifier = NoopWebhookNotifier;
        let runner = Runner::new(&dispatcher, &notifier);

        let (summary, _publisher) = runner.run(wf, RunOptions::default(), CancellationToken::new()).await.unwrap();

        assert_eq!(summary.results.len(), 1);
        assert_ne!(summary.status, OverallStatus::Pending);
    }

    #[tokio::test]
    async fn always_task_runs_even_after_a_prior_failure() {
        let mut cleanup = task("cleanup", "echo cleaned", &[]);
        cleanup.condition = Some("${{ always() }}".to_string());
        let wf = Arc::new(workflow(vec![task("main", "exit 1", &[]), cleanup]));
        let dispatcher = ExecutorDispatcher::default();
        let notifier = NoopWebhookNotifier;
        let runner = Runner::new(&dispatcher, &notifier);

        let (summary, _publisher) = runner.run(wf, RunOptions::default(), CancellationToken::new()).await.unwrap();

        assert_eq!(summary.status, OverallStatus::Failed);
        let cleanup_result = summary.results.iter().find(|r| r.task_id == "cleanup").unwrap();
        assert_eq!(cleanup_result.status, waveforge_core::model::TaskStatus::Succeeded);
    }
}
