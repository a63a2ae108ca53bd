//! Schedule orchestrator: ticks every 60s, launches due schedules in the
//! background, and exposes the same execution path to manual ("run now") dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use waveforge_core::model::{ExecutionPolicy, Workflow, WorkflowSchedule};
use waveforge_exec::{ExecutorDispatcher, OverallStatus, RunOptions, RunSummary, Runner, WebhookNotifier};

use crate::engine::CronExpression;
use crate::error::{ScheduleError, ScheduleResult};
use crate::persistence::SchedulePersistence;

const TICK_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Parses and returns the workflow at `path`. `waveforge-cron` has no YAML dependency of
/// its own (per the crate layout, that belongs to `waveforge-cli`); the orchestrator is
/// handed a loader so it stays decoupled from the parsing format.
pub trait WorkflowLoader: Send + Sync {
    fn load(&self, path: &str) -> ScheduleResult<Arc<Workflow>>;
}

#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    ScheduledRunTriggered { schedule_id: String, workflow_path: String, run_id: String, is_manual: bool },
    ScheduledRunCompleted { schedule_id: String, status: OverallStatus, duration_ms: u64, error: Option<String> },
}

struct RunningJob {
    token: CancellationToken,
    /// `None` for a job driven directly via [`Orchestrator::execute_async`] (the caller
    /// already owns and awaits the future); `Some` for one [`Orchestrator::tick`]
    /// backgrounded, so `shutdown` has something to drain.
    handle: Option<JoinHandle<()>>,
}

/// Owns the running-jobs map, the schedule store, and the machinery to turn a due
/// schedule (or a manual dispatch request) into a real workflow run. Background ticking
/// requires `Arc<Orchestrator>` (see [`Orchestrator::run_ticker`]); every other method
/// works on a bare reference.
pub struct Orchestrator {
    store: Arc<dyn SchedulePersistence>,
    loader: Arc<dyn WorkflowLoader>,
    dispatcher: Arc<ExecutorDispatcher>,
    notifier: Arc<dyn WebhookNotifier>,
    running: DashMap<String, RunningJob>,
    events: broadcast::Sender<OrchestratorEvent>,
    ticker_cancellation: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn SchedulePersistence>,
        loader: Arc<dyn WorkflowLoader>,
        dispatcher: Arc<ExecutorDispatcher>,
        notifier: Arc<dyn WebhookNotifier>,
    ) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            store,
            loader,
            dispatcher,
            notifier,
            running: DashMap::new(),
            events,
            ticker_cancellation: CancellationToken::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Runs the 60-second tick loop until [`Orchestrator::shutdown`] is called. Intended
    /// to be spawned as a background task by the caller (`waveforge-cli`'s
    /// `schedule run` subcommand), which is also why this takes `Arc<Self>`: each due
    /// schedule is launched as its own spawned task and needs a cloneable handle back to
    /// the running-jobs map to remove itself on completion.
    pub async fn run_ticker(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::warn!(error = %e, "schedule tick failed");
                    }
                }
                _ = self.ticker_cancellation.cancelled() => break,
            }
        }
    }

    async fn tick(self: &Arc<Self>) -> ScheduleResult<()> {
        let now = Utc::now();
        for schedule in self.store.get_enabled().await? {
            let due = schedule.next_run_at.map(|next| next <= now).unwrap_or(true);
            if !due {
                continue;
            }
            if !schedule.execution_policy.allow_overlap && self.running.contains_key(&schedule.id) {
                tracing::debug!(schedule_id = %schedule.id, "skipping tick, previous run still in flight");
                continue;
            }
            self.launch(schedule);
        }
        Ok(())
    }

    fn launch(self: &Arc<Self>, schedule: WorkflowSchedule) {
        let schedule_id = schedule.id.clone();
        let cleanup_id = schedule_id.clone();
        let orchestrator = Arc::clone(self);
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            let this = SelfHandle::from(orchestrator.as_ref());
            let _ = this.execute(schedule, task_token, false).await;
            orchestrator.running.remove(&cleanup_id);
        });
        self.running.insert(schedule_id, RunningJob { token, handle: Some(handle) });
    }

    /// `ExecuteAsync`: refuse if already running and overlap isn't allowed,
    /// register in the running-jobs map, emit ScheduledRunTriggered, run the workflow,
    /// persist new run times, emit ScheduledRunCompleted, then remove itself.
    pub async fn execute_async(
        &self,
        schedule: WorkflowSchedule,
        parent_token: CancellationToken,
        is_manual: bool,
    ) -> ScheduleResult<RunSummary> {
        if !schedule.execution_policy.allow_overlap && self.running.contains_key(&schedule.id) {
            return Err(ScheduleError::AlreadyRunning(schedule.id.clone()));
        }
        let schedule_id = schedule.id.clone();
        let token = parent_token.child_token();
        self.running.insert(schedule_id.clone(), RunningJob { token: token.clone(), handle: None });

        let this = SelfHandle::from(self);
        let result = this.execute(schedule, token, is_manual).await;
        self.running.remove(&schedule_id);
        result
    }

    /// Builds a synthetic in-memory schedule (`dispatch-<rand>`) and runs it through the
    /// same path with `isManual=true`. The synthetic schedule's cron expression is
    /// unused — manual dispatch never recomputes `nextRunAt` from it, and its run times
    /// are never persisted to the schedule store.
    pub async fn dispatch_manual(
        &self,
        workflow_path: &str,
        input_parameters: BTreeMap<String, String>,
    ) -> ScheduleResult<String> {
        self.dispatch_manual_with_context(workflow_path, input_parameters, "Manual dispatch".to_string(), "cli".to_string())
            .await
    }

    /// Same as [`Orchestrator::dispatch_manual`], but carries the `reason` and
    /// `triggeredBy` a trigger dispatcher attaches to a match-driven run; both
    /// ride along as additional environment entries rather than as dedicated
    /// `WorkflowSchedule` fields, since the schedule this builds is already synthetic.
    pub async fn dispatch_manual_with_context(
        &self,
        workflow_path: &str,
        mut input_parameters: BTreeMap<String, String>,
        reason: String,
        triggered_by: String,
    ) -> ScheduleResult<String> {
        input_parameters.entry("DISPATCH_REASON".to_string()).or_insert(reason);
        input_parameters.entry("DISPATCH_TRIGGERED_BY".to_string()).or_insert(triggered_by);
        let schedule = WorkflowSchedule {
            id: format!("dispatch-{:08x}", rand::random::<u32>()),
            workflow_path: workflow_path.to_string(),
            cron_expression: "* * * * *".to_string(),
            name: None,
            description: None,
            enabled: true,
            created_at: Utc::now(),
            last_run_at: None,
            next_run_at: None,
            input_parameters,
            execution_policy: ExecutionPolicy { allow_overlap: true, ..ExecutionPolicy::default() },
        };
        let summary = self.execute_async(schedule, CancellationToken::new(), true).await?;
        Ok(summary.run_id)
    }

    /// Stops the tick loop, cancels every running job, then waits up to 30s for the
    /// ticker-launched ones to drain before returning.
    pub async fn shutdown(&self) {
        self.ticker_cancellation.cancel();
        for entry in self.running.iter() {
            entry.value().token.cancel();
        }
        let handles: Vec<JoinHandle<()>> = self
            .running
            .iter_mut()
            .filter_map(|mut e| e.value_mut().handle.take())
            .collect();
        let drain = futures::future::join_all(handles);
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await;
    }
}

/// A cheaply-cloneable bundle of the orchestrator's dependencies, usable from inside a
/// spawned task without borrowing `&Orchestrator` across an `.await`.
#[derive(Clone)]
struct SelfHandle {
    store: Arc<dyn SchedulePersistence>,
    loader: Arc<dyn WorkflowLoader>,
    dispatcher: Arc<ExecutorDispatcher>,
    notifier: Arc<dyn WebhookNotifier>,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl From<&Orchestrator> for SelfHandle {
    fn from(o: &Orchestrator) -> Self {
        Self {
            store: o.store.clone(),
            loader: o.loader.clone(),
            dispatcher: o.dispatcher.clone(),
            notifier: o.notifier.clone(),
            events: o.events.clone(),
        }
    }
}

impl SelfHandle {
    async fn execute(
        &self,
        schedule: WorkflowSchedule,
        token: CancellationToken,
        is_manual: bool,
    ) -> ScheduleResult<RunSummary> {
        let workflow = self
            .loader
            .load(&schedule.workflow_path)
            .map_err(|e| ScheduleError::WorkflowLoad { schedule_id: schedule.id.clone(), reason: e.to_string() })?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let _ = self.events.send(OrchestratorEvent::ScheduledRunTriggered {
            schedule_id: schedule.id.clone(),
            workflow_path: schedule.workflow_path.clone(),
            run_id: run_id.clone(),
            is_manual,
        });

        let runner = Runner::new(&self.dispatcher, self.notifier.as_ref());
        let options = RunOptions {
            run_id: Some(run_id),
            additional_environment: schedule.input_parameters.clone(),
            ..Default::default()
        };

        let run_result = runner.run(workflow, options, token).await;

        let next_run = CronExpression::parse(&schedule.cron_expression).ok().and_then(|c| c.next_occurrence(Utc::now()));
        if !schedule.id.starts_with("dispatch-") {
            let _ = self.store.update_run_times(&schedule.id, Some(Utc::now()), next_run).await;
        }

        match run_result {
            Ok((summary, _publisher)) => {
                let _ = self.events.send(OrchestratorEvent::ScheduledRunCompleted {
                    schedule_id: schedule.id.clone(),
                    status: summary.status,
                    duration_ms: summary.duration_ms,
                    error: None,
                });
                Ok(summary)
            }
            Err(e) => {
                let _ = self.events.send(OrchestratorEvent::ScheduledRunCompleted {
                    schedule_id: schedule.id.clone(),
                    status: OverallStatus::Failed,
                    duration_ms: 0,
                    error: Some(e.to_string()),
                });
                Err(ScheduleError::Core(e))
            }
        }
    }
}
