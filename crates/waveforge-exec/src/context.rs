//! Workflow Context: the one piece of shared mutable state for a run. Owned
//! exclusively by the Runner; readers (the expression evaluator, templates) see it by
//! shared reference. Backed by `dashmap`/`parking_lot`, a single concurrent map or
//! lock per piece of shared state rather than one coarse mutex around everything.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use waveforge_core::expr::{EvalContext, TaskResultView};
use waveforge_core::model::{TaskResult, TaskStatus, Workflow};

use crate::events::OverallStatus;

/// Atomic counters for succeeded/failed/skipped/totalCompleted plus a running task
/// index. Exactly one `increment_*` fires per task outcome.
#[derive(Debug, Default)]
pub struct ExecutionStats {
    succeeded: AtomicU32,
    failed: AtomicU32,
    skipped: AtomicU32,
    total_completed: AtomicU32,
    next_task_index: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub total_completed: u32,
}

impl ExecutionStats {
    pub fn increment_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.total_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.total_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.total_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            total_completed: self.total_completed.load(Ordering::SeqCst),
        }
    }

    /// Monotonically increasing index assigned once per task *attempt* (a retried
    /// task receives a fresh index on re-invocation; see SPEC_FULL.md open-question
    /// decision #1).
    pub fn next_task_index(&self) -> u64 {
        self.next_task_index.fetch_add(1, Ordering::SeqCst)
    }
}

/// Shared state for exactly one run of one workflow.
pub struct WorkflowContext {
    pub workflow: Arc<Workflow>,
    pub run_id: String,
    pub working_directory: String,
    /// Declared environment: workflow defaults + CLI `-e`/`--param` overrides. Consulted
    /// by the expression layer's `env.*` so containerized runs don't leak host env.
    pub declared_env: BTreeMap<String, String>,
    /// Declared env merged with the host's process environment (declared wins ties);
    /// this is what's actually exported to a spawned child.
    pub full_env: BTreeMap<String, String>,
    pub params: BTreeMap<String, String>,

    results: DashMap<String, TaskResult>,
    result_order: RwLock<Vec<String>>,
    task_cancellation: DashMap<String, CancellationToken>,
    run_cancellation: CancellationToken,
    cancelled: std::sync::atomic::AtomicBool,
    pub stats: ExecutionStats,
    started_at: std::time::Instant,
}

impl WorkflowContext {
    pub fn new(
        workflow: Arc<Workflow>,
        run_id: impl Into<String>,
        working_directory: impl Into<String>,
        declared_env: BTreeMap<String, String>,
        params: BTreeMap<String, String>,
        parent_cancellation: CancellationToken,
    ) -> Self {
        let mut full_env: BTreeMap<String, String> = std::env::vars().collect();
        full_env.extend(declared_env.clone());
        Self {
            workflow,
            run_id: run_id.into(),
            working_directory: working_directory.into(),
            declared_env,
            full_env,
            params,
            results: DashMap::new(),
            result_order: RwLock::new(Vec::new()),
            task_cancellation: DashMap::new(),
            run_cancellation: parent_cancellation.child_token(),
            cancelled: std::sync::atomic::AtomicBool::new(false),
            stats: ExecutionStats::default(),
            started_at: std::time::Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    // --- results registry ---

    pub fn record_result(&self, result: TaskResult) {
        if !self.results.contains_key(&result.task_id) {
            self.result_order.write().push(result.task_id.clone());
        }
        self.results.insert(result.task_id.clone(), result);
    }

    pub fn result(&self, task_id: &str) -> Option<TaskResult> {
        self.results.get(task_id).map(|r| r.clone())
    }

    /// Results in the order tasks first completed, for reporting.
    pub fn ordered_results(&self) -> Vec<TaskResult> {
        self.result_order
            .read()
            .iter()
            .filter_map(|id| self.results.get(id).map(|r| r.clone()))
            .collect()
    }

    // --- per-task cancellation ---

    /// Returns (and caches) a cancellation handle linked as a child of `parent` — the
    /// run-level token for a normal wave, or a fresh uncancellable token for the
    /// always-tasks wave. Calling this again for a retried task mints a fresh handle;
    /// since the new token is a child of `parent` rather than of any
    /// previous handle, requesting cancellation on the stale handle has no effect on it.
    pub fn get_or_create_task_cancellation(&self, task_id: &str, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        self.task_cancellation.insert(task_id.to_string(), token.clone());
        token
    }

    pub fn request_task_cancellation(&self, task_id: &str) {
        if let Some(token) = self.task_cancellation.get(task_id) {
            token.cancel();
        }
    }

    pub fn remove_task_cancellation(&self, task_id: &str) {
        self.task_cancellation.remove(task_id);
    }

    // --- run cancellation ---

    pub fn run_cancellation_token(&self) -> CancellationToken {
        self.run_cancellation.clone()
    }

    pub fn request_run_cancellation(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.run_cancellation.cancel();
    }

    /// True once either `request_run_cancellation` marked the context directly, or the
    /// run-level token was cancelled some other way (e.g. the runner observing its
    /// caller-supplied token firing). Checking the token too means a Ctrl-C propagated
    /// through `run_cancellation_token()` is visible here even if nothing ever called
    /// `request_run_cancellation` explicitly.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.run_cancellation.is_cancelled()
    }

    // --- dependency predicates ---

    pub fn dependencies_succeeded(&self, deps: &[String]) -> bool {
        deps.iter().all(|d| {
            self.results
                .get(d)
                .map(|r| r.status == TaskStatus::Succeeded)
                .unwrap_or(false)
        })
    }

    pub fn dependencies_failed(&self, deps: &[String]) -> bool {
        deps.iter().any(|d| {
            self.results.get(d).map(|r| r.status.is_failed()).unwrap_or(false)
        })
    }

    pub fn has_failure(&self) -> bool {
        self.results.iter().any(|r| r.is_failed())
    }

    pub fn all_succeeded(&self) -> bool {
        let mut any_succeeded = false;
        for r in self.results.iter() {
            if r.status == TaskStatus::Succeeded {
                any_succeeded = true;
            } else if r.status != TaskStatus::Skipped {
                return false;
            }
        }
        any_succeeded
    }

    /// Overall run status derivation: explicit cancellation wins, then any
    /// failure, then success-if-any-succeeded, else pending.
    pub fn overall_status(&self) -> OverallStatus {
        if self.is_cancelled() {
            OverallStatus::Cancelled
        } else if self.has_failure() {
            OverallStatus::Failed
        } else if self.all_succeeded() {
            OverallStatus::Succeeded
        } else {
            OverallStatus::Pending
        }
    }
}

/// Adapts [`WorkflowContext`] to the core crate's expression-evaluation contract, so
/// `waveforge-core` never needs to know this crate exists.
pub struct ContextEvalAdapter<'a> {
    pub context: &'a WorkflowContext,
    pub matrix_values: &'a BTreeMap<String, String>,
}

impl<'a> EvalContext for ContextEvalAdapter<'a> {
    fn task_result(&self, task_id: &str) -> Option<TaskResultView> {
        self.context.result(task_id).map(|r| TaskResultView {
            status: r.status,
            output: r.output.unwrap_or_default(),
            stderr: r.stderr.unwrap_or_default(),
            exit_code: r.exit_code,
            duration_ms: r.duration_ms,
        })
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.context.declared_env.get(name).cloned()
    }

    fn workflow_field(&self, field: &str) -> Option<String> {
        let wf = &self.context.workflow;
        Some(match field {
            "name" => wf.name.clone(),
            "id" => wf.name.clone(),
            "runid" => self.context.run_id.clone(),
            "workingdirectory" => self.context.working_directory.clone(),
            "description" => wf.description.clone().unwrap_or_default(),
            "taskcount" => wf.tasks.len().to_string(),
            "elapsedms" => self.context.elapsed_ms().to_string(),
            _ => return None,
        })
    }

    fn matrix_value(&self, key: &str) -> Option<String> {
        self.matrix_values.get(key).cloned()
    }

    fn param(&self, name: &str) -> Option<String> {
        self.context.params.get(name).cloned()
    }

    fn is_cancelled(&self) -> bool {
        self.context.is_cancelled()
    }
}
