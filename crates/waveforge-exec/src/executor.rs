//! Task Executor: the contract the Wave Executor consumes, plus three concrete
//! implementations (Local, Docker, SSH). All three share one
//! attempt/retry/timeout/streaming loop (`run_attempts`) and differ only in how they
//! turn an interpolated shell command into a [`tokio::process::Command`] — a small
//! interface plus a dispatch table, rather than an inheritance hierarchy.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use waveforge_core::expr::Evaluator;
use waveforge_core::model::{
    DockerTarget, ExecutionEnvironmentConfig, ExecutionEnvironmentOverride, SshTarget, Task,
    TaskInput, TaskResult, TaskStatus,
};

use crate::context::{ContextEvalAdapter, WorkflowContext};
use crate::events::{EventPublisher, OutputStream, TaskEvent};

/// The workflow- and task-level [`ExecutionEnvironmentOverride`]s merged field-by-field,
/// with the task's override winning over the workflow's.
#[derive(Debug, Clone, Default)]
pub struct EffectiveEnvironment {
    pub disabled: bool,
    pub docker: Option<DockerTarget>,
    pub ssh: Option<SshTarget>,
}

pub fn resolve_effective_environment(
    workflow_level: Option<&ExecutionEnvironmentConfig>,
    task_level: Option<&ExecutionEnvironmentOverride>,
) -> EffectiveEnvironment {
    let mut effective = workflow_level
        .map(|c| EffectiveEnvironment {
            disabled: c.disabled,
            docker: c.docker.clone(),
            ssh: c.ssh.clone(),
        })
        .unwrap_or_default();
    if let Some(task_override) = task_level {
        if task_override.disabled {
            effective.disabled = true;
        }
        if task_override.docker.is_some() {
            effective.docker = task_override.docker.clone();
        }
        if task_override.ssh.is_some() {
            effective.ssh = task_override.ssh.clone();
        }
    }
    effective
}

/// `Execute(task, context, progress, token) -> TaskResult`, with `progress`
/// realized as the run's [`EventPublisher`] (this crate already owns both, so there is
/// no need for a separate callback type).
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Lower wins when more than one implementation's `applies` returns true for the
    /// same task (SSH=10, Docker=20, Local=100).
    fn priority(&self) -> u32;

    fn applies(&self, env: &EffectiveEnvironment) -> bool;

    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        task: &Task,
        context: &WorkflowContext,
        publisher: &EventPublisher,
        task_index: u64,
        token: CancellationToken,
    ) -> TaskResult;
}

/// Picks the lowest-priority [`TaskExecutor`] whose `applies` matches the task's
/// effective environment. Always has a fallback: `Local` applies unconditionally.
pub struct ExecutorDispatcher {
    executors: Vec<Box<dyn TaskExecutor>>,
}

impl Default for ExecutorDispatcher {
    fn default() -> Self {
        let mut executors: Vec<Box<dyn TaskExecutor>> = vec![
            Box::new(SshExecutor),
            Box::new(DockerExecutor),
            Box::new(LocalExecutor),
        ];
        executors.sort_by_key(|e| e.priority());
        Self { executors }
    }
}

impl ExecutorDispatcher {
    pub fn select(&self, env: &EffectiveEnvironment) -> &dyn TaskExecutor {
        self.executors
            .iter()
            .find(|e| e.applies(env))
            .map(|b| b.as_ref())
            .expect("LocalExecutor applies unconditionally")
    }
}

/// Shared preamble every implementation runs before touching a process: evaluate
/// `if`/dependency-skip, and if the task should run, interpolate `run` and env. Returns
/// `Err(result)` with a ready-made Skipped result when the task should not execute.
fn evaluate_should_run(task: &Task, context: &WorkflowContext) -> Result<(), TaskResult> {
    let evaluator = Evaluator::new();
    let matrix_values = task.matrix_values.clone().unwrap_or_default();
    let adapter = ContextEvalAdapter { context, matrix_values: &matrix_values };

    if let Some(condition) = &task.condition {
        let allowed = evaluator
            .evaluate_condition(condition, &adapter, &task.depends_on)
            .unwrap_or(false);
        if !allowed {
            return Err(skipped(task, "condition not met"));
        }
        return Ok(());
    }

    if !context.dependencies_succeeded(&task.depends_on) && !task.depends_on.is_empty() {
        return Err(skipped(task, "a dependency did not succeed"));
    }
    Ok(())
}

fn skipped(task: &Task, reason: &str) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        status: TaskStatus::Skipped,
        exit_code: None,
        output: None,
        stderr: None,
        raw_output: None,
        output_truncated: false,
        started_at: Utc::now(),
        ended_at: Some(Utc::now()),
        duration_ms: 0,
        error: Some(reason.to_string()),
    }
}

fn interpolate_task(task: &Task, context: &WorkflowContext) -> Result<(String, BTreeMap<String, String>), TaskResult> {
    let evaluator = Evaluator::new();
    let matrix_values = task.matrix_values.clone().unwrap_or_default();
    let adapter = ContextEvalAdapter { context, matrix_values: &matrix_values };

    let run = evaluator
        .interpolate(&task.run, &adapter, &task.depends_on)
        .map_err(|e| failed(task, &format!("failed to interpolate run command: {e}")))?;

    let mut env = context.declared_env.clone();
    env.extend(task.env.clone());
    let mut interpolated_env = BTreeMap::new();
    for (k, v) in &env {
        let value = evaluator
            .interpolate(v, &adapter, &task.depends_on)
            .map_err(|e| failed(task, &format!("failed to interpolate env '{k}': {e}")))?;
        interpolated_env.insert(k.clone(), value);
    }
    Ok((run, interpolated_env))
}

fn failed(task: &Task, message: &str) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        status: TaskStatus::Failed,
        exit_code: None,
        output: None,
        stderr: None,
        raw_output: None,
        output_truncated: false,
        started_at: Utc::now(),
        ended_at: Some(Utc::now()),
        duration_ms: 0,
        error: Some(message.to_string()),
    }
}

/// Resolve a task's [`TaskInput`] into bytes to write to the child's stdin, or `None`
/// for a closed stdin.
async fn resolve_stdin(task: &Task, context: &WorkflowContext) -> Result<Option<Vec<u8>>, TaskResult> {
    match task.input.clone().unwrap_or(TaskInput::None) {
        TaskInput::None => Ok(None),
        TaskInput::Text { value } => Ok(Some(value.into_bytes())),
        TaskInput::Bytes { value } => {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD
                .decode(&value)
                .map(Some)
                .map_err(|e| failed(task, &format!("invalid base64 input: {e}")))
        }
        TaskInput::File { path } => tokio::fs::read(&path)
            .await
            .map(Some)
            .map_err(|e| failed(task, &format!("failed to read input file '{path}': {e}"))),
        TaskInput::Pipe { expression } => {
            let evaluator = Evaluator::new();
            let matrix_values = task.matrix_values.clone().unwrap_or_default();
            let adapter = ContextEvalAdapter { context, matrix_values: &matrix_values };
            let resolved = evaluator
                .interpolate(&expression, &adapter, &task.depends_on)
                .map_err(|e| failed(task, &format!("failed to resolve pipe expression: {e}")))?;
            Ok(Some(resolved.into_bytes()))
        }
    }
}

/// The shared attempt loop: evaluate skip, interpolate, resolve input, then retry up to
/// `task.retry_count` times, honoring timeout and cancellation at every attempt. Each
/// implementation supplies `build_command`, which turns the interpolated run string (and
/// environment) into a concrete child process invocation.
async fn run_attempts<F>(
    task: &Task,
    context: &WorkflowContext,
    publisher: &EventPublisher,
    task_index: u64,
    token: CancellationToken,
    build_command: F,
) -> TaskResult
where
    F: Fn(&str, &BTreeMap<String, String>) -> Command,
{
    if let Err(skip) = evaluate_should_run(task, context) {
        return skip;
    }

    let (run, env) = match interpolate_task(task, context) {
        Ok(pair) => pair,
        Err(err) => return err,
    };

    let stdin_bytes = match resolve_stdin(task, context).await {
        Ok(bytes) => bytes,
        Err(err) => return err,
    };

    let timeout = Duration::from_millis(task.timeout_ms.unwrap_or(context.workflow.default_timeout_ms));
    let max_attempts = task.retry_count + 1;
    let started_at = Utc::now();
    let mut last_result: Option<TaskResult> = None;

    for attempt in 0..max_attempts {
        if token.is_cancelled() {
            return cancelled(task, started_at);
        }

        publisher.publish_task(TaskEvent::TaskStarted {
            task_id: task.id.clone(),
            task_index,
            attempt,
        });

        let command = build_command(&run, &env);
        let attempt_result = run_one_attempt(
            task,
            command,
            stdin_bytes.clone(),
            timeout,
            token.clone(),
            publisher,
            started_at,
        )
        .await;

        let is_success = attempt_result.status == TaskStatus::Succeeded;
        let was_cancelled = attempt_result.status == TaskStatus::Cancelled;
        last_result = Some(attempt_result);

        if is_success || was_cancelled {
            break;
        }
        if attempt + 1 < max_attempts {
            tracing::debug!(task_id = %task.id, attempt, "task attempt failed, retrying after delay");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(task.retry_delay_ms)) => {}
                _ = token.cancelled() => {
                    last_result = Some(cancelled(task, started_at));
                    break;
                }
            }
        }
    }

    last_result.expect("loop runs at least once")
}

fn cancelled(task: &Task, started_at: chrono::DateTime<Utc>) -> TaskResult {
    let ended_at = Utc::now();
    TaskResult {
        task_id: task.id.clone(),
        status: TaskStatus::Cancelled,
        exit_code: Some(-1),
        output: None,
        stderr: None,
        raw_output: None,
        output_truncated: false,
        started_at,
        ended_at: Some(ended_at),
        duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
        error: Some("Task was cancelled".to_string()),
    }
}

async fn run_one_attempt(
    task: &Task,
    mut command: Command,
    stdin_bytes: Option<Vec<u8>>,
    timeout: Duration,
    token: CancellationToken,
    publisher: &EventPublisher,
    started_at: chrono::DateTime<Utc>,
) -> TaskResult {
    let output_config = task.output.clone().unwrap_or_default();

    command
        .stdin(if stdin_bytes.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return failed_at(task, started_at, &format!("failed to spawn task: {e}"));
        }
    };

    if let (Some(bytes), Some(mut stdin)) = (stdin_bytes, child.stdin.take()) {
        let _ = stdin.write_all(&bytes).await;
        drop(stdin);
    }

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let mut captured_stdout = Vec::new();
    let mut captured_stderr = Vec::new();
    let mut truncated = false;
    let max_bytes = output_config.max_size_bytes;

    let pump = async {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_done = false;
        let mut stderr_done = false;
        // Both pipes are always drained and streamed to `progress` regardless of
        // `capture_stderr` (§4.4: streaming is unconditional, only result capture isn't);
        // leaving either pipe unread would also fill the OS pipe buffer and hang the
        // child. Each stream's own EOF is tracked separately so the one that finishes
        // first doesn't cut short the other's tail.
        loop {
            if stdout_done && stderr_done {
                break;
            }
            tokio::select! {
                line = stdout_lines.next_line(), if !stdout_done => {
                    match line {
                        Ok(Some(line)) => {
                            publisher.publish_task(TaskEvent::TaskOutput {
                                task_id: task.id.clone(),
                                line: line.clone(),
                                stream: OutputStream::Stdout,
                            });
                            if captured_stdout.len() < max_bytes {
                                captured_stdout.extend_from_slice(line.as_bytes());
                                captured_stdout.push(b'\n');
                                if captured_stdout.len() > max_bytes {
                                    captured_stdout.truncate(max_bytes);
                                    truncated = true;
                                }
                            } else {
                                truncated = true;
                            }
                        }
                        Ok(None) | Err(_) => stdout_done = true,
                    }
                }
                line = stderr_lines.next_line(), if !stderr_done => {
                    match line {
                        Ok(Some(line)) => {
                            publisher.publish_task(TaskEvent::TaskOutput {
                                task_id: task.id.clone(),
                                line: line.clone(),
                                stream: OutputStream::Stderr,
                            });
                            if output_config.capture_stderr {
                                if captured_stderr.len() < max_bytes {
                                    captured_stderr.extend_from_slice(line.as_bytes());
                                    captured_stderr.push(b'\n');
                                    if captured_stderr.len() > max_bytes {
                                        captured_stderr.truncate(max_bytes);
                                        truncated = true;
                                    }
                                } else {
                                    truncated = true;
                                }
                            }
                        }
                        Ok(None) | Err(_) => stderr_done = true,
                    }
                }
            }
        }
        (captured_stdout, captured_stderr, truncated)
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            cancelled(task, started_at)
        }
        _ = tokio::time::sleep(timeout) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let ended_at = Utc::now();
            TaskResult {
                task_id: task.id.clone(),
                status: TaskStatus::TimedOut,
                exit_code: None,
                output: None,
                stderr: None,
                raw_output: None,
                output_truncated: false,
                started_at,
                ended_at: Some(ended_at),
                duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
                error: Some(format!("task exceeded timeout of {}ms", timeout.as_millis())),
            }
        }
        (stdout_bytes, stderr_bytes, was_truncated) = pump => {
            let status = child.wait().await;
            let ended_at = Utc::now();
            let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
            match status {
                Ok(exit) => {
                    let exit_code = exit.code();
                    let stdout_str = String::from_utf8_lossy(&stdout_bytes).to_string();
                    let stderr_str = String::from_utf8_lossy(&stderr_bytes).to_string();
                    let succeeded = exit.success();
                    TaskResult {
                        task_id: task.id.clone(),
                        status: if succeeded { TaskStatus::Succeeded } else { TaskStatus::Failed },
                        exit_code,
                        output: Some(stdout_str),
                        stderr: if output_config.capture_stderr { Some(stderr_str) } else { None },
                        raw_output: None,
                        output_truncated: was_truncated,
                        started_at,
                        ended_at: Some(ended_at),
                        duration_ms,
                        error: if succeeded { None } else { Some(format!("process exited with code {:?}", exit_code)) },
                    }
                }
                Err(e) => failed_at(task, started_at, &format!("failed to wait on child: {e}")),
            }
        }
    }
}

fn failed_at(task: &Task, started_at: chrono::DateTime<Utc>, message: &str) -> TaskResult {
    let ended_at = Utc::now();
    TaskResult {
        task_id: task.id.clone(),
        status: TaskStatus::Failed,
        exit_code: None,
        output: None,
        stderr: None,
        raw_output: None,
        output_truncated: false,
        started_at,
        ended_at: Some(ended_at),
        duration_ms: (ended_at - started_at).num_milliseconds().max(0) as u64,
        error: Some(message.to_string()),
    }
}

fn default_shell(task: &Task, workflow_default: Option<&str>) -> String {
    task.shell
        .clone()
        .or_else(|| workflow_default.map(|s| s.to_string()))
        .unwrap_or_else(|| "sh".to_string())
}

/// Spawns the child directly on the host.
pub struct LocalExecutor;

#[async_trait]
impl TaskExecutor for LocalExecutor {
    fn priority(&self) -> u32 {
        100
    }

    fn applies(&self, _env: &EffectiveEnvironment) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "local"
    }

    async fn execute(
        &self,
        task: &Task,
        context: &WorkflowContext,
        publisher: &EventPublisher,
        task_index: u64,
        token: CancellationToken,
    ) -> TaskResult {
        let shell = default_shell(task, context.workflow.default_shell.as_deref());
        let working_dir = task
            .working_directory
            .clone()
            .unwrap_or_else(|| context.working_directory.clone());

        run_attempts(task, context, publisher, task_index, token, move |run, env| {
            let mut command = Command::new(&shell);
            command.arg("-c").arg(run);
            command.current_dir(&working_dir);
            // Inherit the host process environment (so PATH etc. resolve normally) and
            // layer the declared+task env on top, declared winning ties.
            for (k, v) in env {
                command.env(k, v);
            }
            command
        })
        .await
    }
}

/// Wraps the command in `docker exec`.
pub struct DockerExecutor;

#[async_trait]
impl TaskExecutor for DockerExecutor {
    fn priority(&self) -> u32 {
        20
    }

    fn applies(&self, env: &EffectiveEnvironment) -> bool {
        !env.disabled && env.docker.is_some() && env.ssh.is_none()
    }

    fn name(&self) -> &'static str {
        "docker"
    }

    async fn execute(
        &self,
        task: &Task,
        context: &WorkflowContext,
        publisher: &EventPublisher,
        task_index: u64,
        token: CancellationToken,
    ) -> TaskResult {
        let shell = default_shell(task, context.workflow.default_shell.as_deref());
        let effective = resolve_effective_environment(
            context.workflow.execution_environment.as_ref(),
            task.execution_environment.as_ref(),
        );
        let docker = effective.docker.clone().expect("DockerExecutor.applies checked docker is Some");

        run_attempts(task, context, publisher, task_index, token, move |run, env| {
            let mut command = Command::new("docker");
            command.arg("exec");
            if docker.interactive {
                command.arg("-it");
            }
            if docker.privileged {
                command.arg("--privileged");
            }
            if let Some(user) = &docker.user {
                command.arg("--user").arg(user);
            }
            if let Some(wd) = &docker.working_directory {
                command.arg("-w").arg(wd);
            }
            for (k, v) in env {
                command.arg("-e").arg(format!("{k}={v}"));
            }
            command.arg(&docker.container).arg(&shell).arg("-c").arg(run);
            command
        })
        .await
    }
}

/// Wraps the command in `ssh`.
pub struct SshExecutor;

#[async_trait]
impl TaskExecutor for SshExecutor {
    fn priority(&self) -> u32 {
        10
    }

    fn applies(&self, env: &EffectiveEnvironment) -> bool {
        !env.disabled && env.ssh.is_some()
    }

    fn name(&self) -> &'static str {
        "ssh"
    }

    async fn execute(
        &self,
        task: &Task,
        context: &WorkflowContext,
        publisher: &EventPublisher,
        task_index: u64,
        token: CancellationToken,
    ) -> TaskResult {
        let shell = default_shell(task, context.workflow.default_shell.as_deref());
        let effective = resolve_effective_environment(
            context.workflow.execution_environment.as_ref(),
            task.execution_environment.as_ref(),
        );
        let ssh = effective.ssh.clone().expect("SshExecutor.applies checked ssh is Some");

        run_attempts(task, context, publisher, task_index, token, move |run, _env| {
            let mut command = Command::new("ssh");
            command.arg("-p").arg(ssh.port.to_string());
            if let Some(identity) = &ssh.identity_file {
                command.arg("-i").arg(identity);
            }
            command.arg("-o").arg("StrictHostKeyChecking=no");
            command.arg(format!("{}@{}", ssh.user, ssh.host));
            command.arg(&shell).arg("-c").arg(run);
            command
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn context_for(task_ids: &[&str]) -> crate::context::WorkflowContext {
        let workflow = Workflow {
            name: "t".into(),
            description: None,
            tasks: task_ids.iter().map(|id| task(id, "echo hi")).collect(),
            env: BTreeMap::new(),
            default_timeout_ms: 2_000,
            default_shell: None,
            webhooks: vec![],
            execution_environment: None,
            watch: None,
            max_parallelism: -1,
            stop_on_first_failure: false,
        };
        crate::context::WorkflowContext::new(
            std::sync::Arc::new(workflow),
            "run-1",
            ".",
            BTreeMap::new(),
            BTreeMap::new(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn dispatcher_selects_local_when_no_environment_is_configured() {
        let dispatcher = ExecutorDispatcher::default();
        let env = EffectiveEnvironment::default();
        assert_eq!(dispatcher.select(&env).name(), "local");
    }

    #[test]
    fn dispatcher_prefers_ssh_over_docker_when_both_configured() {
        let dispatcher = ExecutorDispatcher::default();
        let env = EffectiveEnvironment {
            disabled: false,
            docker: Some(DockerTarget::default()),
            ssh: Some(SshTarget { host: "h".into(), user: "u".into(), port: 22, identity_file: None }),
        };
        assert_eq!(dispatcher.select(&env).name(), "ssh");
    }

    #[test]
    fn disabled_override_forces_local_even_with_docker_configured() {
        let dispatcher = ExecutorDispatcher::default();
        let env = EffectiveEnvironment { disabled: true, docker: Some(DockerTarget::default()), ssh: None };
        assert_eq!(dispatcher.select(&env).name(), "local");
    }

    #[test]
    fn task_override_wins_field_by_field_over_workflow_default() {
        let workflow_level = ExecutionEnvironmentConfig {
            disabled: false,
            docker: Some(DockerTarget { container: "wf".into(), ..Default::default() }),
            ssh: None,
        };
        let task_level = ExecutionEnvironmentOverride {
            disabled: false,
            docker: Some(DockerTarget { container: "task".into(), ..Default::default() }),
            ssh: None,
        };
        let effective = resolve_effective_environment(Some(&workflow_level), Some(&task_level));
        assert_eq!(effective.docker.unwrap().container, "task");
    }

    #[tokio::test]
    async fn evaluate_should_run_skips_a_task_whose_dependency_did_not_succeed() {
        let mut t = task("b", "echo hi");
        t.depends_on = vec!["a".to_string()];
        let context = context_for(&["a", "b"]);
        context.record_result(failed(&task("a", "exit 1"), "boom"));

        let result = evaluate_should_run(&t, &context);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn local_executor_captures_stdout_on_success() {
        let context = context_for(&["a"]);
        let publisher = EventPublisher::new("wf", "run-1");
        let executor = LocalExecutor;
        let result = executor
            .execute(&task("a", "echo hello"), &context, &publisher, 0, CancellationToken::new())
            .await;

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.output.unwrap().trim(), "hello");
    }

    #[tokio::test]
    async fn local_executor_times_out_a_long_running_task() {
        let context = context_for(&["a"]);
        let publisher = EventPublisher::new("wf", "run-1");
        let executor = LocalExecutor;
        let mut t = task("a", "sleep 5");
        t.timeout_ms = Some(50);

        let result = executor.execute(&t, &context, &publisher, 0, CancellationToken::new()).await;
        assert_eq!(result.status, TaskStatus::TimedOut);
    }

    #[tokio::test]
    async fn local_executor_honors_cancellation_before_spawning() {
        let context = context_for(&["a"]);
        let publisher = EventPublisher::new("wf", "run-1");
        let executor = LocalExecutor;
        let token = CancellationToken::new();
        token.cancel();

        let result = executor.execute(&task("a", "echo hi"), &context, &publisher, 0, token).await;
        assert_eq!(result.status, TaskStatus::Cancelled);
    }
}
