//! Task Retrier: re-executes a single failed or timed-out task on
//! demand, outside the normal wave flow — the UI-driven "retry this one task" action,
//! distinct from the Task Executor's own internal `retryCount` loop.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use waveforge_core::model::{TaskResult, TaskStatus};

use crate::context::WorkflowContext;
use crate::events::{EventPublisher, TaskEvent};
use crate::executor::{resolve_effective_environment, ExecutorDispatcher};

#[derive(Debug, Error)]
pub enum RetrierError {
    #[error("task '{0}' not found in workflow")]
    TaskNotFound(String),

    #[error("task '{task_id}' last status was {status:?}, which is not retryable")]
    NotRetryable { task_id: String, status: TaskStatus },
}

/// Re-run `task_id`. Refuses unless its last recorded status is Failed or TimedOut,
/// clears its prior output, and records a fresh [`TaskResult`] under the same
/// id, overwriting the previous one.
pub async fn retry_task(
    task_id: &str,
    context: &WorkflowContext,
    dispatcher: &ExecutorDispatcher,
    publisher: &EventPublisher,
    token: CancellationToken,
) -> Result<TaskResult, RetrierError> {
    let task = context
        .workflow
        .find_task(task_id)
        .cloned()
        .ok_or_else(|| RetrierError::TaskNotFound(task_id.to_string()))?;

    let last = context.result(task_id);
    match last.as_ref().map(|r| r.status) {
        Some(TaskStatus::Failed) | Some(TaskStatus::TimedOut) => {}
        Some(other) => return Err(RetrierError::NotRetryable { task_id: task_id.to_string(), status: other }),
        None => return Err(RetrierError::NotRetryable { task_id: task_id.to_string(), status: TaskStatus::Pending }),
    }

    context.record_result(TaskResult::pending(task_id));

    let task_index = context.stats.next_task_index();
    publisher.publish_task(TaskEvent::TaskStarted { task_id: task.id.clone(), task_index, attempt: 0 });

    let env = resolve_effective_environment(
        context.workflow.execution_environment.as_ref(),
        task.execution_environment.as_ref(),
    );
    let executor = dispatcher.select(&env);
    let result = executor.execute(&task, context, publisher, task_index, token).await;

    context.record_result(result.clone());

    match result.status {
        TaskStatus::Cancelled => {
            publisher.publish_task(TaskEvent::TaskCancelled {
                task_id: task.id.clone(),
                reason: result.error.clone().unwrap_or_default(),
            });
        }
        _ => {
            publisher.publish_task(TaskEvent::TaskCompleted { task_id: task.id.clone(), result: result.clone() });
        }
    }

    Ok(result)
}
