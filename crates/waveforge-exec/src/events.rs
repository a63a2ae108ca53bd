//! Event Publisher: a single-producer/multi-consumer in-process broadcaster
//! carrying workflow-lifecycle events and task-lifecycle events, each wrapped in a
//! common envelope, split into two channels so a subscriber only interested in one
//! kind doesn't have to filter the other out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use waveforge_core::model::TaskResult;

const CHANNEL_CAPACITY: usize = 1024;

/// Common envelope every event carries, regardless of channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub workflow_id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: T,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
    Command,
}

/// The overall status of a completed (or in-progress) run, derived from the context:
/// cancelled takes priority, then any failure, then success, else pending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted { total_tasks: usize },
    WaveStarted { wave_index: usize },
    WaveCompleted { wave_index: usize, succeeded: u32, failed: u32, skipped: u32 },
    WorkflowCancelled { reason: String },
    WorkflowCompleted {
        status: OverallStatus,
        duration_ms: u64,
        succeeded: u32,
        failed: u32,
        skipped: u32,
    },
    StepPaused,
    StepResumed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskStarted { task_id: String, task_index: u64, attempt: u32 },
    TaskOutput { task_id: String, line: String, stream: OutputStream },
    TaskCompleted { task_id: String, result: TaskResult },
    TaskSkipped { task_id: String, reason: String },
    TaskCancelled { task_id: String, reason: String },
}

pub type WorkflowEventEnvelope = Envelope<WorkflowEvent>;
pub type TaskEventEnvelope = Envelope<TaskEvent>;

/// Broadcaster for one run's events. A lagging subscriber dropping messages is the
/// closest thing this has to a misbehaving handler; `publish_*` logs and moves on
/// rather than propagating a send error.
#[derive(Clone)]
pub struct EventPublisher {
    workflow_id: String,
    run_id: String,
    workflow_tx: broadcast::Sender<WorkflowEventEnvelope>,
    task_tx: broadcast::Sender<TaskEventEnvelope>,
}

impl EventPublisher {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        let (workflow_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (task_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            workflow_tx,
            task_tx,
        }
    }

    pub fn subscribe_workflow(&self) -> broadcast::Receiver<WorkflowEventEnvelope> {
        self.workflow_tx.subscribe()
    }

    pub fn subscribe_tasks(&self) -> broadcast::Receiver<TaskEventEnvelope> {
        self.task_tx.subscribe()
    }

    pub fn publish_workflow(&self, event: WorkflowEvent) {
        let envelope = Envelope {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            event,
        };
        if self.workflow_tx.send(envelope).is_err() {
            tracing::trace!(run_id = %self.run_id, "no subscribers for workflow event");
        }
    }

    pub fn publish_task(&self, event: TaskEvent) {
        let envelope = Envelope {
            workflow_id: self.workflow_id.clone(),
            run_id: self.run_id.clone(),
            timestamp: Utc::now(),
            event,
        };
        if self.task_tx.send(envelope).is_err() {
            tracing::trace!(run_id = %self.run_id, "no subscribers for task event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_observe_published_events() {
        let publisher = EventPublisher::new("wf-1", "run-1");
        let mut rx = publisher.subscribe_workflow();
        publisher.publish_workflow(WorkflowEvent::WorkflowStarted { total_tasks: 3 });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.run_id, "run-1");
        matches!(received.event, WorkflowEvent::WorkflowStarted { total_tasks: 3 });
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_panic() {
        let publisher = EventPublisher::new("wf-1", "run-1");
        publisher.publish_task(TaskEvent::TaskSkipped {
            task_id: "a".into(),
            reason: "condition not met".into(),
        });
    }
}
