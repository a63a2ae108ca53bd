use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
    Cancelled,
}

impl TaskStatus {
    pub fn is_failed(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::TimedOut | TaskStatus::Cancelled)
    }
}

/// The outcome of one task attempt, as recorded into the [`crate::model::ExecutionPlan`]
/// context once the executor finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(rename = "exitCode")]
    pub exit_code: Option<i32>,
    pub output: Option<String>,
    pub stderr: Option<String>,
    #[serde(rename = "rawOutput")]
    pub raw_output: Option<Vec<u8>>,
    #[serde(rename = "outputTruncated", default)]
    pub output_truncated: bool,
    #[serde(rename = "startedAt")]
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "endedAt")]
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl TaskResult {
    pub fn pending(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            exit_code: None,
            output: None,
            stderr: None,
            raw_output: None,
            output_truncated: false,
            started_at: chrono::Utc::now(),
            ended_at: None,
            duration_ms: 0,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Succeeded && self.exit_code.unwrap_or(0) == 0
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    pub fn was_skipped(&self) -> bool {
        self.status == TaskStatus::Skipped
    }
}
