use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("cron expression '{expression}' has no occurrence within the search horizon")]
    UnreachableCron { expression: String },

    #[error("schedule '{0}' not found")]
    NotFound(String),

    #[error("schedule '{0}' is already running and does not allow overlap")]
    AlreadyRunning(String),

    #[error("failed to read schedule store at '{path}': {source}")]
    StoreRead { path: String, #[source] source: std::io::Error },

    #[error("failed to write schedule store at '{path}': {source}")]
    StoreWrite { path: String, #[source] source: std::io::Error },

    #[error("failed to parse schedule store: {0}")]
    StoreDeserialize(#[from] serde_json::Error),

    #[error("failed to load workflow for schedule '{schedule_id}': {reason}")]
    WorkflowLoad { schedule_id: String, reason: String },

    #[error(transparent)]
    Core(#[from] waveforge_core::error::CoreError),
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
