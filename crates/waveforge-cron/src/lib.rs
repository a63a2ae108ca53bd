pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod persistence;

pub use engine::CronExpression;
pub use error::{ScheduleError, ScheduleResult};
pub use orchestrator::{Orchestrator, OrchestratorEvent, WorkflowLoader};
pub use persistence::{default_store_path, InMemorySchedules, JsonFileSchedules, SchedulePersistence};
