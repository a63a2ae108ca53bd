//! Data model (workflow, tasks, plans, results) described in the data model section
//! of the engine's design document.

mod plan;
mod result;
mod task;
mod workflow;

pub use plan::{ExecutionPlan, ExecutionWave};
pub use result::{TaskResult, TaskStatus};
pub use task::{
    DockerTarget, ExecutionEnvironmentOverride, MatrixSpec, SshTarget, Task, TaskInput,
    TaskOutputConfig, TaskOutputKind,
};
pub use workflow::{
    ExecutionEnvironmentConfig, ExecutionPolicy, Workflow, WorkflowSchedule, WatchConfig, Webhook,
};
