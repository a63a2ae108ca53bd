use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::task::{DockerTarget, SshTarget, Task};

/// The top-level parsed workflow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub tasks: Vec<Task>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(rename = "defaultTimeoutMs", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(rename = "defaultShell", default)]
    pub default_shell: Option<String>,

    #[serde(default)]
    pub webhooks: Vec<Webhook>,

    #[serde(rename = "executionEnvironment", default)]
    pub execution_environment: Option<ExecutionEnvironmentConfig>,

    #[serde(default)]
    pub watch: Option<WatchConfig>,

    /// -1 means unbounded; 0 is treated the same as -1; >0 bounds concurrent
    /// task launches within a wave via a semaphore.
    #[serde(rename = "maxParallelism", default = "default_max_parallelism")]
    pub max_parallelism: i64,

    #[serde(rename = "stopOnFirstFailure", default)]
    pub stop_on_first_failure: bool,
}

fn default_timeout_ms() -> u64 {
    5 * 60 * 1000
}

fn default_max_parallelism() -> i64 {
    -1
}

impl Workflow {
    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.id.eq_ignore_ascii_case(id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Workflow-level default execution target; tasks may override per-task.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionEnvironmentConfig {
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub docker: Option<DockerTarget>,
    #[serde(default)]
    pub ssh: Option<SshTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub paths: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(rename = "debounceMs", default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

/// A persisted cron schedule bound to a workflow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSchedule {
    pub id: String,
    #[serde(rename = "workflowPath")]
    pub workflow_path: String,
    #[serde(rename = "cronExpression")]
    pub cron_expression: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "lastRunAt", default)]
    pub last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "nextRunAt", default)]
    pub next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "inputParameters", default)]
    pub input_parameters: BTreeMap<String, String>,
    #[serde(rename = "executionPolicy", default)]
    pub execution_policy: ExecutionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    #[serde(rename = "maxConcurrentRuns", default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: u32,
    #[serde(rename = "allowOverlap", default)]
    pub allow_overlap: bool,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(rename = "maxRetries", default)]
    pub max_retries: u32,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            allow_overlap: false,
            timeout: None,
            max_retries: 0,
        }
    }
}

fn default_max_concurrent_runs() -> u32 {
    1
}
