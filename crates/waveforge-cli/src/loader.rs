//! The one place in the workspace that parses YAML: workflow files and trigger-rule
//! files. `waveforge-core`, `waveforge-exec`, `waveforge-cron` and `waveforge-triggers`
//! only ever see the parsed `Workflow`/`TriggerRule` structs.

use std::path::Path;
use std::sync::Arc;

use waveforge_core::model::Workflow;
use waveforge_cron::{ScheduleError, ScheduleResult, WorkflowLoader};
use waveforge_triggers::TriggerRule;

pub fn load_workflow(path: &str) -> anyhow::Result<Workflow> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read workflow file '{path}': {e}"))?;
    let workflow: Workflow = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse workflow file '{path}': {e}"))?;
    Ok(workflow)
}

/// The top-level shape of a trigger-rule file: a bare list of rules.
#[derive(Debug, serde::Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub rules: Vec<TriggerRule>,
    /// Signing secret for verifying `/slack/events` requests, if Slack is a configured
    /// source. Absent means signature verification is skipped.
    #[serde(default, rename = "slackSigningSecret")]
    pub slack_signing_secret: Option<String>,
    /// Address the HTTP trigger listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8088".to_string()
}

pub fn load_trigger_config(path: &str) -> anyhow::Result<TriggerConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read trigger config '{path}': {e}"))?;
    let config: TriggerConfig = serde_yaml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse trigger config '{path}': {e}"))?;
    Ok(config)
}

/// [`WorkflowLoader`] implementation handed to the cron orchestrator: reads and parses
/// a workflow file relative to the current directory every time a schedule fires,
/// rather than caching it, so edits to the file are picked up on the next run.
pub struct YamlWorkflowLoader;

impl WorkflowLoader for YamlWorkflowLoader {
    fn load(&self, path: &str) -> ScheduleResult<Arc<Workflow>> {
        if !Path::new(path).exists() {
            return Err(ScheduleError::WorkflowLoad {
                schedule_id: path.to_string(),
                reason: format!("workflow file '{path}' does not exist"),
            });
        }
        let workflow = load_workflow(path).map_err(|e| ScheduleError::WorkflowLoad {
            schedule_id: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(workflow))
    }
}
