//! Trigger Dispatcher: turns a matched rule into a real workflow run by resolving
//! its parameter templates and handing the result to the cron orchestrator's manual
//! dispatch entrypoint, the same path a CLI `run` invocation uses.

use std::collections::BTreeMap;
use std::sync::Arc;

use waveforge_cron::Orchestrator;

use crate::error::TriggerResult;
use crate::matcher::TriggerMatch;
use crate::model::{IncomingMessage, TriggerRule};
use crate::template::resolve;

pub struct TriggerDispatcher {
    orchestrator: Arc<Orchestrator>,
}

impl TriggerDispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Resolves `rule.parameter_template` against the match's captures and the
    /// message context, dispatches the workflow, and returns the run id — the caller
    /// uses it to resolve `rule.response_template` before replying.
    pub async fn dispatch(&self, rule: &TriggerRule, matched: &TriggerMatch, message: &IncomingMessage) -> TriggerResult<String> {
        let empty = BTreeMap::new();
        let input_parameters: BTreeMap<String, String> = rule
            .parameter_template
            .iter()
            .map(|(key, template)| (key.clone(), resolve(template, &matched.captures, &empty, message)))
            .collect();

        let reason = format!("Triggered by {}", rule.name);
        let triggered_by = message
            .sender_username
            .clone()
            .or_else(|| message.sender_user_id.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let run_id = self
            .orchestrator
            .dispatch_manual_with_context(&matched.workflow_path, input_parameters, reason, triggered_by)
            .await?;
        Ok(run_id)
    }

    /// Resolves a rule's response template (if any) against the match, the run id, and
    /// the message context.
    pub fn resolve_response(&self, rule: &TriggerRule, matched: &TriggerMatch, run_id: &str, message: &IncomingMessage) -> Option<String> {
        let template = rule.response_template.as_ref()?;
        let mut additionals = BTreeMap::new();
        additionals.insert("runId".to_string(), run_id.to_string());
        Some(resolve(template, &matched.captures, &additionals, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageSource, TriggerType};
    use chrono::Utc;
    use waveforge_cron::{InMemorySchedules, ScheduleResult, WorkflowLoader};
    use waveforge_core::model::{Task, Workflow};
    use waveforge_exec::{ExecutorDispatcher, NoopWebhookNotifier};

    struct FixedLoader;

    impl WorkflowLoader for FixedLoader {
        fn load(&self, _path: &str) -> ScheduleResult<Arc<Workflow>> {
            Ok(Arc::new(Workflow {
                name: "demo".into(),
                description: None,
                tasks: vec![Task {
                    id: "a".into(),
                    name: None,
                    run: "echo hi".into(),
                    shell: None,
                    working_directory: None,
                    env: BTreeMap::new(),
                    depends_on: vec![],
                    condition: None,
                    input: None,
                    output: None,
                    timeout_ms: Some(5_000),
                    continue_on_error: false,
                    retry_count: 0,
                    retry_delay_ms: 0,
                    matrix: None,
                    execution_environment: None,
                    matrix_values: None,
                }],
                env: BTreeMap::new(),
                default_timeout_ms: 5_000,
                default_shell: None,
                webhooks: vec![],
                execution_environment: None,
                watch: None,
                max_parallelism: -1,
                stop_on_first_failure: false,
            }))
        }
    }

    fn message() -> IncomingMessage {
        IncomingMessage {
            message_id: "m1".into(),
            source: MessageSource::Slack,
            text: "/build my-api".into(),
            sender_username: Some("alice".into()),
            sender_user_id: Some("u1".into()),
            channel_id: Some("c1".into()),
            channel_name: Some("general".into()),
            received_at: Utc::now(),
            metadata: BTreeMap::new(),
            raw_payload: None,
        }
    }

    #[tokio::test]
    async fn dispatch_resolves_parameters_and_returns_a_run_id() {
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(InMemorySchedules::default()),
            Arc::new(FixedLoader),
            Arc::new(ExecutorDispatcher::default()),
            Arc::new(NoopWebhookNotifier),
        ));
        let dispatcher = TriggerDispatcher::new(orchestrator);

        let rule = TriggerRule {
            name: "build".into(),
            sources: vec![MessageSource::Slack],
            kind: TriggerType::Command,
            pattern: Some("/build {project}".into()),
            keywords: vec![],
            workflow_path: "demo.yaml".into(),
            parameter_template: BTreeMap::from([("project".to_string(), "{project}".to_string())]),
            response_template: Some("Run {runId} for {project}".to_string()),
            cooldown: None,
            enabled: true,
        };
        let matched = TriggerMatch {
            rule_name: "build".into(),
            workflow_path: "demo.yaml".into(),
            captures: BTreeMap::from([("project".to_string(), "my-api".to_string())]),
        };

        let run_id = dispatcher.dispatch(&rule, &matched, &message()).await.unwrap();
        assert!(!run_id.is_empty());

        let response = dispatcher.resolve_response(&rule, &matched, &run_id, &message()).unwrap();
        assert_eq!(response, format!("Run {run_id} for my-api"));
    }

    #[tokio::test]
    async fn a_rule_without_a_response_template_resolves_to_none() {
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(InMemorySchedules::default()),
            Arc::new(FixedLoader),
            Arc::new(ExecutorDispatcher::default()),
            Arc::new(NoopWebhookNotifier),
        ));
        let dispatcher = TriggerDispatcher::new(orchestrator);
        let rule = TriggerRule {
            name: "noop".into(),
            sources: vec![MessageSource::Slack],
            kind: TriggerType::Keyword,
            pattern: None,
            keywords: vec!["ping".into()],
            workflow_path: "demo.yaml".into(),
            parameter_template: BTreeMap::new(),
            response_template: None,
            cooldown: None,
            enabled: true,
        };
        let matched = TriggerMatch { rule_name: "noop".into(), workflow_path: "demo.yaml".into(), captures: BTreeMap::new() };
        assert!(dispatcher.resolve_response(&rule, &matched, "run-1", &message()).is_none());
    }
}
