//! Webhook notifier contract: `RegisterWebhooks`/`UnregisterWebhooks`, consumed by
//! the Runner around a run. The actual HTTP delivery (payload shaping for
//! Discord/Slack/Telegram, retry-on-disconnect) is left to a caller-supplied
//! implementation — this crate only defines the interface and an in-process no-op
//! used by tests and by any caller that hasn't wired a real notifier in.

use async_trait::async_trait;
use waveforge_core::model::Webhook;

use crate::events::EventPublisher;

/// Subscribes to a run's [`EventPublisher`] while registered and forwards events to the
/// configured webhook URLs. Implementations own their own HTTP client and payload
/// shaping; this crate only needs to know when to start and stop listening.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn register_webhooks(&self, run_id: &str, workflow_name: &str, configs: &[Webhook], publisher: &EventPublisher);
    async fn unregister_webhooks(&self, run_id: &str);
}

/// Does nothing; used when a workflow declares no webhooks, or by tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopWebhookNotifier;

#[async_trait]
impl WebhookNotifier for NoopWebhookNotifier {
    async fn register_webhooks(&self, _run_id: &str, _workflow_name: &str, _configs: &[Webhook], _publisher: &EventPublisher) {}
    async fn unregister_webhooks(&self, _run_id: &str) {}
}
