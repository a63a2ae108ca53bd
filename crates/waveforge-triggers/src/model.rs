//! Inbound message and trigger-rule model, mirroring how `waveforge-core::model`
//! derives `Serialize`/`Deserialize` with camelCase field renames.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Telegram,
    Discord,
    Slack,
    Http,
    FileWatch,
}

/// An inbound message from any listener, normalized to a common shape before matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub source: MessageSource,
    pub text: String,
    #[serde(rename = "senderUsername", default)]
    pub sender_username: Option<String>,
    #[serde(rename = "senderUserId", default)]
    pub sender_user_id: Option<String>,
    #[serde(rename = "channelId", default)]
    pub channel_id: Option<String>,
    #[serde(rename = "channelName", default)]
    pub channel_name: Option<String>,
    #[serde(rename = "receivedAt")]
    pub received_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Opaque provider payload, kept around so a listener's `SendResponse` can reply to
    /// the right place (a Slack channel+ts, a Telegram chat id). Never interpreted here.
    #[serde(rename = "rawPayload", default)]
    pub raw_payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Command,
    Pattern,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRule {
    pub name: String,
    pub sources: Vec<MessageSource>,
    #[serde(rename = "type")]
    pub kind: TriggerType,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(rename = "workflowPath")]
    pub workflow_path: String,
    #[serde(rename = "parameterTemplate", default)]
    pub parameter_template: BTreeMap<String, String>,
    #[serde(rename = "responseTemplate", default)]
    pub response_template: Option<String>,
    #[serde(rename = "cooldown", default, with = "humantime_secs::option")]
    pub cooldown: Option<Duration>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// `cooldown` is authored in the workflow/trigger YAML as a whole number of seconds; this
/// mirrors how `waveforge-core`'s `timeoutMs`/`retryDelayMs` fields carry their unit in
/// the field name rather than via a custom duration type.
mod humantime_secs {
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
            value.map(|d| d.as_secs()).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
            let secs: Option<u64> = Option::deserialize(deserializer)?;
            Ok(secs.map(Duration::from_secs))
        }
    }
}
