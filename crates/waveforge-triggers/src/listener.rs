//! HTTP Trigger Listener: exposes `/webhooks/*` for generic HTTP triggers and
//! `/slack/events` for Slack, signature-verified. Built the way the reference
//! workspace's API server is assembled (`Router::new().route(...).with_state(...)`,
//! `CorsLayer`/`TraceLayer`, `tokio::net::TcpListener` + `axum::serve`) — this listener
//! just has two routes and no OpenAPI surface, since it's consumed by the engine, not by
//! external API clients.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::{TriggerError, TriggerResult};
use crate::model::{IncomingMessage, MessageSource};

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
struct ListenerState {
    messages: broadcast::Sender<IncomingMessage>,
    slack_signing_secret: Option<Arc<str>>,
}

/// Owns the bound HTTP server. `Start`/`Stop`/`SendResponse` mirror the Trigger
/// Listener interface; `subscribe` is the `MessageReceived` event stream.
pub struct HttpTriggerListener {
    addr: std::net::SocketAddr,
    state: ListenerState,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    http: reqwest::Client,
}

impl HttpTriggerListener {
    pub fn new(addr: std::net::SocketAddr, slack_signing_secret: Option<String>) -> Self {
        let (messages, _) = broadcast::channel(1024);
        Self {
            addr,
            state: ListenerState { messages, slack_signing_secret: slack_signing_secret.map(Arc::from) },
            handle: parking_lot::Mutex::new(None),
            shutdown: CancellationToken::new(),
            http: reqwest::Client::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IncomingMessage> {
        self.state.messages.subscribe()
    }

    /// Binds and serves in the background; returns once the listener is bound (not
    /// once it stops).
    pub async fn start(&self) -> TriggerResult<()> {
        let app = routes(self.state.clone());
        let listener = TcpListener::bind(self.addr).await?;

        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "trigger listener exited with an error");
            }
        });
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.await;
        }
    }

    /// Posts `text` back to a Slack `response_url` captured on the original message's
    /// raw payload, if present. Generic HTTP-sourced messages have no reply channel and
    /// this is a no-op for them.
    pub async fn send_response(&self, original: &IncomingMessage, text: &str) -> TriggerResult<()> {
        let Some(response_url) = original
            .raw_payload
            .as_ref()
            .and_then(|v| v.get("response_url"))
            .and_then(|v| v.as_str())
        else {
            tracing::debug!(message_id = %original.message_id, "no reply channel for this message, dropping response");
            return Ok(());
        };

        self.http.post(response_url).json(&serde_json::json!({ "text": text })).send().await?;
        Ok(())
    }
}

fn routes(state: ListenerState) -> Router {
    Router::new()
        .route("/webhooks/:source", post(generic_webhook))
        .route("/slack/events", post(slack_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn generic_webhook(
    State(state): State<ListenerState>,
    Path(source): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let text = body.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let message = IncomingMessage {
        message_id: uuid::Uuid::new_v4().to_string(),
        source: MessageSource::Http,
        text,
        sender_username: body.get("username").and_then(|v| v.as_str()).map(str::to_string),
        sender_user_id: body.get("userId").and_then(|v| v.as_str()).map(str::to_string),
        channel_id: Some(source),
        channel_name: None,
        received_at: chrono::Utc::now(),
        metadata: Default::default(),
        raw_payload: Some(body),
    };
    let _ = state.messages.send(message);
    StatusCode::ACCEPTED
}

async fn slack_events(State(state): State<ListenerState>, headers: HeaderMap, body: axum::body::Bytes) -> Result<Json<serde_json::Value>, StatusCode> {
    if let Some(secret) = &state.slack_signing_secret {
        verify_slack_signature(secret, &headers, &body).map_err(|_| StatusCode::UNAUTHORIZED)?;
    }

    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?;

    if payload.get("type").and_then(|v| v.as_str()) == Some("url_verification") {
        let challenge = payload.get("challenge").cloned().unwrap_or(serde_json::Value::Null);
        return Ok(Json(serde_json::json!({ "challenge": challenge })));
    }

    let event = payload.get("event").cloned().unwrap_or(serde_json::Value::Null);
    let message = IncomingMessage {
        message_id: event.get("ts").and_then(|v| v.as_str()).map(str::to_string).unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        source: MessageSource::Slack,
        text: event.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        sender_username: None,
        sender_user_id: event.get("user").and_then(|v| v.as_str()).map(str::to_string),
        channel_id: event.get("channel").and_then(|v| v.as_str()).map(str::to_string),
        channel_name: None,
        received_at: chrono::Utc::now(),
        metadata: Default::default(),
        raw_payload: Some(payload),
    };
    let _ = state.messages.send(message);
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `HMAC-SHA256("v0:<timestamp>:<body>")` keyed by the app's signing secret, compared
/// against the `v0=<hex>` value in `X-Slack-Signature`.
fn verify_slack_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> TriggerResult<()> {
    let timestamp = headers
        .get("X-Slack-Request-Timestamp")
        .and_then(|v| v.to_str().ok())
        .ok_or(TriggerError::MissingHeader("X-Slack-Request-Timestamp"))?;
    let signature = headers
        .get("X-Slack-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(TriggerError::MissingHeader("X-Slack-Signature"))?;

    let base = format!("v0:{timestamp}:{}", String::from_utf8_lossy(body));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(base.as_bytes());
    let expected = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

    if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
        Ok(())
    } else {
        Err(TriggerError::BadSignature)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
