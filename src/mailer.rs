/// Outbound mail dispatch
///
/// The engine hands fully rendered, tracking-injected messages to a `Mailer` and
/// records whatever message id comes back. Provider choice, retries and bounce
/// handling belong to the mailer, not the engine.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// A message ready for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Locally generated id, offered to the provider as the Message-ID
    pub message_id: String,
    pub from_email: String,
    pub from_name: String,
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html_body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message, returning the provider-assigned message id
    async fn send(&self, message: &OutboundMessage) -> EngineResult<String>;
}

/// JSON relay over HTTP
///
/// POSTs each message to the configured endpoint and reads `message_id` back from
/// the response body, falling back to the local id when the relay omits it.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    message_id: Option<String>,
}

impl HttpMailer {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &OutboundMessage) -> EngineResult<String> {
        let payload = json!({
            "message_id": message.message_id,
            "from": { "email": message.from_email, "name": message.from_name },
            "to": { "email": message.to_email, "name": message.to_name },
            "subject": message.subject,
            "html": message.html_body,
        });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EngineError::SendFailed(format!("relay unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::SendFailed(format!("relay returned {}: {}", status, body)));
        }

        let message_id = response
            .json::<RelayResponse>()
            .await
            .ok()
            .and_then(|r| r.message_id)
            .unwrap_or_else(|| message.message_id.clone());

        tracing::debug!(to = %message.to_email, %message_id, "Relay accepted message");
        Ok(message_id)
    }
}

/// Keeps messages in memory instead of delivering them
///
/// Used for dry runs when no relay is configured, and by tests, which can make
/// every send fail with `set_failing`.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutboundMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &OutboundMessage) -> EngineResult<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::SendFailed(format!(
                "recording mailer rejected message to {}",
                message.to_email
            )));
        }

        tracing::info!(to = %message.to_email, subject = %message.subject, "Recorded outbound message");
        self.sent.lock().await.push(message.clone());
        Ok(message.message_id.clone())
    }
}
