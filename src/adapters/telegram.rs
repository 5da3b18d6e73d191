use crate::domain::model::MessageRef;
use crate::domain::ports::NotificationBackend;
use crate::utils::error::{Result, SchedulerError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct TelegramEnvelope {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Telegram Bot API，支援原地編輯訊息
pub struct TelegramBackend {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramBackend {
    pub fn new(api_base: &str, token: &str, chat_id: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }

    async fn call(&self, method: &str, body: serde_json::Value) -> Result<TelegramEnvelope> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self
            .client
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let envelope: TelegramEnvelope = response.json().await?;
        if !envelope.ok {
            return Err(SchedulerError::NotificationError {
                message: format!(
                    "telegram {} failed with status {}: {}",
                    method,
                    status,
                    envelope.description.as_deref().unwrap_or("no description")
                ),
            });
        }
        Ok(envelope)
    }
}

#[async_trait]
impl NotificationBackend for TelegramBackend {
    fn name(&self) -> &str {
        "telegram"
    }

    fn supports_edit(&self) -> bool {
        true
    }

    async fn send(&self, text: &str, silent: bool) -> Result<Option<MessageRef>> {
        let envelope = self
            .call(
                "sendMessage",
                json!({
                    "chat_id": self.chat_id,
                    "text": text,
                    "disable_notification": silent,
                }),
            )
            .await?;

        let sent = envelope
            .result
            .ok_or_else(|| SchedulerError::NotificationError {
                message: "telegram sendMessage returned no message".to_string(),
            })?;
        Ok(Some(MessageRef(sent.message_id)))
    }

    async fn edit(&self, message: MessageRef, text: &str) -> Result<()> {
        self.call(
            "editMessageText",
            json!({
                "chat_id": self.chat_id,
                "message_id": message.0,
                "text": text,
            }),
        )
        .await?;
        Ok(())
    }
}
