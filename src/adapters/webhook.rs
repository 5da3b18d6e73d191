use crate::domain::model::MessageRef;
use crate::domain::ports::NotificationBackend;
use crate::utils::error::{Result, SchedulerError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// 單向 JSON webhook，送出後無法編輯
pub struct WebhookBackend {
    client: Client,
    url: String,
}

impl WebhookBackend {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotificationBackend for WebhookBackend {
    fn name(&self) -> &str {
        "webhook"
    }

    fn supports_edit(&self) -> bool {
        false
    }

    async fn send(&self, text: &str, silent: bool) -> Result<Option<MessageRef>> {
        let response = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({
                "text": text,
                "priority": if silent { "low" } else { "high" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SchedulerError::NotificationError {
                message: format!("webhook responded with status {}", response.status()),
            });
        }
        Ok(None)
    }

    async fn edit(&self, _message: MessageRef, _text: &str) -> Result<()> {
        Err(SchedulerError::NotificationError {
            message: "webhook backend cannot edit messages".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_send_posts_text_with_priority() {
        let server = MockServer::start();
        let hook = server.mock(|when, then| {
            when.method(POST)
                .path("/hook")
                .json_body(serde_json::json!({"text": "Booked!", "priority": "high"}));
            then.status(204);
        });

        let backend = WebhookBackend::new(&server.url("/hook"));
        let reference = backend.send("Booked!", false).await.unwrap();

        hook.assert();
        assert_eq!(reference, None);
        assert!(!backend.supports_edit());
    }

    #[tokio::test]
    async fn test_server_error_is_notification_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/hook");
            then.status(500);
        });

        let backend = WebhookBackend::new(&server.url("/hook"));
        assert!(matches!(
            backend.send("status", true).await,
            Err(SchedulerError::NotificationError { .. })
        ));
    }
}
