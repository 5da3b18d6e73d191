// Adapters layer: concrete implementations for external systems (scheduling API, notification channels).

pub mod api;
pub mod http;
pub mod telegram;
pub mod webhook;

use crate::config::toml_config::{NotificationConfig, NotificationKind};
use crate::domain::ports::NotificationBackend;
use crate::utils::error::{Result, SchedulerError};

/// 依設定選擇通知後端；停用時回傳 `None`
pub fn notification_backend(
    config: &NotificationConfig,
) -> Result<Option<Box<dyn NotificationBackend>>> {
    if !config.enabled {
        return Ok(None);
    }

    let missing = |field: &str| SchedulerError::MissingConfigError {
        field: field.to_string(),
    };

    let backend: Box<dyn NotificationBackend> = match config.backend {
        NotificationKind::Telegram => Box::new(telegram::TelegramBackend::new(
            &config.telegram_api_base,
            config
                .bot_token
                .as_deref()
                .ok_or_else(|| missing("notification.bot_token"))?,
            config
                .chat_id
                .as_deref()
                .ok_or_else(|| missing("notification.chat_id"))?,
        )),
        NotificationKind::Webhook => Box::new(webhook::WebhookBackend::new(
            config
                .webhook_url
                .as_deref()
                .ok_or_else(|| missing("notification.webhook_url"))?,
        )),
    };
    Ok(Some(backend))
}
