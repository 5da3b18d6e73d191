use crate::domain::model::{BookingConfirmation, MessageRef};
use crate::domain::ports::NotificationBackend;
use crate::utils::error::Result;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct StatusMessage {
    last: Option<MessageRef>,
    sent_any: bool,
}

/// 狀態通知
///
/// 第一次或重要訊息一律送新訊息；一般狀態更新則編輯上一則訊息，
/// 避免洗版。編輯失敗時清掉參照，改送一則新訊息（只重試這一次）。
pub struct Notifier {
    backend: Option<Box<dyn NotificationBackend>>,
    status: Mutex<StatusMessage>,
}

impl Notifier {
    pub fn new(backend: Option<Box<dyn NotificationBackend>>) -> Self {
        Self {
            backend,
            status: Mutex::new(StatusMessage::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn last_message(&self) -> Option<MessageRef> {
        self.status.lock().await.last
    }

    pub async fn report(&self, message: &str, important: bool) -> Result<Option<MessageRef>> {
        let Some(backend) = &self.backend else {
            tracing::debug!("🔕 Notifications disabled: {}", message);
            return Ok(None);
        };

        // 同一時間只處理一則，避免同時編輯與送出
        let mut status = self.status.lock().await;

        if important {
            let reference = backend.send(message, false).await?;
            status.sent_any = true;
            return Ok(reference);
        }

        if !backend.supports_edit() {
            if status.sent_any {
                tracing::debug!(
                    "🔕 {} cannot edit messages, skipping routine update",
                    backend.name()
                );
                return Ok(None);
            }
            let reference = backend.send(message, true).await?;
            status.sent_any = true;
            return Ok(reference);
        }

        if let Some(reference) = status.last {
            match backend.edit(reference, message).await {
                Ok(()) => return Ok(Some(reference)),
                Err(e) => {
                    tracing::warn!(
                        "⚠️ Failed to edit status message {:?}, sending a new one: {}",
                        reference,
                        e
                    );
                    status.last = None;
                }
            }
        }

        let reference = backend.send(message, true).await?;
        status.last = reference;
        status.sent_any = true;
        Ok(reference)
    }
}

pub fn booked_message(confirmation: &BookingConfirmation) -> String {
    format!(
        "✅ Booked {} at {}\nConfirmation: {}\nManage it here: {}",
        confirmation.slot_display,
        confirmation.location_name,
        confirmation.confirmation_number,
        confirmation.link
    )
}
