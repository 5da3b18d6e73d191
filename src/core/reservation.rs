use crate::adapters::api::SchedulingClient;
use crate::core::context::RunContext;
use crate::core::notifier::{booked_message, Notifier};
use crate::domain::model::{BookingConfirmation, Candidate};
use crate::domain::ports::{CandidateHandler, Transport};
use crate::utils::error::{Result, SchedulerError};
use async_trait::async_trait;
use std::sync::Arc;

/// 保留 → 預約的兩段式流程
///
/// 保留或預約被拒時恢復輪詢並回傳 `Ok(None)`；只有取消既有預約失敗
/// 與 dry-run 拒絕會以 `Err` 結束整個執行。同一個候選時段不會重試。
pub struct ReservationWorkflow<T: Transport> {
    client: Arc<SchedulingClient<T>>,
    notifier: Arc<Notifier>,
    context: Arc<RunContext>,
    dry_run: bool,
    link_base: String,
}

impl<T: Transport> ReservationWorkflow<T> {
    pub fn new(
        client: Arc<SchedulingClient<T>>,
        notifier: Arc<Notifier>,
        context: Arc<RunContext>,
        dry_run: bool,
        link_base: &str,
    ) -> Self {
        Self {
            client,
            notifier,
            context,
            dry_run,
            link_base: link_base.trim_end_matches('/').to_string(),
        }
    }

    fn refuse_in_dry_run(&self, action: &str) -> Result<()> {
        if self.dry_run {
            tracing::error!("🛑 Dry-run mode: refusing to {}", action);
            return Err(SchedulerError::DryRunRefused {
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn resume_polling(&self) {
        if self.context.gate.resume() {
            tracing::info!("▶️ Polling resumed");
        }
    }

    pub async fn hold(&self, candidate: Candidate) -> Result<Option<BookingConfirmation>> {
        if self.context.state.is_holding() {
            tracing::warn!(
                "⚠️ A slot was already held this run, ignoring {} at {}",
                candidate.slot.formatted_start_date_time,
                candidate.location.name
            );
            self.resume_polling();
            return Ok(None);
        }

        if let Some(existing) = self.context.state.existing() {
            let action = format!("cancel existing booking {}", existing.confirmation_number);
            self.refuse_in_dry_run(&action)?;

            tracing::info!("🗑️ Cancelling existing booking {}", existing.confirmation_number);
            self.client.cancel_booking(&existing).await.map_err(|e| {
                tracing::error!(
                    "❌ Failed to cancel existing booking {}: {}",
                    existing.confirmation_number,
                    e
                );
                SchedulerError::CancellationFailed {
                    confirmation: existing.confirmation_number.clone(),
                    reason: e.to_string(),
                }
            })?;
            self.context.state.take_existing();
            tracing::info!("✅ Existing booking {} cancelled", existing.confirmation_number);
        }

        self.refuse_in_dry_run("hold slot")?;
        tracing::info!(
            "✋ Holding slot {} at {}",
            candidate.slot.formatted_start_date_time,
            candidate.location.name
        );

        match self.client.hold_slot(&candidate).await {
            Ok(()) => {
                self.context.state.mark_holding();
                tracing::info!("✅ Slot held successfully");
                self.book(candidate).await
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to hold slot: {}", e);
                self.resume_polling();
                Ok(None)
            }
        }
    }

    async fn book(&self, candidate: Candidate) -> Result<Option<BookingConfirmation>> {
        if self.context.state.is_booked() {
            tracing::warn!("⚠️ Already booked, ignoring duplicate booking attempt");
            return Ok(None);
        }
        self.refuse_in_dry_run("book slot")?;

        // ResponseId 必須在預約前即時取得
        let attempt = async {
            let response_id = self.client.eligibility_response_id().await?;
            self.client.book_slot(&candidate, response_id).await
        };
        let outcome = attempt.await;

        match outcome {
            Ok(confirmation_number) => {
                self.context.state.mark_booked();
                let confirmation = BookingConfirmation {
                    link: format!("{}/?b={}", self.link_base, confirmation_number),
                    confirmation_number,
                    location_name: candidate.location.name,
                    slot_display: candidate.slot.formatted_start_date_time,
                };
                tracing::info!(
                    "🎉 Booked {} at {} (confirmation {})",
                    confirmation.slot_display,
                    confirmation.location_name,
                    confirmation.confirmation_number
                );
                if let Err(e) = self
                    .notifier
                    .report(&booked_message(&confirmation), true)
                    .await
                {
                    tracing::warn!("⚠️ Failed to send booking notification: {}", e);
                }
                Ok(Some(confirmation))
            }
            Err(e) => {
                // 保留失敗的時段沒有釋放 API，交由伺服器逾時處理
                tracing::warn!("⚠️ Failed to book held slot: {}", e);
                tracing::warn!(
                    "⚠️ A hold was already placed this run; later candidates will be ignored"
                );
                self.resume_polling();
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl<T: Transport> CandidateHandler for ReservationWorkflow<T> {
    async fn on_candidate(&self, candidate: Candidate) -> Result<Option<BookingConfirmation>> {
        self.hold(candidate).await
    }
}
