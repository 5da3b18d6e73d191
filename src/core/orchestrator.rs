use crate::adapters::api::SchedulingClient;
use crate::config::AppConfig;
use crate::core::context::RunContext;
use crate::core::notifier::Notifier;
use crate::core::prober::LocationProber;
use crate::core::queue::{PollingQueue, QueueSettings};
use crate::core::reservation::ReservationWorkflow;
use crate::domain::model::{BookingConfirmation, ExistingBookingPolicy, Location};
use crate::domain::ports::{NotificationBackend, Transport};
use crate::utils::error::{Result, SchedulerError};
use std::sync::Arc;

/// 啟動流程：通知 → 檢查既有預約 → 取得據點 → 交給輪詢佇列
pub struct Orchestrator<T: Transport + 'static> {
    config: AppConfig,
    client: Arc<SchedulingClient<T>>,
    notifier: Arc<Notifier>,
    context: Arc<RunContext>,
}

impl<T: Transport + 'static> Orchestrator<T> {
    pub fn new(
        config: AppConfig,
        transport: T,
        backend: Option<Box<dyn NotificationBackend>>,
    ) -> Self {
        let client = Arc::new(SchedulingClient::new(transport, config.personal.clone()));
        Self {
            config,
            client,
            notifier: Arc::new(Notifier::new(backend)),
            context: Arc::new(RunContext::new()),
        }
    }

    pub fn context(&self) -> Arc<RunContext> {
        self.context.clone()
    }

    pub async fn run(&self) -> Result<BookingConfirmation> {
        tracing::info!("🚀 Starting slot search");
        if self.config.app.dry_run {
            tracing::warn!("🔍 DRY RUN MODE - cancel, hold and book calls will be refused");
        }

        self.announce_start().await?;
        self.check_existing_booking().await?;
        let locations = self.discover_locations().await?;

        let filters = self.config.slot_filters()?;
        let prober = Arc::new(LocationProber::new(self.client.clone(), filters));
        let workflow = Arc::new(ReservationWorkflow::new(
            self.client.clone(),
            self.notifier.clone(),
            self.context.clone(),
            self.config.app.dry_run,
            &self.config.app.booking_link_base,
        ));
        let queue = PollingQueue::new(
            prober,
            workflow,
            self.notifier.clone(),
            self.context.clone(),
            QueueSettings {
                concurrency: self.config.app.concurrency,
                interval: self.config.app.interval(),
                jitter: self.config.app.jitter(),
            },
        );

        queue.run(&locations).await
    }

    async fn announce_start(&self) -> Result<()> {
        if !self.notifier.is_enabled() {
            return Ok(());
        }

        let message = format!(
            "🚀 Searching for appointments near {} within {} miles",
            self.config.location.zip_codes.join(", "),
            self.config.location.max_distance_miles
        );
        self.notifier
            .report(&message, false)
            .await
            .map_err(|e| SchedulerError::NotificationSetupError {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn check_existing_booking(&self) -> Result<()> {
        let bookings = self.client.existing_bookings().await?;
        let Some(existing) = bookings.into_iter().next() else {
            tracing::info!("📭 No existing booking found");
            return Ok(());
        };

        tracing::info!(
            "📌 Existing booking {} found ({})",
            existing.confirmation_number,
            existing.booking_date_time.as_deref().unwrap_or("unknown time")
        );

        match self.config.app.existing_booking {
            ExistingBookingPolicy::Keep => {
                tracing::error!(
                    "❌ Existing booking {} will be kept; nothing to do",
                    existing.confirmation_number
                );
                Err(SchedulerError::ExistingBookingKept {
                    confirmation: existing.confirmation_number,
                })
            }
            ExistingBookingPolicy::Replace => {
                tracing::info!("🔄 Existing booking will be cancelled once a new slot is found");
                self.context.state.stage_existing(existing);
                Ok(())
            }
        }
    }

    /// 依所有郵遞區號查詢據點，去重後依距離排序
    async fn discover_locations(&self) -> Result<Vec<Location>> {
        let max_distance = self.config.location.max_distance_miles;
        let mut locations: Vec<Location> = Vec::new();

        for zip_code in &self.config.location.zip_codes {
            let found = self.client.locations(zip_code).await?;
            tracing::debug!("📍 {} locations returned for {}", found.len(), zip_code);

            for location in found.into_iter().filter(|l| l.distance <= max_distance) {
                match locations.iter_mut().find(|known| known.id == location.id) {
                    Some(known) if location.distance < known.distance => *known = location,
                    Some(_) => {}
                    None => locations.push(location),
                }
            }
        }

        if locations.is_empty() {
            return Err(SchedulerError::NoLocations {
                zip_codes: self.config.location.zip_codes.join(", "),
                max_distance,
            });
        }

        locations.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        tracing::info!("📍 Tracking {} locations:", locations.len());
        for location in &locations {
            tracing::info!("   • {} ({:.1} mi)", location.name, location.distance);
        }
        Ok(locations)
    }
}
