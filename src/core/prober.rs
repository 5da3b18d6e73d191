use crate::adapters::api::SchedulingClient;
use crate::domain::model::{AvailabilityWindow, Candidate, Location, ProbeReport, SlotFilters};
use crate::domain::ports::{LocationProbe, Transport};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use std::sync::Arc;

fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// 依伺服器回傳順序，找出符合日期區間且仍有時段的日子
pub fn qualifying_windows<'a>(
    windows: &'a [AvailabilityWindow],
    today: NaiveDate,
    filters: &'a SlotFilters,
) -> impl Iterator<Item = &'a AvailabilityWindow> + 'a {
    windows.iter().filter(move |window| {
        filters.accepts_date(today, window.date())
            && window
                .available_time_slots
                .iter()
                .any(|slot| filters.accepts_slot(slot))
    })
}

/// 第一個符合的日子中的第一個時段；不重新排序
pub fn select_candidate(
    location: &Location,
    windows: &[AvailabilityWindow],
    today: NaiveDate,
    filters: &SlotFilters,
) -> Option<Candidate> {
    qualifying_windows(windows, today, filters).find_map(|window| {
        window
            .available_time_slots
            .iter()
            .find(|slot| filters.accepts_slot(slot))
            .map(|slot| Candidate {
                location: location.clone(),
                slot: slot.clone(),
            })
    })
}

/// 不論區間，該據點最早有空位的日子
pub fn next_available(windows: &[AvailabilityWindow]) -> Option<NaiveDate> {
    windows
        .iter()
        .filter(|window| window.has_open_slot())
        .map(AvailabilityWindow::date)
        .min()
}

pub struct LocationProber<T: Transport> {
    client: Arc<SchedulingClient<T>>,
    filters: SlotFilters,
    today: fn() -> NaiveDate,
}

impl<T: Transport> LocationProber<T> {
    pub fn new(client: Arc<SchedulingClient<T>>, filters: SlotFilters) -> Self {
        Self {
            client,
            filters,
            today: local_today,
        }
    }

    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }
}

#[async_trait]
impl<T: Transport> LocationProbe for LocationProber<T> {
    async fn probe(&self, location: &Location) -> Result<ProbeReport> {
        let availability = self.client.location_dates(location.id).await?;
        let windows = availability.location_availability_dates;
        let today = (self.today)();

        let candidate = select_candidate(location, &windows, today, &self.filters);
        let next_available = next_available(&windows);

        match (&candidate, next_available) {
            (Some(candidate), _) => tracing::info!(
                "🎯 {} is available on {}",
                location.name,
                candidate.slot.formatted_start_date_time
            ),
            (None, Some(date)) => tracing::debug!(
                "📅 {}: next opening {} is outside the requested window",
                location.name,
                date
            ),
            (None, None) => tracing::debug!("📅 {}: no openings", location.name),
        }

        Ok(ProbeReport {
            location: location.clone(),
            next_available,
            candidate,
        })
    }
}
