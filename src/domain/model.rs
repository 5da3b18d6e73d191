use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

/// 可預約的服務據點，抓取後即不可變
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Location {
    pub id: u64,
    pub name: String,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Slot {
    pub slot_id: u64,
    pub start_date_time: NaiveDateTime,
    pub formatted_start_date_time: String,
    pub duration: u32,
}

/// 單一據點單一天的時段，每輪輪詢產生後即丟棄
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AvailabilityWindow {
    pub availability_date: NaiveDateTime,
    #[serde(default)]
    pub available_time_slots: Vec<Slot>,
}

impl AvailabilityWindow {
    pub fn date(&self) -> NaiveDate {
        self.availability_date.date()
    }

    pub fn has_open_slot(&self) -> bool {
        !self.available_time_slots.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LocationAvailability {
    #[serde(default)]
    pub location_availability_dates: Vec<AvailabilityWindow>,
}

/// 啟動時查到的既有預約
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExistingBooking {
    pub confirmation_number: String,
    #[serde(default)]
    pub booking_date_time: Option<String>,
    #[serde(default)]
    pub site_name: Option<String>,
}

/// 被選中準備預約的時段，之後由預約流程獨佔
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub location: Location,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookingConfirmation {
    pub confirmation_number: String,
    pub location_name: String,
    pub slot_display: String,
    pub link: String,
}

/// 單一據點一次探測的結果
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub location: Location,
    /// 該據點最早的可預約日期（不論是否在日期區間內）
    pub next_available: Option<NaiveDate>,
    pub candidate: Option<Candidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRound {
    pub number: u64,
    pub started_at: DateTime<Local>,
}

impl PollRound {
    pub fn first() -> Self {
        Self {
            number: 1,
            started_at: Local::now(),
        }
    }

    pub fn next(&self) -> Self {
        Self {
            number: self.number + 1,
            started_at: Local::now(),
        }
    }
}

/// 相對今天的天數區間 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: i64,
    pub end: i64,
}

impl DayWindow {
    pub fn upper(end: i64) -> Self {
        Self { start: 0, end }
    }

    pub fn contains(&self, today: NaiveDate, date: NaiveDate) -> bool {
        let offset = (date - today).num_days();
        self.start <= offset && offset < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotFilters {
    pub window: DayWindow,
    pub weekdays: Option<Vec<Weekday>>,
    pub earliest: Option<NaiveTime>,
    pub latest: Option<NaiveTime>,
}

impl SlotFilters {
    pub fn new(window: DayWindow) -> Self {
        Self {
            window,
            weekdays: None,
            earliest: None,
            latest: None,
        }
    }

    pub fn accepts_date(&self, today: NaiveDate, date: NaiveDate) -> bool {
        use chrono::Datelike;

        if !self.window.contains(today, date) {
            return false;
        }
        match &self.weekdays {
            Some(days) if !days.is_empty() => days.contains(&date.weekday()),
            _ => true,
        }
    }

    pub fn accepts_slot(&self, slot: &Slot) -> bool {
        let time = slot.start_date_time.time();
        if let Some(earliest) = self.earliest {
            if time < earliest {
                return false;
            }
        }
        if let Some(latest) = self.latest {
            if time > latest {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingBookingPolicy {
    #[default]
    Keep,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Post,
}

/// 傳輸層回傳的原始狀態碼與內容，不做解讀
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap() + chrono::Duration::days(offset)
    }

    #[test]
    fn test_day_window_is_half_open() {
        let window = DayWindow { start: 2, end: 5 };
        let today = day(0);
        assert!(!window.contains(today, day(1)));
        assert!(window.contains(today, day(2)));
        assert!(window.contains(today, day(4)));
        assert!(!window.contains(today, day(5)));
        assert!(!window.contains(today, day(-1)));
    }

    #[test]
    fn test_upper_bound_form_starts_today() {
        let window = DayWindow::upper(3);
        assert!(window.contains(day(0), day(0)));
        assert!(!window.contains(day(0), day(3)));
    }

    #[test]
    fn test_weekday_filter() {
        let mut filters = SlotFilters::new(DayWindow::upper(30));
        // 2026-10-15 是星期四
        filters.weekdays = Some(vec![Weekday::Fri]);
        assert!(!filters.accepts_date(day(0), day(0)));
        assert!(filters.accepts_date(day(0), day(1)));
    }

    #[test]
    fn test_slot_time_filter() {
        let mut filters = SlotFilters::new(DayWindow::upper(30));
        filters.earliest = NaiveTime::from_hms_opt(9, 0, 0);
        filters.latest = NaiveTime::from_hms_opt(12, 0, 0);

        let slot = |h: u32| Slot {
            slot_id: 1,
            start_date_time: day(1).and_hms_opt(h, 0, 0).unwrap(),
            formatted_start_date_time: format!("{h}:00"),
            duration: 20,
        };
        assert!(!filters.accepts_slot(&slot(8)));
        assert!(filters.accepts_slot(&slot(9)));
        assert!(filters.accepts_slot(&slot(12)));
        assert!(!filters.accepts_slot(&slot(13)));
    }

    #[test]
    fn test_deserialize_availability_payload() {
        let payload = serde_json::json!({
            "LocationAvailabilityDates": [{
                "AvailabilityDate": "2026-10-18T00:00:00",
                "AvailableTimeSlots": [{
                    "SlotId": 991,
                    "Duration": 20,
                    "StartDateTime": "2026-10-18T08:40:00",
                    "FormattedStartDateTime": "October 18, 2026 8:40 AM"
                }]
            }]
        });
        let availability: LocationAvailability = serde_json::from_value(payload).unwrap();
        let window = &availability.location_availability_dates[0];
        assert_eq!(window.date(), day(3));
        assert!(window.has_open_slot());
        assert_eq!(window.available_time_slots[0].slot_id, 991);
    }
}
