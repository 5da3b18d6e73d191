use crate::config::toml_config::PersonalConfig;
use crate::domain::model::{
    Candidate, ExistingBooking, HttpMethod, Location, LocationAvailability, RawResponse,
};
use crate::domain::ports::Transport;
use crate::utils::error::{Result, SchedulerError};
use serde::Deserialize;
use serde_json::json;

pub const EXISTING_BOOKING_PATH: &str = "/api/Booking";
pub const ELIGIBILITY_PATH: &str = "/api/Eligibility";
pub const LOCATIONS_PATH: &str = "/api/AvailableLocation";
pub const LOCATION_DATES_PATH: &str = "/api/AvailableLocationDates";
pub const HOLD_SLOT_PATH: &str = "/api/HoldSlot";
pub const NEW_BOOKING_PATH: &str = "/api/NewBooking";
pub const CANCEL_BOOKING_PATH: &str = "/api/CancelBooking";

const BODY_EXCERPT_LEN: usize = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EligibilityEntry {
    response_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HoldResponse {
    #[serde(default)]
    slot_held_successfully: bool,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BookingResponse {
    booking: BookingDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BookingDetails {
    confirmation_number: String,
}

/// 排程 API 的型別化呼叫
pub struct SchedulingClient<T: Transport> {
    transport: T,
    applicant: PersonalConfig,
}

impl<T: Transport> SchedulingClient<T> {
    pub fn new(transport: T, applicant: PersonalConfig) -> Self {
        Self {
            transport,
            applicant,
        }
    }

    fn identity(&self) -> serde_json::Value {
        json!({
            "FirstName": self.applicant.first_name,
            "LastName": self.applicant.last_name,
            "DateOfBirth": self.applicant.date_of_birth,
            "LastFourDigitsSsn": self.applicant.last_four_ssn,
        })
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<RawResponse> {
        self.transport.send(path, HttpMethod::Post, Some(&body)).await
    }

    /// 查詢既有預約
    pub async fn existing_bookings(&self) -> Result<Vec<ExistingBooking>> {
        let response = self.post(EXISTING_BOOKING_PATH, self.identity()).await?;
        let response = expect_success(EXISTING_BOOKING_PATH, response)?;
        Ok(response.json()?)
    }

    /// 取得預約用的 ResponseId，須在預約前即時取得
    pub async fn eligibility_response_id(&self) -> Result<i64> {
        let mut body = self.identity();
        body["CardNumber"] = json!("");
        let response = self.post(ELIGIBILITY_PATH, body).await?;
        let response = expect_success(ELIGIBILITY_PATH, response)?;
        let entries: Vec<EligibilityEntry> = response.json()?;
        entries
            .first()
            .map(|entry| entry.response_id)
            .ok_or_else(|| SchedulerError::ApiError {
                endpoint: ELIGIBILITY_PATH.to_string(),
                status: response.status,
                body: "eligibility response contained no entries".to_string(),
            })
    }

    pub async fn locations(&self, zip_code: &str) -> Result<Vec<Location>> {
        let body = json!({
            "TypeId": self.applicant.type_id,
            "ZipCode": zip_code,
            "CityName": "",
            "PreferredDay": 0,
        });
        let response = self.post(LOCATIONS_PATH, body).await?;
        let response = expect_success(LOCATIONS_PATH, response)?;
        Ok(response.json()?)
    }

    pub async fn location_dates(&self, location_id: u64) -> Result<LocationAvailability> {
        let body = json!({
            "LocationId": location_id,
            "TypeId": self.applicant.type_id,
            "SameDay": false,
            "StartDate": null,
            "PreferredDay": 0,
        });
        let response = self.post(LOCATION_DATES_PATH, body).await?;
        let response = expect_success(LOCATION_DATES_PATH, response)?;
        Ok(response.json()?)
    }

    /// 暫時保留時段；遠端拒絕時回傳 `SoftFailure`
    pub async fn hold_slot(&self, candidate: &Candidate) -> Result<()> {
        let body = json!({
            "SlotId": candidate.slot.slot_id,
            "FirstName": self.applicant.first_name,
            "LastName": self.applicant.last_name,
            "DateOfBirth": self.applicant.date_of_birth,
            "Last4Ssn": self.applicant.last_four_ssn,
        });
        let response = self.post(HOLD_SLOT_PATH, body).await?;
        if response.status != 200 {
            return Err(SchedulerError::soft(
                "hold",
                format!("status {}: {}", response.status, excerpt(&response.body)),
            ));
        }

        let hold: HoldResponse = response.json()?;
        if !hold.slot_held_successfully {
            return Err(SchedulerError::soft(
                "hold",
                hold.error_message
                    .unwrap_or_else(|| "slot was not held".to_string()),
            ));
        }
        Ok(())
    }

    /// 正式預約已保留的時段，成功時回傳確認編號
    pub async fn book_slot(&self, candidate: &Candidate, response_id: i64) -> Result<String> {
        let body = json!({
            "CardNumber": "",
            "Email": self.applicant.email,
            "CellPhone": self.applicant.phone,
            "HomePhone": "",
            "ServiceTypeId": self.applicant.type_id,
            "BookingDateTime": candidate.slot.start_date_time,
            "BookingDuration": candidate.slot.duration,
            "SpanishLanguage": "N",
            "SiteId": candidate.location.id,
            "SendSms": self.applicant.send_sms,
            "AdaRequired": false,
            "FirstName": self.applicant.first_name,
            "LastName": self.applicant.last_name,
            "DateOfBirth": self.applicant.date_of_birth,
            "Last4Ssn": self.applicant.last_four_ssn,
            "ResponseId": response_id,
        });
        let response = self.post(NEW_BOOKING_PATH, body).await?;
        if response.status != 200 {
            return Err(SchedulerError::soft(
                "book",
                format!("status {}: {}", response.status, excerpt(&response.body)),
            ));
        }

        let booking: BookingResponse = response.json()?;
        Ok(booking.booking.confirmation_number)
    }

    pub async fn cancel_booking(&self, booking: &ExistingBooking) -> Result<()> {
        let mut body = self.identity();
        body["ConfirmationNumber"] = json!(booking.confirmation_number);
        let response = self.post(CANCEL_BOOKING_PATH, body).await?;
        if response.status != 200 {
            return Err(SchedulerError::ApiError {
                endpoint: CANCEL_BOOKING_PATH.to_string(),
                status: response.status,
                body: excerpt(&response.body),
            });
        }
        Ok(())
    }
}

fn expect_success(endpoint: &str, response: RawResponse) -> Result<RawResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(SchedulerError::ApiError {
            endpoint: endpoint.to_string(),
            status: response.status,
            body: excerpt(&response.body),
        })
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}
