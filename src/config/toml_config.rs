use crate::domain::model::{DayWindow, ExistingBookingPolicy, SlotFilters};
use crate::utils::error::{Result, SchedulerError};
use crate::utils::validation::{self, Validate};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://publicapi.txdpsscheduler.com";
pub const DEFAULT_BOOKING_LINK_BASE: &str = "https://public.txdpsscheduler.com";
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub personal: PersonalConfig,
    pub location: LocationConfig,
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalConfig {
    pub first_name: String,
    pub last_name: String,
    /// MM/DD/YYYY
    pub date_of_birth: String,
    pub last_four_ssn: String,
    pub email: String,
    pub phone: String,
    #[serde(default = "default_type_id")]
    pub type_id: u32,
    #[serde(default)]
    pub send_sms: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    pub zip_codes: Vec<String>,
    #[serde(default = "default_max_distance")]
    pub max_distance_miles: f64,
    pub days: DaysConfig,
    pub preferred_weekdays: Option<Vec<Weekday>>,
    pub earliest_time: Option<String>,
    pub latest_time: Option<String>,
}

/// `days = 15` 或 `days = { start = 2, end = 15 }`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DaysConfig {
    Upper(i64),
    Range { start: i64, end: i64 },
}

impl DaysConfig {
    pub fn window(&self) -> DayWindow {
        match *self {
            Self::Upper(end) => DayWindow::upper(end),
            Self::Range { start, end } => DayWindow { start, end },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub existing_booking: ExistingBookingPolicy,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_header_timeout")]
    pub header_timeout_secs: u64,
    pub body_timeout_secs: Option<u64>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_api_base")]
    pub base_url: String,
    #[serde(default = "default_booking_link_base")]
    pub booking_link_base: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            existing_booking: ExistingBookingPolicy::default(),
            interval_secs: default_interval(),
            jitter_secs: default_jitter(),
            concurrency: default_concurrency(),
            header_timeout_secs: default_header_timeout(),
            body_timeout_secs: None,
            dry_run: false,
            base_url: default_api_base(),
            booking_link_base: default_booking_link_base(),
        }
    }
}

impl AppSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_secs)
    }

    pub fn header_timeout(&self) -> Duration {
        Duration::from_secs(self.header_timeout_secs)
    }

    pub fn body_timeout(&self) -> Option<Duration> {
        self.body_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Telegram,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub backend: NotificationKind,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(default = "default_telegram_api_base")]
    pub telegram_api_base: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: NotificationKind::default(),
            bot_token: None,
            chat_id: None,
            webhook_url: None,
            telegram_api_base: default_telegram_api_base(),
        }
    }
}

fn default_type_id() -> u32 {
    71
}

fn default_max_distance() -> f64 {
    25.0
}

fn default_interval() -> u64 {
    10
}

fn default_jitter() -> u64 {
    3
}

fn default_concurrency() -> usize {
    4
}

fn default_header_timeout() -> u64 {
    20
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_booking_link_base() -> String {
    DEFAULT_BOOKING_LINK_BASE.to_string()
}

fn default_telegram_api_base() -> String {
    DEFAULT_TELEGRAM_API_BASE.to_string()
}

impl AppConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SchedulerError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SchedulerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${TELEGRAM_TOKEN})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SchedulerError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 組合日期區間與偏好條件
    pub fn slot_filters(&self) -> Result<SlotFilters> {
        let mut filters = SlotFilters::new(self.location.days.window());
        filters.weekdays = self.location.preferred_weekdays.clone();
        if let Some(earliest) = &self.location.earliest_time {
            filters.earliest = Some(validation::validate_time_of_day(
                "location.earliest_time",
                earliest,
            )?);
        }
        if let Some(latest) = &self.location.latest_time {
            filters.latest = Some(validation::validate_time_of_day(
                "location.latest_time",
                latest,
            )?);
        }
        Ok(filters)
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        use crate::utils::validation::*;

        validate_non_empty_string("personal.first_name", &self.personal.first_name)?;
        validate_non_empty_string("personal.last_name", &self.personal.last_name)?;
        chrono::NaiveDate::parse_from_str(&self.personal.date_of_birth, "%m/%d/%Y").map_err(
            |e| SchedulerError::InvalidConfigValueError {
                field: "personal.date_of_birth".to_string(),
                value: self.personal.date_of_birth.clone(),
                reason: format!("Expected MM/DD/YYYY: {}", e),
            },
        )?;
        validate_digits("personal.last_four_ssn", &self.personal.last_four_ssn, 4)?;
        validate_non_empty_string("personal.email", &self.personal.email)?;

        if self.location.zip_codes.is_empty() {
            return Err(SchedulerError::MissingConfigError {
                field: "location.zip_codes".to_string(),
            });
        }
        for zip in &self.location.zip_codes {
            validate_digits("location.zip_codes", zip, 5)?;
        }
        validate_range(
            "location.max_distance_miles",
            self.location.max_distance_miles,
            0.0,
            500.0,
        )?;

        let window = self.location.days.window();
        if window.start < 0 || window.start >= window.end {
            return Err(SchedulerError::ConfigValidationError {
                field: "location.days".to_string(),
                message: format!(
                    "Day window must satisfy 0 <= start < end (got [{}, {}))",
                    window.start, window.end
                ),
            });
        }
        let filters = self.slot_filters()?;
        if let (Some(earliest), Some(latest)) = (filters.earliest, filters.latest) {
            if earliest > latest {
                return Err(SchedulerError::ConfigValidationError {
                    field: "location.earliest_time".to_string(),
                    message: "earliest_time must not be after latest_time".to_string(),
                });
            }
        }

        validate_range("app.concurrency", self.app.concurrency, 1, 32)?;
        validate_positive_number("app.interval_secs", self.app.interval_secs as usize, 1)?;
        validate_positive_number(
            "app.header_timeout_secs",
            self.app.header_timeout_secs as usize,
            1,
        )?;
        validate_url("app.base_url", &self.app.base_url)?;
        validate_url("app.booking_link_base", &self.app.booking_link_base)?;

        if self.notification.enabled {
            match self.notification.backend {
                NotificationKind::Telegram => {
                    let token =
                        validate_required_field("notification.bot_token", &self.notification.bot_token)?;
                    validate_non_empty_string("notification.bot_token", token)?;
                    validate_required_field("notification.chat_id", &self.notification.chat_id)?;
                    validate_url(
                        "notification.telegram_api_base",
                        &self.notification.telegram_api_base,
                    )?;
                }
                NotificationKind::Webhook => {
                    let url = validate_required_field(
                        "notification.webhook_url",
                        &self.notification.webhook_url,
                    )?;
                    validate_url("notification.webhook_url", url)?;
                }
            }
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}
