use std::time::Duration;
use thiserror::Error;

/// 預約成功後的正常結束
pub const EXIT_BOOKED: i32 = 0;
/// 其他致命錯誤（設定、啟動查詢失敗等）
pub const EXIT_FATAL: i32 = 1;
/// Dry-run 模式拒絕執行破壞性操作
pub const EXIT_DRY_RUN: i32 = 2;
/// 已有預約且策略為保留
pub const EXIT_EXISTING_BOOKING: i32 = 3;
/// 通知頻道初始化失敗
pub const EXIT_NOTIFICATION_SETUP: i32 = 4;
/// 取消既有預約失敗
pub const EXIT_CANCELLATION: i32 = 5;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("HTTP request failed: {0}")]
    TransportError(#[from] reqwest::Error),

    #[error("Timed out after {timeout:?} waiting for response headers from {path}")]
    HeaderTimeout { path: String, timeout: Duration },

    #[error("Timed out after {timeout:?} reading response body from {path}")]
    BodyTimeout { path: String, timeout: Duration },

    #[error("API call to {endpoint} returned status {status}: {body}")]
    ApiError {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("{step} rejected: {message}")]
    SoftFailure { step: String, message: String },

    #[error("Notification channel error: {message}")]
    NotificationError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Dry-run mode refused to {action}")]
    DryRunRefused { action: String },

    #[error("Existing booking {confirmation} found and policy is to keep it")]
    ExistingBookingKept { confirmation: String },

    #[error("Notification setup failed: {message}")]
    NotificationSetupError { message: String },

    #[error("Failed to cancel existing booking {confirmation}: {reason}")]
    CancellationFailed { confirmation: String, reason: String },

    #[error("No locations within {max_distance} miles of {zip_codes}")]
    NoLocations { zip_codes: String, max_distance: f64 },
}

impl SchedulerError {
    /// 對應到程序結束碼，只由 main 使用
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DryRunRefused { .. } => EXIT_DRY_RUN,
            Self::ExistingBookingKept { .. } => EXIT_EXISTING_BOOKING,
            Self::NotificationSetupError { .. } => EXIT_NOTIFICATION_SETUP,
            Self::CancellationFailed { .. } => EXIT_CANCELLATION,
            _ => EXIT_FATAL,
        }
    }

    /// 網路層錯誤（連線失敗、逾時）
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportError(_) | Self::HeaderTimeout { .. } | Self::BodyTimeout { .. }
        )
    }

    pub fn soft(step: &str, message: impl Into<String>) -> Self {
        Self::SoftFailure {
            step: step.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
