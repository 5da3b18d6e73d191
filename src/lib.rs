pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::http::HttpTransport;
pub use config::AppConfig;
pub use core::orchestrator::Orchestrator;
pub use utils::error::{Result, SchedulerError};
