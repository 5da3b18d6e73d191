pub mod toml_config;

pub use toml_config::AppConfig;

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

/// 程序參數，每個旗標也可由環境變數提供
#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "slot-hunter")]
#[command(about = "Polls appointment locations and books the first matching slot")]
pub struct CliConfig {
    /// Path to the TOML configuration file
    #[arg(long, env = "SCHEDULER_CONFIG", default_value = "config.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, env = "SCHEDULER_VERBOSE")]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, env = "SCHEDULER_JSON_LOGS")]
    pub json_logs: bool,

    /// Refuse every destructive call (cancel, hold, book)
    #[arg(long, env = "SCHEDULER_DRY_RUN")]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入設定檔並套用命令列覆寫
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = AppConfig::from_file(&self.config)?;
        if self.dry_run {
            config.app.dry_run = true;
        }
        Ok(config)
    }
}
