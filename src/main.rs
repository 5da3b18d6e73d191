use anyhow::Context;
use clap::Parser;
use slot_hunter::utils::error::{EXIT_BOOKED, EXIT_NOTIFICATION_SETUP};
use slot_hunter::utils::{logger, validation::Validate};
use slot_hunter::{adapters, CliConfig, HttpTransport, Orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("📁 Loading configuration from: {}", cli.config.display());

    // 載入並驗證配置
    let config = match cli.load().and_then(|config| config.validate().map(|()| config)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration error: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(e.exit_code());
        }
    };
    if cli.verbose {
        tracing::debug!("Location config: {:?}", config.location);
    }

    let transport = HttpTransport::new(
        &config.app.base_url,
        &config.app.booking_link_base,
        config.app.header_timeout(),
        config.app.body_timeout(),
    )
    .context("failed to build HTTP client")?;
    let backend = match adapters::notification_backend(&config.notification) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("❌ Notification setup failed: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(EXIT_NOTIFICATION_SETUP);
        }
    };

    let orchestrator = Orchestrator::new(config, transport, backend);

    // 唯一決定結束碼的地方
    match orchestrator.run().await {
        Ok(confirmation) => {
            tracing::info!(
                "✅ Booked {} at {}",
                confirmation.slot_display,
                confirmation.location_name
            );
            println!("✅ Confirmation number: {}", confirmation.confirmation_number);
            println!("🔗 {}", confirmation.link);
            std::process::exit(EXIT_BOOKED);
        }
        Err(e) => {
            tracing::error!("❌ Run ended: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
