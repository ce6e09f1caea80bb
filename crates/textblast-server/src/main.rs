//! TextBlast - Mailing dispatch server entry point

use anyhow::Result;
use textblast_common::config::Config;
use textblast_core::{endpoint_from_config, MailingScheduler};
use textblast_storage::create_store;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging.filter);

    info!("Starting TextBlast dispatch server...");

    // Initialize storage (runs migrations for the PostgreSQL backend)
    let store = create_store(&config.database).await?;

    // Build the delivery endpoint and scheduler
    let endpoint = endpoint_from_config(&config.dispatch)?;
    let scheduler = MailingScheduler::new(store, endpoint, &config.dispatch);

    // Pick up mailings that were scheduled before the last restart
    let scheduled = scheduler.schedule_existing().await?;
    info!("TextBlast server started ({} mailings scheduled)", scheduled);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.shutdown().await;

    info!("TextBlast server shutdown complete");

    Ok(())
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
