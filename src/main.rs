//! vox-sync - runs the settings cache and change-feed listener until Ctrl-C.

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vox_sync::{Config, SyncRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vox_sync=info,tokio_postgres=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting vox-sync...");

    let config = Config::from_env().context("failed to load configuration")?;
    info!(
        "Configuration loaded (database {}@{}:{}/{})",
        config.database.user, config.database.host, config.database.port, config.database.dbname
    );

    let runtime = SyncRuntime::start(&config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    runtime.shutdown().await?;
    info!("Goodbye");
    Ok(())
}
