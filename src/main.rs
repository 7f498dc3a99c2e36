use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patronage_backend::bootstrap;
use patronage_backend::config::Config;

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,patronage_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("starting patronage payments worker");

    dotenv::dotenv().ok();
    let config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    let services = bootstrap::initialize_services(&config).await?;

    let scheduler_handle = services.scheduler.start();
    info!(
        execution_hour = config.jobs_execution_hour,
        "maintenance scheduler started"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, stopping scheduler");
    scheduler_handle.abort();

    Ok(())
}
