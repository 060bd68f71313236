use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use safenote_devnode::{DevnodeConfig, DevnodeState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "safenote_devnode=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting secure-notes devnode");

    dotenvy::dotenv().ok();
    let config = DevnodeConfig::from_env()?;

    info!("Contract address: {}", config.contract_address);
    info!(
        "Confirmation delay: {} ms",
        config.confirmation_delay.as_millis()
    );

    let state = Arc::new(DevnodeState::new(config));
    safenote_devnode::run(state).await?;
    Ok(())
}
