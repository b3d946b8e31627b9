//! # Pager Server
//!
//! Minimal real-time messaging relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! pager
//!
//! # Run with environment variables
//! PAGER_PORT=8080 PAGER_HOST=0.0.0.0 pager
//! ```

use anyhow::Result;
use pager_server::{config::Config, handlers};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pager_server=debug,pager_core=debug,pager_transport=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!("Starting Pager server on {}:{}", config.host, config.port);

    handlers::run_server(config).await?;

    Ok(())
}
