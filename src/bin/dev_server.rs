//! Disclosure Explorer Development Backend
//!
//! Run with: cargo run --bin disclosure-dev-server
//!
//! # Configuration
//!
//! Reads the `[dev_server]` and `[logging]` sections of the config file
//! (`DISCLOSURE_CONFIG`, else the default locations). Environment variables:
//! - `DISCLOSURE_DEV_HOST`: Host to bind to (default: 127.0.0.1)
//! - `DISCLOSURE_DEV_PORT`: Port to listen on (default: 8000)
//! - `DISCLOSURE_CORS_ORIGINS`: Comma-separated allowed origins
//! - `RUST_LOG`: Log filter (overrides `[logging] level`)

use disclosure_explorer::config::{Config, LoggingConfig};
use disclosure_explorer::devserver::{serve, DevState};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("DISCLOSURE_CONFIG") {
        Ok(path) => Config::load_with_env(Path::new(&path))?,
        Err(_) => Config::load_default(),
    };

    init_tracing(&config.logging);

    tracing::info!(
        "Starting development backend v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("CORS origins: {:?}", config.dev_server.cors_origins);

    serve(Arc::new(DevState::new(config.dev_server))).await?;

    Ok(())
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "disclosure_explorer={},tower_http=debug",
            config.level
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
