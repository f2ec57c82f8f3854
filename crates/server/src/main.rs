//! keg server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use keg_core::config::AppConfig;
use keg_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// keg - a self-hosted NuGet feed
#[derive(Parser, Debug)]
#[command(name = "kegd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "KEG_CONFIG", default_value = "config/server.toml")]
    config: String,
}

/// Load configuration from an optional TOML file overlaid with `KEG_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("KEG_").ignore(&["CONFIG"]).split("__"))
        .extract()
        .context("failed to load configuration")?;

    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("keg v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    keg_server::metrics::register_metrics();

    let store = keg_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    store
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = store.backend_name(), "Storage backend initialized");

    let metadata = keg_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, store, metadata)?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
