//! tierview-server - tier and review editing service

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tierview_common::config::{AppConfig, ConfigOverrides};
use tierview_common::db::init_database;
use tierview_server::{build_router, AppState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Command-line arguments; each falls back to an environment variable
#[derive(Debug, Parser)]
#[command(name = "tierview-server", version, about)]
struct Args {
    /// TOML configuration file (default: ./tierview.toml if present)
    #[arg(long, env = "TIERVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "TIERVIEW_PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(long, env = "TIERVIEW_DATABASE")]
    database: Option<PathBuf>,

    /// Directory holding uploaded images
    #[arg(long, env = "TIERVIEW_STORAGE_ROOT")]
    storage_root: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(ConfigOverrides {
        config_path: args.config,
        database_path: args.database,
        storage_root: args.storage_root,
        port: args.port,
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting tierview-server v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {}", config.database_path.display());
    info!("Storage root: {}", config.storage_root.display());

    std::fs::create_dir_all(&config.storage_root)?;

    let pool = match init_database(&config.database_path).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    let bind = format!("{}:{}", config.bind_address, config.port);
    let app = build_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("tierview-server listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("tierview-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
