//! rentq server entry point.

use clap::Parser;
use rentq::api::{serve, AppState};
use rentq::Config;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// rentq: rent and deposit forecast lookup service
#[derive(Parser, Debug)]
#[command(name = "rentq")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// HTTP port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the SQLite snapshot file
    #[arg(long)]
    db: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Starting rentq v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; environment wins over the file, flags win over both
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::load()?
    };
    config.apply_env_overrides();

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }

    tracing::info!(
        port = config.server.port,
        db = %config.database.path,
        llama = %config.llama.base_url,
        "Configuration loaded"
    );

    let state = Arc::new(AppState::from_config(config)?);
    serve(state).await?;

    Ok(())
}
