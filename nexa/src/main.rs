mod catalog;
mod migrations;
mod server;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use nexa_core::config::Config;
use nexa_core::logging;

#[derive(Debug, Parser)]
#[command(name = "nexa", about = "Nexa media server playback delivery core")]
struct Args {
    /// Path to a configuration file (TOML)
    #[arg(long, env = "NEXA_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.http_port = port;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    logging::init_logging(&config.logging)?;
    info!(?config, "configuration loaded");

    let pool = server::init_database(&config).await?;
    migrations::run_migrations(&pool).await?;

    tokio::fs::create_dir_all(&config.transcode.root_dir).await?;

    let services = server::init_services(&config, pool);
    server::serve(&config, services).await
}
