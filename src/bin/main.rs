//! Main binary for the SCION endhost path daemon.
//!
//! Loads the identity and service registry from the configuration
//! directory, starts the daemon and runs until interrupted.

use anyhow::Context;
use clap::Parser;
use sciond::{Daemon, SciondConfig, Topology};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "sciond")]
#[command(about = "SCION endhost path daemon - resolves and caches forwarding paths")]
struct Cli {
    /// Configuration directory holding sciond.toml and topology.toml
    #[arg(short, long, default_value = "conf")]
    conf_dir: PathBuf,

    /// Bind the local client API
    #[arg(long)]
    run_local_api: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.conf_dir.join("sciond.toml");
    let mut config = if config_path.exists() {
        SciondConfig::from_file(&config_path).context("loading sciond.toml")?
    } else {
        SciondConfig::default()
    };
    if cli.run_local_api {
        config.run_local_api = true;
    }
    let topology = Topology::from_file(&cli.conf_dir.join("topology.toml"))
        .context("loading topology.toml")?;

    let daemon = Daemon::start(config, topology)
        .await
        .context("starting daemon")?;
    if let Some(api_addr) = daemon.api_addr() {
        info!("Local API listening on {}", api_addr);
    }

    tokio::signal::ctrl_c().await?;
    daemon.stop();
    Ok(())
}
