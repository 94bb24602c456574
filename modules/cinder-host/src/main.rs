use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use cinder_common::config::DEFAULT_CONFIG_FILENAME;
use cinder_common::{telemetry, Config};
use cinder_host::Host;

#[derive(Parser, Debug)]
#[command(name = "cinder-host", about = "Run the callback dispatch host")]
struct Args {
    /// Path to the TOML config file. Missing file means defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)?;
    telemetry::init_tracing(&config.logging)?;

    info!(config = %args.config.display(), "cinder host starting...");

    let mut host = Host::new(config)?;
    host.init();

    host.run(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "Failed to listen for shutdown signal");
        }
    })
    .await?;

    host.shutdown();
    Ok(())
}
