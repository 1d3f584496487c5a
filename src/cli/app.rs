use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{init_logging, resolve_config_path, resolve_state_dir};

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.log_format)?;

    info!("Starting FeedWarden v{}", env!("CARGO_PKG_VERSION"));

    let config_path = resolve_config_path(cli.config.as_ref())?;
    let state_dir = resolve_state_dir(cli.state_dir.as_ref())?;
    let cli_context = CliContext::new(config_path, state_dir, cli.metrics_port, cli.output);

    match dispatch(&cli, &cli_context).await {
        Ok(()) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(err) => {
            error!("Command failed: {:#}", err);
            Err(err)
        }
    }
}
