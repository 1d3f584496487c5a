use super::audit::cmd_audit;
use super::config::cmd_config;
use super::env::CliArgs;
use super::info::cmd_info;
use super::markers::cmd_markers;
use super::run::cmd_run;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
        Commands::Audit(args) => cmd_audit(args, ctx).await,
        Commands::Markers => cmd_markers(ctx).await,
        Commands::Info => cmd_info(ctx).await,
    }
}
