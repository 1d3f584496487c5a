use anyhow::Result;
use clap::{Args, Subcommand};
use feedwarden_policy_center::WardenConfig;

use crate::cli::context::CliContext;
use crate::cli::output::render;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the resolved configuration
    Show,

    /// Validate configuration
    Validate,

    /// Print the configuration file path
    Path,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext) -> Result<()> {
    match args.action {
        ConfigAction::Show => {
            let config = ctx.load_config()?;
            match render(ctx.output(), &config)? {
                Some(text) => println!("{text}"),
                None => print_human(&config, ctx)?,
            }
        }

        ConfigAction::Validate => {
            let config = ctx.load_config()?;
            let active = config.active_categories();
            match render(
                ctx.output(),
                &serde_json::json!({ "valid": true, "activeCategories": active }),
            )? {
                Some(text) => println!("{text}"),
                None => {
                    println!("Configuration is valid ({})", ctx.config_path().display());
                    println!("- Active categories: {}", active.join(", "));
                }
            }
        }

        ConfigAction::Path => println!("{}", ctx.config_path().display()),
    }

    Ok(())
}

fn print_human(config: &WardenConfig, ctx: &CliContext) -> Result<()> {
    println!("Current configuration ({}):", ctx.config_path().display());
    println!("{}", serde_yaml::to_string(config)?);
    Ok(())
}
