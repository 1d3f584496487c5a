use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use feedwarden_state_center::AuditSink;

use crate::cli::context::CliContext;
use crate::cli::output::render;

#[derive(Args, Clone, Debug)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub action: AuditAction,
}

#[derive(Subcommand, Clone, Debug)]
pub enum AuditAction {
    /// Show recent actions, newest first
    Show {
        /// Maximum number of entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Remove every entry
    Clear,
}

pub async fn cmd_audit(args: AuditArgs, ctx: &CliContext) -> Result<()> {
    let mut log = ctx.open_audit_log()?;
    match args.action {
        AuditAction::Show { limit } => {
            let entries: Vec<_> = log.entries().into_iter().take(limit).collect();
            if let Some(text) = render(ctx.output(), &entries)? {
                println!("{text}");
                return Ok(());
            }
            if entries.is_empty() {
                println!("No actions recorded ({})", log.path().display());
                return Ok(());
            }
            println!("Recent actions ({}):", log.path().display());
            for entry in entries {
                let score = entry
                    .score
                    .map(|s| format!(" score={s:.1}"))
                    .unwrap_or_default();
                println!(
                    "- {} {} {}{}",
                    entry
                        .timestamp
                        .with_timezone(&chrono::Local)
                        .format("%Y-%m-%d %H:%M:%S"),
                    entry.kind.as_str(),
                    entry.item,
                    score
                );
            }
        }

        AuditAction::Clear => {
            log.clear().context("Failed to clear action log")?;
            println!("Action log cleared");
        }
    }
    Ok(())
}
