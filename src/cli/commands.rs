use clap::Subcommand;

use super::audit::AuditArgs;
use super::config::ConfigArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the orchestrator against a scripted feed and the configured backend
    Run(RunArgs),

    /// Inspect FeedWarden configuration
    Config(ConfigArgs),

    /// Inspect or clear the action log
    Audit(AuditArgs),

    /// List items that already received idempotent actions
    Markers,

    /// Show version and build information
    Info,
}
