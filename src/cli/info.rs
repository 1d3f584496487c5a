use anyhow::Result;
use serde_json::json;

use crate::cli::context::CliContext;
use crate::cli::output::render;

const BUILD_DATE: &str = match option_env!("BUILD_DATE") {
    Some(date) => date,
    None => "unknown",
};
const GIT_HASH: &str = match option_env!("GIT_HASH") {
    Some(hash) => hash,
    None => "unknown",
};

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let info = json!({
        "name": "FeedWarden",
        "version": env!("CARGO_PKG_VERSION"),
        "buildDate": BUILD_DATE,
        "gitCommit": GIT_HASH,
        "configPath": ctx.config_path().display().to_string(),
        "configPresent": ctx.config_path().exists(),
        "stateDir": ctx.state_dir().display().to_string(),
        "metricsPort": ctx.metrics_port(),
    });
    if let Some(text) = render(ctx.output(), &info)? {
        println!("{text}");
        return Ok(());
    }

    println!("FeedWarden System Information");
    println!("=============================");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", BUILD_DATE);
    println!("Git Commit: {}", GIT_HASH);
    println!();
    println!("Paths:");
    println!(
        "- Config File: {}{}",
        ctx.config_path().display(),
        if ctx.config_path().exists() {
            ""
        } else {
            " (not found, defaults apply)"
        }
    );
    println!("- State Directory: {}", ctx.state_dir().display());
    if ctx.metrics_port() == 0 {
        println!("- Metrics: disabled");
    } else {
        println!("- Metrics: http://127.0.0.1:{}/metrics", ctx.metrics_port());
    }
    Ok(())
}
