use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::output::LogFormat;

pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    Ok(())
}

pub fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    match config_path {
        Some(path) => Ok(path.clone()),
        None => {
            let mut path = dirs::config_dir().context("Failed to get config directory")?;
            path.push("feedwarden");
            path.push("config.yaml");
            Ok(path)
        }
    }
}

pub fn resolve_state_dir(state_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match state_dir {
        Some(dir) => Ok(dir.clone()),
        None => {
            let mut dir = dirs::data_dir().context("Failed to get data directory")?;
            dir.push("feedwarden");
            Ok(dir)
        }
    }
}
