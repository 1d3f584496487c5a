use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use feedwarden_policy_center::{load_config_with_options, LoadOptions, WardenConfig};
use feedwarden_state_center::{FileAuditLog, MarkerSets};
use tracing::{debug, info};

use super::output::OutputFormat;

pub struct CliContext {
    config_path: PathBuf,
    state_dir: PathBuf,
    metrics_port: u16,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(
        config_path: PathBuf,
        state_dir: PathBuf,
        metrics_port: u16,
        output: OutputFormat,
    ) -> Self {
        Self {
            config_path,
            state_dir,
            metrics_port,
            output,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn metrics_port(&self) -> u16 {
        self.metrics_port
    }

    pub fn output(&self) -> OutputFormat {
        self.output
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::with_path(&self.config_path)
    }

    /// Defaults, the config file when present, then environment overlays.
    pub fn load_config(&self) -> Result<WardenConfig> {
        if self.config_path.exists() {
            info!("Loading configuration from: {}", self.config_path.display());
        } else {
            debug!(
                "Config file not found, using defaults: {}",
                self.config_path.display()
            );
        }
        load_config_with_options(&self.load_options())
            .with_context(|| format!("Failed to load configuration {}", self.config_path.display()))
    }

    fn ensure_state_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("Failed to create state directory {}", self.state_dir.display()))
    }

    pub fn open_markers(&self) -> Result<MarkerSets> {
        self.ensure_state_dir()?;
        MarkerSets::open(&self.state_dir).context("Failed to open marker sets")
    }

    pub fn open_audit_log(&self) -> Result<FileAuditLog> {
        self.ensure_state_dir()?;
        FileAuditLog::open(self.state_dir.join(FileAuditLog::FILE_NAME))
            .context("Failed to open action log")
    }
}
