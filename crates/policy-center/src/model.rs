use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ConfigError;

/// Configuration contract shared with the settings store.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WardenConfig {
    pub server_url: String,
    pub ws_url: String,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
    pub score_thresholds: ScoreThresholds,
    #[serde(default)]
    pub auto_actions: AutoActions,
    #[serde(default)]
    pub custom_prompts: Vec<String>,
    #[serde(default = "default_log_actions")]
    pub log_actions: bool,
    #[serde(default)]
    pub timings: TimingPolicy,
}

fn default_log_actions() -> bool {
    true
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScoreThresholds {
    pub hide: f64,
    pub warning: f64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AutoActions {
    #[serde(default)]
    pub hide_videos: bool,
    #[serde(default)]
    pub show_warnings: bool,
    #[serde(default)]
    pub use_not_interested: bool,
}

/// Timer settings for the orchestrator, in milliseconds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimingPolicy {
    pub debounce_ms: u64,
    pub location_poll_ms: u64,
    pub navigation_rescan_ms: u64,
    pub reconnect_delay_ms: u64,
    pub menu_open_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            location_poll_ms: 1_000,
            navigation_rescan_ms: 1_000,
            reconnect_delay_ms: 5_000,
            menu_open_delay_ms: 500,
            settle_delay_ms: 1_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl TimingPolicy {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn location_poll(&self) -> Duration {
        Duration::from_millis(self.location_poll_ms.max(1))
    }

    pub fn navigation_rescan(&self) -> Duration {
        Duration::from_millis(self.navigation_rescan_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn menu_open_delay(&self) -> Duration {
        Duration::from_millis(self.menu_open_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

impl WardenConfig {
    /// Enabled category names, in name order.
    pub fn active_categories(&self) -> Vec<String> {
        self.categories
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn evaluate_endpoint(&self) -> String {
        format!(
            "{}/api/videos/evaluate",
            self.server_url.trim_end_matches('/')
        )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let server = Url::parse(&self.server_url)
            .map_err(|err| ConfigError::InvalidValue(format!("serverUrl: {err}")))?;
        if !matches!(server.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue(format!(
                "serverUrl must be http(s), got {}",
                server.scheme()
            )));
        }
        let ws = Url::parse(&self.ws_url)
            .map_err(|err| ConfigError::InvalidValue(format!("wsUrl: {err}")))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue(format!(
                "wsUrl must be ws(s), got {}",
                ws.scheme()
            )));
        }
        let ScoreThresholds { hide, warning } = self.score_thresholds;
        if !hide.is_finite() || !warning.is_finite() {
            return Err(ConfigError::InvalidValue(
                "score thresholds must be finite numbers".into(),
            ));
        }
        if hide > warning {
            return Err(ConfigError::InvalidValue(format!(
                "hide threshold {hide} exceeds warning threshold {warning}"
            )));
        }
        Ok(())
    }
}

/// Immutable, revisioned configuration value handed to the orchestrator.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigSnapshot {
    pub rev: u64,
    pub config: WardenConfig,
}

impl ConfigSnapshot {
    pub fn new(rev: u64, config: WardenConfig) -> Self {
        Self { rev, config }
    }
}
