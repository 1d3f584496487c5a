use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use crate::errors::ConfigError;
use crate::loader::{load_config_with_options, LoadOptions};
use crate::model::{ConfigSnapshot, WardenConfig};

/// Source of configuration snapshots. Replacement is the only update path:
/// every change publishes a whole new snapshot to subscribers.
#[async_trait]
pub trait ConfigCenter: Send + Sync {
    async fn snapshot(&self) -> Arc<ConfigSnapshot>;
    async fn replace(&self, config: WardenConfig) -> Result<Arc<ConfigSnapshot>, ConfigError>;
    async fn reload(&self) -> Result<Arc<ConfigSnapshot>, ConfigError>;
    fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>>;
}

struct ConfigState {
    snapshot: Arc<ConfigSnapshot>,
    rev_counter: u64,
}

impl ConfigState {
    fn new(config: WardenConfig) -> Self {
        Self {
            snapshot: Arc::new(ConfigSnapshot::new(1, config)),
            rev_counter: 1,
        }
    }

    fn install(&mut self, config: WardenConfig) -> Arc<ConfigSnapshot> {
        self.rev_counter = self.rev_counter.saturating_add(1);
        self.snapshot = Arc::new(ConfigSnapshot::new(self.rev_counter, config));
        Arc::clone(&self.snapshot)
    }
}

pub struct InMemoryConfigCenter {
    state: Arc<Mutex<ConfigState>>,
    watch_tx: watch::Sender<Arc<ConfigSnapshot>>,
    source: Option<LoadOptions>,
}

impl InMemoryConfigCenter {
    pub fn new(config: WardenConfig) -> Self {
        let state = ConfigState::new(config);
        let (watch_tx, _watch_rx) = watch::channel(Arc::clone(&state.snapshot));
        Self {
            state: Arc::new(Mutex::new(state)),
            watch_tx,
            source: None,
        }
    }

    /// Loads the initial snapshot from `options` and remembers them so
    /// `reload` can re-read the same sources.
    pub fn from_options(options: LoadOptions) -> Result<Self, ConfigError> {
        let config = load_config_with_options(&options)?;
        let mut center = Self::new(config);
        center.source = Some(options);
        Ok(center)
    }

    async fn publish(&self, config: WardenConfig) -> Arc<ConfigSnapshot> {
        let mut guard = self.state.lock().await;
        let snapshot = guard.install(config);
        drop(guard);
        if self.watch_tx.send(Arc::clone(&snapshot)).is_err() {
            warn!(target: "feedwarden::config", "configuration update had no listeners");
        }
        snapshot
    }
}

#[async_trait]
impl ConfigCenter for InMemoryConfigCenter {
    async fn snapshot(&self) -> Arc<ConfigSnapshot> {
        let guard = self.state.lock().await;
        Arc::clone(&guard.snapshot)
    }

    async fn replace(&self, config: WardenConfig) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        config.validate()?;
        let snapshot = self.publish(config).await;
        info!(target: "feedwarden::config", rev = snapshot.rev, "configuration replaced");
        Ok(snapshot)
    }

    async fn reload(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let options = self.source.as_ref().ok_or(ConfigError::NoSource)?;
        let config = load_config_with_options(options)?;
        let snapshot = self.publish(config).await;
        info!(target: "feedwarden::config", rev = snapshot.rev, "configuration reloaded");
        Ok(snapshot)
    }

    fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.watch_tx.subscribe()
    }
}
