pub mod api;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod tier;

pub use api::{ConfigCenter, InMemoryConfigCenter};
pub use defaults::default_config;
pub use errors::ConfigError;
pub use loader::{load_config, load_config_with_options, LoadOptions};
pub use model::{AutoActions, ConfigSnapshot, ScoreThresholds, TimingPolicy, WardenConfig};
pub use tier::Tier;
