use feedwarden_core_types::WardenError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no reloadable configuration source")]
    NoSource,
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for WardenError {
    fn from(value: ConfigError) -> Self {
        WardenError::new(value.to_string())
    }
}
