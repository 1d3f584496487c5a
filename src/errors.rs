//! Error taxonomy of the orchestrator.
//!
//! No variant is fatal: every handler logs and keeps the event loop running.
//! The worst outcome of a single failure is one item without badge or action.

use feedwarden_core_types::{ItemId, WardenError};
use feedwarden_policy_center::ConfigError;
use feedwarden_registry::RegistryError;
use feedwarden_state_center::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Push channel failures. Always retried by reconnecting.
    #[error("transport error: {0}")]
    Transport(String),

    /// The evaluation request for an item failed; the item is reverted to
    /// Unseen so a later pass retries it.
    #[error("dispatch of {item} failed: {reason}")]
    Dispatch { item: ItemId, reason: String },

    /// Malformed push message. The message is dropped, the channel stays up.
    #[error("parse error: {0}")]
    Parse(String),

    /// A host-view interaction could not be completed.
    #[error("action on {item} failed: {reason}")]
    Action { item: ItemId, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl OrchestratorError {
    pub fn dispatch(item: &ItemId, reason: impl Into<String>) -> Self {
        Self::Dispatch {
            item: item.clone(),
            reason: reason.into(),
        }
    }

    pub fn action(item: &ItemId, reason: impl Into<String>) -> Self {
        Self::Action {
            item: item.clone(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Transport(_) | OrchestratorError::Dispatch { .. }
        )
    }

    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Transport(_) => "transport",
            OrchestratorError::Dispatch { .. } => "dispatch",
            OrchestratorError::Parse(_) => "parse",
            OrchestratorError::Action { .. } => "action",
            OrchestratorError::Config(_) => "config",
            OrchestratorError::Store(_) => "store",
            OrchestratorError::Registry(_) => "registry",
        }
    }
}

impl From<OrchestratorError> for WardenError {
    fn from(value: OrchestratorError) -> Self {
        WardenError::new(value.to_string())
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_dispatch_are_retryable() {
        assert!(OrchestratorError::Transport("reset".into()).is_retryable());
        assert!(OrchestratorError::dispatch(&ItemId::from("a"), "503").is_retryable());
        assert!(!OrchestratorError::Parse("bad json".into()).is_retryable());
        assert!(!OrchestratorError::action(&ItemId::from("a"), "no menu").is_retryable());
    }

    #[test]
    fn dispatch_message_names_item() {
        let err = OrchestratorError::dispatch(&ItemId::from("abc123"), "status 500");
        assert_eq!(err.to_string(), "dispatch of abc123 failed: status 500");
        assert_eq!(err.kind(), "dispatch");
    }
}
