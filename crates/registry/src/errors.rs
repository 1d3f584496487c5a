use feedwarden_core_types::{ItemId, ItemState};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("item {item} cannot move from {from} to {to}")]
    InvalidTransition {
        item: ItemId,
        from: ItemState,
        to: ItemState,
    },
}

impl RegistryError {
    pub fn into_warden_error(self, detail: impl Into<String>) -> feedwarden_core_types::WardenError {
        let message = format!("{}: {}", self, detail.into());
        feedwarden_core_types::WardenError::new(message)
    }
}
