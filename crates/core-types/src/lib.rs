use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Shared error type for the FeedWarden crates.
#[derive(Debug, Error, Clone)]
pub enum WardenError {
    #[error("{message}")]
    Message { message: String },
}

impl WardenError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

/// Stable identifier of a feed item, extracted from the host view.
#[cfg_attr(
    feature = "serde-full",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque token naming an element of the host view.
///
/// A handle is a relation, not ownership: the view may drop or recycle the
/// element at any time, after which the generation no longer matches and the
/// view reports the handle as stale.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ViewHandle {
    pub slot: u32,
    pub generation: u32,
}

impl ViewHandle {
    pub fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }
}

impl fmt::Display for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}.{}", self.slot, self.generation)
    }
}

/// Evaluation lifecycle of an item.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Default)]
pub enum ItemState {
    #[default]
    Unseen,
    Queued,
    Scored,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Unseen => "unseen",
            ItemState::Queued => "queued",
            ItemState::Scored => "scored",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result payload delivered by the scoring backend for one item.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreData {
    pub score: f64,
    pub categories: BTreeMap<String, f64>,
    pub content_summary: Option<String>,
    pub evaluation_summary: Option<String>,
}

impl ScoreData {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, name: impl Into<String>, value: f64) -> Self {
        self.categories.insert(name.into(), value);
        self
    }

    pub fn has_summary(&self) -> bool {
        self.content_summary.is_some() || self.evaluation_summary.is_some()
    }
}
