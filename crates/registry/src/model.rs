use std::time::Instant;

use feedwarden_core_types::{ItemId, ItemState, ScoreData, ViewHandle};

/// Registry entry for one feed item.
#[derive(Clone, Debug)]
pub struct ItemRecord {
    pub id: ItemId,
    pub state: ItemState,
    pub view_handle: Option<ViewHandle>,
    pub score: Option<ScoreData>,
    pub first_seen_at: Instant,
    pub updated_at: Instant,
}

impl ItemRecord {
    pub fn new(id: ItemId) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: ItemState::Unseen,
            view_handle: None,
            score: None,
            first_seen_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Instant::now();
    }
}

/// What `ItemRegistry::bind` did with the offered handle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BindOutcome {
    /// First sighting; a fresh record was created.
    Created,
    /// Known item without a handle (e.g. scored before it was seen).
    Attached,
    /// Known item whose previous handle was replaced.
    Rebound { previous: ViewHandle },
    /// The same handle was already bound.
    Unchanged,
}

impl BindOutcome {
    pub fn is_new_binding(&self) -> bool {
        !matches!(self, BindOutcome::Unchanged)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct StateCounts {
    pub unseen: usize,
    pub queued: usize,
    pub scored: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.unseen + self.queued + self.scored
    }
}
