use std::collections::HashMap;

use feedwarden_core_types::{ItemId, ItemState, ScoreData, ViewHandle};
use tracing::debug;

use crate::{
    errors::RegistryError,
    metrics,
    model::{BindOutcome, ItemRecord, StateCounts},
};

/// Session-scoped table of feed items keyed by their stable identifier.
///
/// Records are never removed during a session. Writers are the discovery
/// engine (`bind`), the dispatcher (`mark_queued` / `revert_to_unseen`) and
/// the result reconciler (`record_score`).
#[derive(Debug, Default)]
pub struct ItemRegistry {
    items: HashMap<ItemId, ItemRecord>,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&ItemRecord> {
        self.items.get(id)
    }

    pub fn state(&self, id: &ItemId) -> Option<ItemState> {
        self.items.get(id).map(|record| record.state)
    }

    pub fn handle(&self, id: &ItemId) -> Option<ViewHandle> {
        self.items.get(id).and_then(|record| record.view_handle)
    }

    pub fn score(&self, id: &ItemId) -> Option<&ScoreData> {
        self.items.get(id).and_then(|record| record.score.as_ref())
    }

    /// Associates `handle` with `id`, creating the record on first sight.
    /// An existing handle is replaced outright.
    pub fn bind(&mut self, id: &ItemId, handle: ViewHandle) -> BindOutcome {
        let outcome = match self.items.get_mut(id) {
            Some(record) => {
                let outcome = match record.view_handle {
                    Some(previous) if previous == handle => BindOutcome::Unchanged,
                    Some(previous) => BindOutcome::Rebound { previous },
                    None => BindOutcome::Attached,
                };
                record.view_handle = Some(handle);
                record.touch();
                outcome
            }
            None => {
                let mut record = ItemRecord::new(id.clone());
                record.view_handle = Some(handle);
                self.items.insert(id.clone(), record);
                BindOutcome::Created
            }
        };

        match outcome {
            BindOutcome::Created => metrics::record_binding("created"),
            BindOutcome::Attached => metrics::record_binding("attached"),
            BindOutcome::Rebound { previous } => {
                debug!(target: "feedwarden::registry", item = %id, %previous, %handle, "view handle replaced");
                metrics::record_binding("rebound");
            }
            BindOutcome::Unchanged => {}
        }
        if matches!(outcome, BindOutcome::Created) {
            self.publish_counts();
        }
        outcome
    }

    /// Unseen → Queued. Rejects items that are already queued or scored.
    pub fn mark_queued(&mut self, id: &ItemId) -> Result<(), RegistryError> {
        let record = self
            .items
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        if record.state != ItemState::Unseen {
            return Err(RegistryError::InvalidTransition {
                item: id.clone(),
                from: record.state,
                to: ItemState::Queued,
            });
        }
        record.state = ItemState::Queued;
        record.touch();
        self.publish_counts();
        Ok(())
    }

    /// Queued → Unseen. Returns `false` when the item was not queued, which
    /// happens when a score overtook a failing request.
    pub fn revert_to_unseen(&mut self, id: &ItemId) -> bool {
        let Some(record) = self.items.get_mut(id) else {
            return false;
        };
        if record.state != ItemState::Queued {
            return false;
        }
        record.state = ItemState::Unseen;
        record.touch();
        self.publish_counts();
        true
    }

    /// Stores a score, creating the record when the item is unknown.
    /// Returns `true` when a record had to be created.
    pub fn record_score(&mut self, id: &ItemId, data: ScoreData) -> bool {
        let created = !self.items.contains_key(id);
        let record = self
            .items
            .entry(id.clone())
            .or_insert_with(|| ItemRecord::new(id.clone()));
        record.state = ItemState::Scored;
        record.score = Some(data);
        record.touch();
        self.publish_counts();
        created
    }

    /// Item currently bound to `handle`.
    pub fn item_at(&self, handle: ViewHandle) -> Option<&ItemId> {
        self.items
            .values()
            .find(|record| record.view_handle == Some(handle))
            .map(|record| &record.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemRecord> {
        self.items.values()
    }

    /// Identifiers of scored items that currently have a handle, in a stable
    /// order.
    pub fn scored_with_handles(&self) -> Vec<(ItemId, ViewHandle)> {
        let mut out: Vec<_> = self
            .items
            .values()
            .filter(|record| record.state == ItemState::Scored)
            .filter_map(|record| record.view_handle.map(|handle| (record.id.clone(), handle)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for record in self.items.values() {
            match record.state {
                ItemState::Unseen => counts.unseen += 1,
                ItemState::Queued => counts.queued += 1,
                ItemState::Scored => counts.scored += 1,
            }
        }
        counts
    }

    fn publish_counts(&self) {
        metrics::set_state_counts(&self.counts());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ItemId {
        ItemId::from(raw)
    }

    #[test]
    fn bind_creates_then_reports_unchanged() {
        let mut registry = ItemRegistry::new();
        let handle = ViewHandle::new(1, 0);

        assert_eq!(registry.bind(&id("a"), handle), BindOutcome::Created);
        assert_eq!(registry.bind(&id("a"), handle), BindOutcome::Unchanged);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(&id("a")), Some(ItemState::Unseen));
    }

    #[test]
    fn rebind_replaces_handle_and_keeps_score() {
        let mut registry = ItemRegistry::new();
        registry.bind(&id("a"), ViewHandle::new(1, 0));
        registry.record_score(&id("a"), ScoreData::new(7.0));

        let outcome = registry.bind(&id("a"), ViewHandle::new(4, 2));
        assert_eq!(
            outcome,
            BindOutcome::Rebound {
                previous: ViewHandle::new(1, 0)
            }
        );
        assert_eq!(registry.handle(&id("a")), Some(ViewHandle::new(4, 2)));
        assert_eq!(registry.score(&id("a")).map(|s| s.score), Some(7.0));
    }

    #[test]
    fn queued_cannot_be_queued_again() {
        let mut registry = ItemRegistry::new();
        registry.bind(&id("a"), ViewHandle::new(1, 0));
        registry.mark_queued(&id("a")).unwrap();

        let err = registry.mark_queued(&id("a")).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTransition { from: ItemState::Queued, .. }));

        assert!(registry.revert_to_unseen(&id("a")));
        registry.mark_queued(&id("a")).unwrap();
    }

    #[test]
    fn revert_ignores_scored_items() {
        let mut registry = ItemRegistry::new();
        registry.bind(&id("a"), ViewHandle::new(1, 0));
        registry.mark_queued(&id("a")).unwrap();
        registry.record_score(&id("a"), ScoreData::new(2.0));

        assert!(!registry.revert_to_unseen(&id("a")));
        assert_eq!(registry.state(&id("a")), Some(ItemState::Scored));
    }

    #[test]
    fn score_for_unknown_item_creates_record() {
        let mut registry = ItemRegistry::new();
        assert!(registry.record_score(&id("ghost"), ScoreData::new(5.0)));
        assert!(!registry.record_score(&id("ghost"), ScoreData::new(5.5)));

        let record = registry.get(&id("ghost")).unwrap();
        assert_eq!(record.state, ItemState::Scored);
        assert!(record.view_handle.is_none());
        assert_eq!(
            registry.bind(&id("ghost"), ViewHandle::new(2, 0)),
            BindOutcome::Attached
        );
    }

    #[test]
    fn mark_queued_unknown_item_is_not_found() {
        let mut registry = ItemRegistry::new();
        assert_eq!(
            registry.mark_queued(&id("nope")),
            Err(RegistryError::NotFound(id("nope")))
        );
    }

    #[test]
    fn counts_and_scored_listing() {
        let mut registry = ItemRegistry::new();
        registry.bind(&id("b"), ViewHandle::new(2, 0));
        registry.bind(&id("a"), ViewHandle::new(1, 0));
        registry.bind(&id("c"), ViewHandle::new(3, 0));
        registry.mark_queued(&id("c")).unwrap();
        registry.record_score(&id("b"), ScoreData::new(1.0));
        registry.record_score(&id("a"), ScoreData::new(9.0));
        registry.record_score(&id("z"), ScoreData::new(9.0));

        let counts = registry.counts();
        assert_eq!(counts.scored, 3);
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.total(), 4);

        let scored: Vec<_> = registry
            .scored_with_handles()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(scored, vec![id("a"), id("b")]);
    }

    #[test]
    fn item_at_follows_rebinding() {
        let mut registry = ItemRegistry::new();
        let first = ViewHandle::new(1, 0);
        let second = ViewHandle::new(1, 1);
        registry.bind(&id("a"), first);
        assert_eq!(registry.item_at(first), Some(&id("a")));
        registry.bind(&id("a"), second);
        assert_eq!(registry.item_at(first), None);
        assert_eq!(registry.item_at(second), Some(&id("a")));
    }
}
