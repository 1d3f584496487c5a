//! Matches push results back to whichever card currently shows the item.

use feedwarden_core_types::{ItemId, ScoreData};
use feedwarden_policy_center::WardenConfig;
use feedwarden_registry::ItemRegistry;
use feedwarden_state_center::{AuditEntry, AuditKind};
use tracing::{debug, warn};

use crate::actions::{PolicyEngine, PolicyOutcome};
use crate::discovery::DiscoveryEngine;
use crate::metrics;
use crate::protocol::{parse_push, PushEnvelope};
use crate::render;
use crate::view::HostView;

/// Components a score is applied to.
pub struct ScoreTargets<'a, V: ?Sized> {
    pub view: &'a mut V,
    pub registry: &'a mut ItemRegistry,
    pub discovery: &'a mut DiscoveryEngine,
    pub policy: &'a mut PolicyEngine,
    pub config: &'a WardenConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScoreApplied {
    /// The item had never been discovered.
    pub created: bool,
    pub rendered: bool,
    pub policy: PolicyOutcome,
}

#[derive(Debug, Default)]
pub struct Reconciler {
    applied: u64,
    dropped: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Parses one push message. Malformed and unknown messages are logged
    /// and dropped.
    pub fn decode(&mut self, text: &str) -> Option<(ItemId, ScoreData)> {
        match parse_push(text) {
            Ok(PushEnvelope::VideoScore(message)) => {
                metrics::record_push_message("score");
                Some(message.into_parts())
            }
            Ok(PushEnvelope::Unknown) => {
                metrics::record_push_message("unknown");
                self.dropped += 1;
                debug!(target: "feedwarden::reconciler", "ignoring push message of unknown type");
                None
            }
            Err(err) => {
                metrics::record_push_message("malformed");
                self.dropped += 1;
                warn!(target: "feedwarden::reconciler", %err, "dropping malformed push message");
                None
            }
        }
    }

    /// Stores the score, audits it, and renders plus applies policy when the
    /// item has a live card.
    pub fn apply<V: HostView + ?Sized>(
        &mut self,
        item: ItemId,
        data: ScoreData,
        targets: ScoreTargets<'_, V>,
    ) -> ScoreApplied {
        let ScoreTargets {
            view,
            registry,
            discovery,
            policy,
            config,
        } = targets;
        self.applied += 1;

        let created = registry.record_score(&item, data.clone());
        discovery.mark_processed(&item);
        policy.record(AuditEntry {
            score: Some(data.score),
            categories: Some(data.categories.clone()),
            content_summary: data.content_summary.clone(),
            evaluation_summary: data.evaluation_summary.clone(),
            ..AuditEntry::new(AuditKind::VideoScored, item.clone())
        });

        let mut applied = ScoreApplied {
            created,
            ..ScoreApplied::default()
        };
        let Some(handle) = registry.handle(&item).filter(|handle| view.is_live(*handle)) else {
            debug!(target: "feedwarden::reconciler", %item, score = data.score, created, "score stored without live card");
            return applied;
        };
        applied.rendered = render::render_scored(view, handle, &data, &config.score_thresholds);
        if applied.rendered {
            applied.policy = policy.apply(view, discovery, &item, handle, &data, config);
        }
        debug!(
            target: "feedwarden::reconciler",
            %item,
            score = data.score,
            rendered = applied.rendered,
            "score applied"
        );
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{CardSpec, FeedDocument, HIDDEN_CLASS};
    use feedwarden_core_types::ItemState;
    use feedwarden_policy_center::default_config;
    use feedwarden_state_center::{InMemoryAuditLog, MarkerSets};
    use tokio::sync::mpsc;

    #[test]
    fn decode_counts_dropped_messages() {
        let mut reconciler = Reconciler::new();
        assert!(reconciler.decode("{").is_none());
        assert!(reconciler.decode(r#"{"type":"status","ok":true}"#).is_none());
        let (item, data) = reconciler
            .decode(r#"{"type":"videoScore","videoId":"v1","score":6.0,"categories":{}}"#)
            .unwrap();
        assert_eq!(item.as_str(), "v1");
        assert_eq!(data.score, 6.0);
        assert_eq!(reconciler.dropped(), 2);
    }

    #[tokio::test]
    async fn score_for_unknown_item_is_stored_and_audited() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut doc = FeedDocument::default();
        let mut registry = ItemRegistry::new();
        let mut discovery = DiscoveryEngine::new();
        let mut policy = PolicyEngine::new(MarkerSets::in_memory(), Box::new(InMemoryAuditLog::default()), tx);
        let config = default_config();
        let mut reconciler = Reconciler::new();

        let applied = reconciler.apply(
            ItemId::from("ghost"),
            ScoreData::new(1.0),
            ScoreTargets {
                view: &mut doc,
                registry: &mut registry,
                discovery: &mut discovery,
                policy: &mut policy,
                config: &config,
            },
        );
        assert!(applied.created);
        assert!(!applied.rendered);
        assert_eq!(registry.state(&ItemId::from("ghost")), Some(ItemState::Scored));
        assert!(discovery.is_processed(&ItemId::from("ghost")));
        let entries = policy.audit_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, AuditKind::VideoScored);
        assert_eq!(entries[0].score, Some(1.0));
    }

    #[tokio::test]
    async fn score_for_live_card_renders_and_applies_policy() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut doc = FeedDocument::default();
        let card = doc.push_card(CardSpec::video("v1").without_menu());
        let mut registry = ItemRegistry::new();
        registry.bind(&ItemId::from("v1"), card);
        let mut discovery = DiscoveryEngine::new();
        let mut policy = PolicyEngine::new(MarkerSets::in_memory(), Box::new(InMemoryAuditLog::default()), tx);
        let config = default_config();

        let applied = Reconciler::new().apply(
            ItemId::from("v1"),
            ScoreData::new(2.0),
            ScoreTargets {
                view: &mut doc,
                registry: &mut registry,
                discovery: &mut discovery,
                policy: &mut policy,
                config: &config,
            },
        );
        assert!(applied.rendered && applied.policy.hidden);
        assert_eq!(doc.badge(card).map(|b| b.label), Some("2.0".to_string()));
        assert!(doc.has_class(card, HIDDEN_CLASS));
    }
}
