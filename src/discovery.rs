//! Finds feed items in the host view and decides which ones need attention.

use std::collections::{HashMap, HashSet};

use feedwarden_core_types::{ItemId, ItemState, ViewHandle};
use feedwarden_registry::ItemRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::metrics;
use crate::view::HostView;

pub const CONTAINER_SELECTORS: [&str; 4] = [
    "ytd-rich-item-renderer",
    "ytd-grid-video-renderer",
    "ytd-video-renderer",
    "ytd-compact-video-renderer",
];

/// Tried in order; the first link whose target carries an identifier wins.
pub const LINK_SELECTORS: [&str; 2] = ["a#thumbnail", "a.ytd-thumbnail"];

static ITEM_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]v=([^&]+)").expect("item id pattern is valid"));

/// Extracts the `v` query parameter from a link target.
pub fn item_id_from_href(href: &str) -> Option<ItemId> {
    ITEM_ID_PATTERN
        .captures(href)
        .and_then(|caps| caps.get(1))
        .map(|m| ItemId::new(m.as_str()))
}

pub fn extract_item_id<V: HostView + ?Sized>(view: &V, handle: ViewHandle) -> Option<ItemId> {
    LINK_SELECTORS.iter().find_map(|selector| {
        view.link_href(handle, selector)
            .as_deref()
            .and_then(item_id_from_href)
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Discovered {
    pub id: ItemId,
    pub handle: ViewHandle,
}

/// Scan-side state: the processed memory, mutation observation and the last
/// seen location.
#[derive(Debug, Default)]
pub struct DiscoveryEngine {
    processed: HashSet<ItemId>,
    suspended: bool,
    location: Option<String>,
}

impl DiscoveryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Items that need work in this pass. Does not modify the registry, so
    /// calling it twice without a view change yields the same result.
    pub fn scan<V: HostView + ?Sized>(
        &self,
        view: &V,
        registry: &ItemRegistry,
        channel_open: bool,
    ) -> Vec<Discovered> {
        let containers = view.containers(&CONTAINER_SELECTORS);
        let mut found: Vec<Discovered> = Vec::with_capacity(containers.len());
        let mut index: HashMap<ItemId, usize> = HashMap::new();
        for handle in containers {
            let Some(id) = extract_item_id(view, handle) else {
                trace!(target: "feedwarden::discovery", %handle, "container without item id skipped");
                continue;
            };
            // Later containers for the same id win.
            match index.get(&id) {
                Some(pos) => found[*pos].handle = handle,
                None => {
                    index.insert(id.clone(), found.len());
                    found.push(Discovered { id, handle });
                }
            }
        }

        let total = found.len();
        found.retain(|item| !self.is_settled(item, registry, channel_open));
        metrics::record_scan(found.len());
        debug!(
            target: "feedwarden::discovery",
            containers = total,
            pending = found.len(),
            channel_open,
            "scan finished"
        );
        found
    }

    fn is_settled(&self, item: &Discovered, registry: &ItemRegistry, channel_open: bool) -> bool {
        if registry.handle(&item.id) != Some(item.handle) {
            return false;
        }
        match registry.state(&item.id) {
            Some(ItemState::Queued) => true,
            Some(ItemState::Unseen) if !channel_open => true,
            _ => self.processed.contains(&item.id),
        }
    }

    pub fn mark_processed(&mut self, id: &ItemId) {
        self.processed.insert(id.clone());
    }

    pub fn is_processed(&self, id: &ItemId) -> bool {
        self.processed.contains(id)
    }

    pub fn clear_processed(&mut self) {
        self.processed.clear();
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether a mutation notification should restart the debounce window.
    pub fn accepts_mutation(&self, added: usize, removed: usize) -> bool {
        !self.suspended && (added > 0 || removed > 0)
    }

    /// Records the current location. Returns `true` when it differs from the
    /// previously observed one; the first observation is never a change.
    pub fn observe_location(&mut self, current: &str) -> bool {
        match self.location.as_deref() {
            Some(previous) if previous == current => false,
            Some(_) => {
                self.location = Some(current.to_string());
                true
            }
            None => {
                self.location = Some(current.to_string());
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{CardSpec, FeedDocument};
    use feedwarden_core_types::ScoreData;

    #[test]
    fn id_extraction_uses_v_parameter() {
        assert_eq!(
            item_id_from_href("/watch?v=abc123&t=4s"),
            Some(ItemId::from("abc123"))
        );
        assert_eq!(
            item_id_from_href("https://www.youtube.com/watch?list=PL1&v=xyz"),
            Some(ItemId::from("xyz"))
        );
        assert_eq!(item_id_from_href("/shorts/abc123"), None);
        assert_eq!(item_id_from_href("/watch?vv=abc"), None);
    }

    #[test]
    fn fallback_link_selector_is_used() {
        let mut doc = FeedDocument::default();
        let mut spec = CardSpec::video("fallback");
        spec.link_selector = "a.ytd-thumbnail".into();
        let handle = doc.push_card(spec);
        assert_eq!(extract_item_id(&doc, handle), Some(ItemId::from("fallback")));
    }

    #[test]
    fn unextractable_and_foreign_containers_are_skipped() {
        let mut doc = FeedDocument::default();
        doc.push_card(CardSpec {
            href: None,
            ..CardSpec::default()
        });
        doc.push_card(CardSpec::video("playlist").in_container("ytd-playlist-renderer"));
        let kept = doc.push_card(CardSpec::video("ok").in_container("ytd-compact-video-renderer"));
        let engine = DiscoveryEngine::new();
        let found = engine.scan(&doc, &ItemRegistry::new(), true);
        assert_eq!(
            found,
            vec![Discovered {
                id: ItemId::from("ok"),
                handle: kept
            }]
        );
    }

    #[test]
    fn duplicate_ids_bind_to_last_container() {
        let mut doc = FeedDocument::default();
        doc.push_card(CardSpec::video("dup"));
        doc.push_card(CardSpec::video("other"));
        let last = doc.push_card(CardSpec::video("dup"));
        let found = DiscoveryEngine::new().scan(&doc, &ItemRegistry::new(), true);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, ItemId::from("dup"));
        assert_eq!(found[0].handle, last);
    }

    #[test]
    fn settled_items_are_not_reported_again() {
        let mut doc = FeedDocument::default();
        let queued = doc.push_card(CardSpec::video("queued"));
        let scored = doc.push_card(CardSpec::video("scored"));
        let unseen = doc.push_card(CardSpec::video("unseen"));

        let mut registry = ItemRegistry::new();
        let mut engine = DiscoveryEngine::new();
        registry.bind(&ItemId::from("queued"), queued);
        registry.mark_queued(&ItemId::from("queued")).unwrap();
        registry.bind(&ItemId::from("scored"), scored);
        registry.record_score(&ItemId::from("scored"), ScoreData::new(7.0));
        engine.mark_processed(&ItemId::from("scored"));
        registry.bind(&ItemId::from("unseen"), unseen);

        let open: Vec<_> = engine
            .scan(&doc, &registry, true)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(open, vec![ItemId::from("unseen")]);
        assert!(engine.scan(&doc, &registry, false).is_empty());

        engine.clear_processed();
        let after_navigation: Vec<_> = engine
            .scan(&doc, &registry, false)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(after_navigation, vec![ItemId::from("scored")]);
        let after_navigation_open: Vec<_> = engine
            .scan(&doc, &registry, true)
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(
            after_navigation_open,
            vec![ItemId::from("scored"), ItemId::from("unseen")]
        );
    }

    #[test]
    fn reappearing_item_with_new_handle_is_reported() {
        let mut doc = FeedDocument::default();
        let first = doc.push_card(CardSpec::video("a"));
        let mut registry = ItemRegistry::new();
        let mut engine = DiscoveryEngine::new();
        registry.bind(&ItemId::from("a"), first);
        registry.mark_queued(&ItemId::from("a")).unwrap();
        engine.mark_processed(&ItemId::from("a"));

        let second = doc.recycle_card(first, CardSpec::video("a")).unwrap();
        let found = engine.scan(&doc, &registry, false);
        assert_eq!(found, vec![Discovered { id: ItemId::from("a"), handle: second }]);
    }

    #[test]
    fn suspension_and_empty_mutations_are_ignored() {
        let mut engine = DiscoveryEngine::new();
        assert!(engine.accepts_mutation(1, 0));
        assert!(!engine.accepts_mutation(0, 0));
        engine.suspend();
        assert!(!engine.accepts_mutation(3, 1));
        engine.resume();
        assert!(engine.accepts_mutation(0, 2));
    }

    #[test]
    fn location_changes_are_detected_after_first_observation() {
        let mut engine = DiscoveryEngine::new();
        assert!(!engine.observe_location("https://www.youtube.com/"));
        assert!(!engine.observe_location("https://www.youtube.com/"));
        assert!(engine.observe_location("https://www.youtube.com/feed/subscriptions"));
    }
}
