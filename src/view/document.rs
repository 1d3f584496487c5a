use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use feedwarden_core_types::ViewHandle;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use super::{Badge, HostView, Overlay, Point, Rect, ViewError};

const DEFAULT_LOCATION: &str = "https://www.youtube.com/";
const CARD_WIDTH: f64 = 360.0;

/// Description of a feed card to insert into a [`FeedDocument`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSpec {
    /// Label used by scripts and tests to address the card. Discovery never
    /// reads it.
    pub key: Option<String>,
    pub container: String,
    pub link_selector: String,
    pub href: Option<String>,
    pub channel_name: bool,
    pub menu_label: Option<String>,
    pub menu_options: Vec<String>,
    pub height: f64,
}

impl Default for CardSpec {
    fn default() -> Self {
        Self {
            key: None,
            container: "ytd-rich-item-renderer".to_string(),
            link_selector: "a#thumbnail".to_string(),
            href: None,
            channel_name: true,
            menu_label: Some("Action menu".to_string()),
            menu_options: vec![
                "Add to queue".to_string(),
                "Not interested".to_string(),
                "Don't recommend channel".to_string(),
            ],
            height: 240.0,
        }
    }
}

impl CardSpec {
    pub fn video(id: &str) -> Self {
        Self {
            key: Some(id.to_string()),
            href: Some(format!("/watch?v={id}&pp=feed")),
            ..Self::default()
        }
    }

    pub fn in_container(mut self, container: &str) -> Self {
        self.container = container.to_string();
        self
    }

    pub fn without_menu(mut self) -> Self {
        self.menu_label = None;
        self
    }

    pub fn without_channel_name(mut self) -> Self {
        self.channel_name = false;
        self
    }
}

/// Structural change observed in the document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mutation {
    pub added: usize,
    pub removed: usize,
}

type MutationSink = Arc<dyn Fn(Mutation) + Send + Sync>;

#[derive(Debug)]
struct Card {
    spec: CardSpec,
    badge: Option<Badge>,
    classes: BTreeSet<String>,
    summary_affordance: bool,
    menu_button: Option<ViewHandle>,
    selected_options: Vec<String>,
}

#[derive(Debug)]
enum Node {
    Card(Box<Card>),
    MenuButton { label: String },
    MenuOption { card: ViewHandle, text: String },
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena-backed model of a virtualized feed page.
///
/// Removing a card frees its slot and bumps the slot generation, so handles
/// held elsewhere go stale instead of silently pointing at a recycled card.
pub struct FeedDocument {
    location: String,
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<ViewHandle>,
    open_menu: Vec<ViewHandle>,
    overlay: Option<Overlay>,
    scroll: Point,
    observer: Option<MutationSink>,
}

impl Default for FeedDocument {
    fn default() -> Self {
        Self::new(DEFAULT_LOCATION)
    }
}

impl fmt::Debug for FeedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedDocument")
            .field("location", &self.location)
            .field("cards", &self.order.len())
            .field("menu_open", &!self.open_menu.is_empty())
            .field("overlay", &self.overlay.is_some())
            .finish()
    }
}

impl FeedDocument {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
            open_menu: Vec::new(),
            overlay: None,
            scroll: Point::default(),
            observer: None,
        }
    }

    /// Registers the callback invoked for every structural change.
    pub fn observe(&mut self, sink: impl Fn(Mutation) + Send + Sync + 'static) {
        self.observer = Some(Arc::new(sink));
    }

    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = location.into();
    }

    pub fn set_scroll(&mut self, scroll: Point) {
        self.scroll = scroll;
    }

    pub fn push_card(&mut self, spec: CardSpec) -> ViewHandle {
        self.insert_card_at(self.order.len(), spec)
    }

    pub fn insert_card_at(&mut self, index: usize, spec: CardSpec) -> ViewHandle {
        let menu_button = spec.menu_label.clone().map(|label| self.allocate(Node::MenuButton { label }));
        let handle = self.allocate(Node::Card(Box::new(Card {
            spec,
            badge: None,
            classes: BTreeSet::new(),
            summary_affordance: false,
            menu_button,
            selected_options: Vec::new(),
        })));
        let index = index.min(self.order.len());
        self.order.insert(index, handle);
        self.notify(Mutation {
            added: 1,
            removed: 0,
        });
        handle
    }

    pub fn remove_card(&mut self, handle: ViewHandle) -> bool {
        let Some(position) = self.order.iter().position(|h| *h == handle) else {
            return false;
        };
        self.order.remove(position);
        if self.open_menu_card() == Some(handle) {
            self.close_menu();
        }
        if let Some(Node::Card(card)) = self.release(handle) {
            if let Some(button) = card.menu_button {
                self.release(button);
            }
        }
        if self.overlay.as_ref().map(|o| o.anchor) == Some(handle) {
            self.overlay = None;
        }
        self.notify(Mutation {
            added: 0,
            removed: 1,
        });
        true
    }

    /// Replaces the card in place, the way a virtualized list reuses an
    /// element for different content. The old handle goes stale.
    pub fn recycle_card(&mut self, handle: ViewHandle, spec: CardSpec) -> Option<ViewHandle> {
        let position = self.order.iter().position(|h| *h == handle)?;
        self.remove_card(handle);
        Some(self.insert_card_at(position, spec))
    }

    pub fn clear(&mut self) {
        for handle in self.order.clone() {
            self.remove_card(handle);
        }
    }

    pub fn cards(&self) -> Vec<ViewHandle> {
        self.order.clone()
    }

    /// Live card carrying the given script key.
    pub fn find_card(&self, key: &str) -> Option<ViewHandle> {
        self.order
            .iter()
            .copied()
            .find(|handle| {
                self.card(*handle)
                    .and_then(|card| card.spec.key.as_deref())
                    .map_or(false, |k| k == key)
            })
    }

    pub fn find_key(&self, handle: ViewHandle) -> Option<String> {
        self.card(handle).and_then(|card| card.spec.key.clone())
    }

    pub fn classes(&self, handle: ViewHandle) -> Vec<String> {
        self.card(handle)
            .map(|card| card.classes.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Menu entries clicked on behalf of this card.
    pub fn selected_options(&self, handle: ViewHandle) -> Vec<String> {
        self.card(handle)
            .map(|card| card.selected_options.clone())
            .unwrap_or_default()
    }

    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }

    pub fn menu_is_open(&self) -> bool {
        !self.open_menu.is_empty()
    }

    fn allocate(&mut self, node: Node) -> ViewHandle {
        if let Some(slot_idx) = self.free.pop() {
            let slot = &mut self.slots[slot_idx as usize];
            slot.node = Some(node);
            return ViewHandle::new(slot_idx, slot.generation);
        }
        let slot_idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        ViewHandle::new(slot_idx, 0)
    }

    fn release(&mut self, handle: ViewHandle) -> Option<Node> {
        if !self.is_live(handle) {
            return None;
        }
        let slot = &mut self.slots[handle.slot as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.slot);
        slot.node.take()
    }

    fn node(&self, handle: ViewHandle) -> Option<&Node> {
        let slot = self.slots.get(handle.slot as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn card(&self, handle: ViewHandle) -> Option<&Card> {
        match self.node(handle)? {
            Node::Card(card) => Some(card.as_ref()),
            _ => None,
        }
    }

    fn card_mut(&mut self, handle: ViewHandle) -> Result<&mut Card, ViewError> {
        let slot = self
            .slots
            .get_mut(handle.slot as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(ViewError::Stale(handle))?;
        match slot.node.as_mut() {
            Some(Node::Card(card)) => Ok(card.as_mut()),
            _ => Err(ViewError::Stale(handle)),
        }
    }

    fn open_menu_card(&self) -> Option<ViewHandle> {
        self.open_menu.first().and_then(|option| match self.node(*option) {
            Some(Node::MenuOption { card, .. }) => Some(*card),
            _ => None,
        })
    }

    fn close_menu(&mut self) {
        let options = std::mem::take(&mut self.open_menu);
        let removed = options.len();
        for option in options {
            self.release(option);
        }
        if removed > 0 {
            self.notify(Mutation { added: 0, removed });
        }
    }

    fn card_owning_button(&self, button: ViewHandle) -> Option<ViewHandle> {
        self.order
            .iter()
            .copied()
            .find(|handle| self.card(*handle).and_then(|c| c.menu_button) == Some(button))
    }

    fn card_top(&self, handle: ViewHandle) -> Option<f64> {
        let mut top = 0.0;
        for current in &self.order {
            let card = self.card(*current)?;
            if *current == handle {
                return Some(top);
            }
            top += card.spec.height;
        }
        None
    }

    fn notify(&self, mutation: Mutation) {
        if let Some(observer) = &self.observer {
            observer(mutation);
        }
    }
}

impl HostView for FeedDocument {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn containers(&self, selectors: &[&str]) -> Vec<ViewHandle> {
        self.order
            .iter()
            .copied()
            .filter(|handle| {
                self.card(*handle)
                    .map_or(false, |card| selectors.contains(&card.spec.container.as_str()))
            })
            .collect()
    }

    fn link_href(&self, handle: ViewHandle, selector: &str) -> Option<String> {
        let card = self.card(handle)?;
        if card.spec.link_selector == selector {
            card.spec.href.clone()
        } else {
            None
        }
    }

    fn is_live(&self, handle: ViewHandle) -> bool {
        self.node(handle).is_some()
    }

    fn badge(&self, handle: ViewHandle) -> Option<Badge> {
        self.card(handle).and_then(|card| card.badge.clone())
    }

    fn remove_badge(&mut self, handle: ViewHandle) -> bool {
        match self.card_mut(handle) {
            Ok(card) => card.badge.take().is_some(),
            Err(_) => false,
        }
    }

    fn insert_badge(&mut self, handle: ViewHandle, badge: Badge) -> Result<(), ViewError> {
        self.card_mut(handle)?.badge = Some(badge);
        Ok(())
    }

    fn add_class(&mut self, handle: ViewHandle, class: &str) -> Result<(), ViewError> {
        self.card_mut(handle)?.classes.insert(class.to_string());
        Ok(())
    }

    fn has_class(&self, handle: ViewHandle, class: &str) -> bool {
        self.card(handle)
            .map_or(false, |card| card.classes.contains(class))
    }

    fn has_summary_affordance(&self, handle: ViewHandle) -> bool {
        self.card(handle)
            .map_or(false, |card| card.summary_affordance)
    }

    fn attach_summary_affordance(&mut self, handle: ViewHandle) -> Result<bool, ViewError> {
        let card = self.card_mut(handle)?;
        if !card.spec.channel_name {
            return Ok(false);
        }
        card.summary_affordance = true;
        Ok(true)
    }

    fn find_menu_button(&self, handle: ViewHandle, labels: &[&str]) -> Option<ViewHandle> {
        let button = self.card(handle)?.menu_button?;
        match self.node(button)? {
            Node::MenuButton { label } if labels.contains(&label.as_str()) => Some(button),
            _ => None,
        }
    }

    fn click(&mut self, target: ViewHandle) -> Result<(), ViewError> {
        match self.node(target) {
            None => Err(ViewError::Stale(target)),
            Some(Node::MenuButton { .. }) => {
                let card = self
                    .card_owning_button(target)
                    .ok_or(ViewError::NotClickable(target))?;
                self.close_menu();
                let texts = self
                    .card(card)
                    .map(|c| c.spec.menu_options.clone())
                    .unwrap_or_default();
                for text in texts {
                    let option = self.allocate(Node::MenuOption { card, text });
                    self.open_menu.push(option);
                }
                self.notify(Mutation {
                    added: self.open_menu.len(),
                    removed: 0,
                });
                Ok(())
            }
            Some(Node::MenuOption { card, text }) => {
                let (card, text) = (*card, text.clone());
                if let Ok(owner) = self.card_mut(card) {
                    owner.selected_options.push(text);
                }
                self.close_menu();
                Ok(())
            }
            Some(Node::Card(_)) => Err(ViewError::NotClickable(target)),
        }
    }

    fn find_menu_option(&self, texts: &[&str]) -> Option<ViewHandle> {
        self.open_menu.iter().copied().find(|option| match self.node(*option) {
            Some(Node::MenuOption { text, .. }) => texts.iter().any(|t| text.contains(t)),
            _ => false,
        })
    }

    fn anchor_rect(&self, handle: ViewHandle) -> Option<Rect> {
        let card = self.card(handle)?;
        if !card.summary_affordance {
            return None;
        }
        let top = self.card_top(handle)?;
        Some(Rect {
            left: 12.0 - self.scroll.x,
            top: top + card.spec.height - 44.0 - self.scroll.y,
            width: CARD_WIDTH / 4.0,
            height: 20.0,
        })
    }

    fn scroll_offset(&self) -> Point {
        self.scroll
    }

    fn show_overlay(&mut self, overlay: Overlay) {
        self.overlay = Some(overlay);
    }

    fn move_overlay(&mut self, position: Point) -> bool {
        match self.overlay.as_mut() {
            Some(overlay) => {
                overlay.position = position;
                true
            }
            None => false,
        }
    }

    fn dismiss_overlay(&mut self) -> bool {
        self.overlay.take().is_some()
    }
}

/// [`FeedDocument`] shared between the orchestrator and whoever drives the
/// page (the feed harness or a test).
#[derive(Clone, Debug, Default)]
pub struct SharedDocument {
    inner: Arc<Mutex<FeedDocument>>,
}

impl SharedDocument {
    pub fn new(document: FeedDocument) -> Self {
        Self {
            inner: Arc::new(Mutex::new(document)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, FeedDocument> {
        self.inner.lock()
    }
}

impl HostView for SharedDocument {
    fn location(&self) -> String {
        self.lock().location()
    }

    fn containers(&self, selectors: &[&str]) -> Vec<ViewHandle> {
        self.lock().containers(selectors)
    }

    fn link_href(&self, handle: ViewHandle, selector: &str) -> Option<String> {
        self.lock().link_href(handle, selector)
    }

    fn is_live(&self, handle: ViewHandle) -> bool {
        self.lock().is_live(handle)
    }

    fn badge(&self, handle: ViewHandle) -> Option<Badge> {
        self.lock().badge(handle)
    }

    fn remove_badge(&mut self, handle: ViewHandle) -> bool {
        self.lock().remove_badge(handle)
    }

    fn insert_badge(&mut self, handle: ViewHandle, badge: Badge) -> Result<(), ViewError> {
        self.lock().insert_badge(handle, badge)
    }

    fn add_class(&mut self, handle: ViewHandle, class: &str) -> Result<(), ViewError> {
        self.lock().add_class(handle, class)
    }

    fn has_class(&self, handle: ViewHandle, class: &str) -> bool {
        self.lock().has_class(handle, class)
    }

    fn has_summary_affordance(&self, handle: ViewHandle) -> bool {
        self.lock().has_summary_affordance(handle)
    }

    fn attach_summary_affordance(&mut self, handle: ViewHandle) -> Result<bool, ViewError> {
        self.lock().attach_summary_affordance(handle)
    }

    fn find_menu_button(&self, handle: ViewHandle, labels: &[&str]) -> Option<ViewHandle> {
        self.lock().find_menu_button(handle, labels)
    }

    fn click(&mut self, target: ViewHandle) -> Result<(), ViewError> {
        self.lock().click(target)
    }

    fn find_menu_option(&self, texts: &[&str]) -> Option<ViewHandle> {
        self.lock().find_menu_option(texts)
    }

    fn anchor_rect(&self, handle: ViewHandle) -> Option<Rect> {
        self.lock().anchor_rect(handle)
    }

    fn scroll_offset(&self) -> Point {
        self.lock().scroll_offset()
    }

    fn show_overlay(&mut self, overlay: Overlay) {
        self.lock().show_overlay(overlay)
    }

    fn move_overlay(&mut self, position: Point) -> bool {
        self.lock().move_overlay(position)
    }

    fn dismiss_overlay(&mut self) -> bool {
        self.lock().dismiss_overlay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn removed_card_handle_goes_stale() {
        let mut doc = FeedDocument::default();
        let first = doc.push_card(CardSpec::video("a"));
        assert!(doc.is_live(first));
        assert!(doc.remove_card(first));
        assert!(!doc.is_live(first));
        assert!(doc.insert_badge(first, test_badge()).is_err());

        let second = doc.push_card(CardSpec::video("b"));
        assert_eq!(second.slot, first.slot);
        assert_ne!(second.generation, first.generation);
    }

    #[test]
    fn recycle_keeps_position_and_invalidates_old_handle() {
        let mut doc = FeedDocument::default();
        let a = doc.push_card(CardSpec::video("a"));
        let b = doc.push_card(CardSpec::video("b"));
        let c = doc.recycle_card(a, CardSpec::video("c")).unwrap();
        assert!(!doc.is_live(a));
        assert_eq!(doc.cards(), vec![c, b]);
        assert_eq!(doc.find_card("c"), Some(c));
        assert_eq!(doc.find_card("a"), None);
    }

    #[test]
    fn containers_filter_by_selector_and_links_by_selector() {
        let mut doc = FeedDocument::default();
        let grid = doc.push_card(CardSpec::video("g").in_container("ytd-grid-video-renderer"));
        let other = doc.push_card(CardSpec::video("x").in_container("ytd-playlist-renderer"));
        assert_eq!(doc.containers(&["ytd-grid-video-renderer"]), vec![grid]);
        assert!(doc.link_href(grid, "a#thumbnail").is_some());
        assert!(doc.link_href(grid, "a.ytd-thumbnail").is_none());
        assert!(doc.is_live(other));
    }

    #[test]
    fn menu_click_opens_options_and_selection_closes_menu() {
        let mut doc = FeedDocument::default();
        let card = doc.push_card(CardSpec::video("a"));
        let button = doc.find_menu_button(card, &["Action menu"]).unwrap();
        assert!(doc.find_menu_button(card, &["Menu"]).is_none());
        assert!(doc.find_menu_option(&["Not interested"]).is_none());

        doc.click(button).unwrap();
        assert!(doc.menu_is_open());
        let option = doc.find_menu_option(&["Not interested", "No me interesa"]).unwrap();
        doc.click(option).unwrap();
        assert!(!doc.menu_is_open());
        assert!(!doc.is_live(option));
        assert_eq!(doc.selected_options(card), vec!["Not interested".to_string()]);
    }

    #[test]
    fn observer_sees_structural_changes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut doc = FeedDocument::default();
        let seen = Arc::clone(&counter);
        doc.observe(move |m| {
            seen.fetch_add(m.added + m.removed, Ordering::SeqCst);
        });
        let card = doc.push_card(CardSpec::video("a"));
        doc.insert_badge(card, test_badge()).unwrap();
        doc.remove_card(card);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn summary_affordance_needs_channel_name() {
        let mut doc = FeedDocument::default();
        let plain = doc.push_card(CardSpec::video("a").without_channel_name());
        assert!(!doc.attach_summary_affordance(plain).unwrap());
        assert!(doc.anchor_rect(plain).is_none());

        let card = doc.push_card(CardSpec::video("b"));
        assert!(doc.attach_summary_affordance(card).unwrap());
        let rect = doc.anchor_rect(card).unwrap();
        doc.set_scroll(Point { x: 0.0, y: 100.0 });
        let scrolled = doc.anchor_rect(card).unwrap();
        assert_eq!(scrolled.top, rect.top - 100.0);
    }

    fn test_badge() -> Badge {
        Badge {
            label: "1.0".into(),
            class: "bad",
            icon: Some("✘"),
            tooltip: None,
        }
    }
}
