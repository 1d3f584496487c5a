//! Boundary between the orchestrator and the page that renders the feed.
//!
//! Every operation that takes a [`ViewHandle`] checks liveness first. Stale
//! handles yield `None`, `false` or [`ViewError::Stale`] and are never
//! dereferenced.

mod document;

pub use document::{CardSpec, FeedDocument, SharedDocument};

use feedwarden_core_types::ViewHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Class names applied by the policy engine.
pub const HIDDEN_CLASS: &str = "agno-hidden-video";
pub const WARNING_CLASS: &str = "agno-warning-video";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("view handle {0} is stale")]
    Stale(ViewHandle),
    #[error("{0} is not clickable")]
    NotClickable(ViewHandle),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Score indicator painted onto a card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Badge {
    /// Either the score with one decimal or the processing glyph.
    pub label: String,
    /// `bad`, `warning`, `good` or `processing`.
    pub class: &'static str,
    pub icon: Option<&'static str>,
    pub tooltip: Option<String>,
}

/// Detail overlay opened from the "Summary" affordance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Overlay {
    pub anchor: ViewHandle,
    pub html: String,
    pub position: Point,
}

/// Interactions the host reports back to the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum HostEvent {
    /// The "Summary" affordance attached to this card was activated.
    SummaryActivated { handle: ViewHandle },
    /// Pointer interaction somewhere in the page.
    PointerDown { inside_overlay: bool },
    Scrolled { x: f64, y: f64 },
}

pub trait HostView: Send {
    fn location(&self) -> String;

    /// Live containers matching any of `selectors`, in document order.
    fn containers(&self, selectors: &[&str]) -> Vec<ViewHandle>;

    /// Target of the first link inside the container matching `selector`.
    fn link_href(&self, handle: ViewHandle, selector: &str) -> Option<String>;

    fn is_live(&self, handle: ViewHandle) -> bool;

    fn badge(&self, handle: ViewHandle) -> Option<Badge>;

    /// Returns `true` when a badge was present.
    fn remove_badge(&mut self, handle: ViewHandle) -> bool;

    fn insert_badge(&mut self, handle: ViewHandle, badge: Badge) -> Result<(), ViewError>;

    fn add_class(&mut self, handle: ViewHandle, class: &str) -> Result<(), ViewError>;

    fn has_class(&self, handle: ViewHandle, class: &str) -> bool;

    fn has_summary_affordance(&self, handle: ViewHandle) -> bool;

    /// Returns `Ok(false)` when the card has no channel-name anchor.
    fn attach_summary_affordance(&mut self, handle: ViewHandle) -> Result<bool, ViewError>;

    /// Action-menu button of the card whose accessible label is one of
    /// `labels`.
    fn find_menu_button(&self, handle: ViewHandle, labels: &[&str]) -> Option<ViewHandle>;

    fn click(&mut self, target: ViewHandle) -> Result<(), ViewError>;

    /// Visible menu entry whose text contains any of `texts`.
    fn find_menu_option(&self, texts: &[&str]) -> Option<ViewHandle>;

    fn anchor_rect(&self, handle: ViewHandle) -> Option<Rect>;

    fn scroll_offset(&self) -> Point;

    /// Replaces the current overlay, if any.
    fn show_overlay(&mut self, overlay: Overlay);

    fn move_overlay(&mut self, position: Point) -> bool;

    /// Returns `true` when an overlay was removed.
    fn dismiss_overlay(&mut self) -> bool;
}
