//! Badges and the summary overlay. Painting is idempotent: the previous
//! badge is always removed before a new one goes in.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use feedwarden_core_types::{ItemId, ScoreData, ViewHandle};
use feedwarden_policy_center::{ScoreThresholds, Tier};
use tracing::{debug, trace};

use crate::view::{Badge, HostView, Overlay, Point, Rect};

pub const PROCESSING_LABEL: &str = "⏳ TW";
pub const PROCESSING_CLASS: &str = "processing";
pub const SUMMARY_PLACEHOLDER: &str = "Summary not available";
pub const EVALUATION_PLACEHOLDER: &str = "Evaluation summary not available";
pub const OVERLAY_GAP: f64 = 5.0;

/// `intellectualHealth` becomes `Intellectual Health`.
pub fn humanize_category(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (idx, ch) in name.chars().enumerate() {
        if idx == 0 {
            out.extend(ch.to_uppercase());
        } else if ch.is_uppercase() {
            out.push(' ');
            out.push(ch);
        } else {
            out.push(ch);
        }
    }
    out
}

pub fn tooltip(score: f64, categories: &BTreeMap<String, f64>) -> String {
    let mut text = format!("Score: {score:.1}");
    for (name, value) in categories {
        let _ = write!(text, "\n{}: {value:.1}", humanize_category(name));
    }
    text
}

pub fn score_badge(data: &ScoreData, thresholds: &ScoreThresholds) -> Badge {
    let tier = Tier::classify(data.score, thresholds);
    Badge {
        label: format!("{:.1}", data.score),
        class: tier.css_class(),
        icon: Some(tier.icon()),
        tooltip: Some(tooltip(data.score, &data.categories)),
    }
}

pub fn processing_badge() -> Badge {
    Badge {
        label: PROCESSING_LABEL.to_string(),
        class: PROCESSING_CLASS,
        icon: None,
        tooltip: Some("Processing".to_string()),
    }
}

/// Replaces whatever badge the card carries. Returns `false` for stale
/// handles.
pub fn paint_badge<V: HostView + ?Sized>(view: &mut V, handle: ViewHandle, badge: Badge) -> bool {
    if !view.is_live(handle) {
        trace!(target: "feedwarden::render", %handle, "skipping stale handle");
        return false;
    }
    view.remove_badge(handle);
    view.insert_badge(handle, badge).is_ok()
}

/// Paints the score badge and, when a summary exists, attaches the summary
/// affordance once.
pub fn render_scored<V: HostView + ?Sized>(
    view: &mut V,
    handle: ViewHandle,
    data: &ScoreData,
    thresholds: &ScoreThresholds,
) -> bool {
    if !paint_badge(view, handle, score_badge(data, thresholds)) {
        return false;
    }
    if data.has_summary() && !view.has_summary_affordance(handle) {
        match view.attach_summary_affordance(handle) {
            Ok(true) => {}
            Ok(false) => {
                trace!(target: "feedwarden::render", %handle, "no channel-name anchor for summary")
            }
            Err(err) => debug!(target: "feedwarden::render", %handle, %err, "summary affordance failed"),
        }
    }
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndicatorColor {
    Red,
    Orange,
    Green,
}

impl IndicatorColor {
    pub fn for_value(value: f64) -> Self {
        if value < 5.0 {
            IndicatorColor::Red
        } else if value < 8.0 {
            IndicatorColor::Orange
        } else {
            IndicatorColor::Green
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            IndicatorColor::Red => "red",
            IndicatorColor::Orange => "orange",
            IndicatorColor::Green => "green",
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn overlay_html(data: &ScoreData) -> String {
    let summary = data.content_summary.as_deref().unwrap_or(SUMMARY_PLACEHOLDER);
    let evaluation = data
        .evaluation_summary
        .as_deref()
        .unwrap_or(EVALUATION_PLACEHOLDER);
    let mut html = String::from("<div class=\"agno-summary-popup\">");
    let _ = write!(
        html,
        "<div class=\"agno-summary-title\">- Summary</div><div class=\"agno-summary-text\">{}</div>",
        escape_html(summary)
    );
    let _ = write!(
        html,
        "<div class=\"agno-summary-title\">- Evaluation Summary</div><div class=\"agno-summary-text\">{}</div>",
        escape_html(evaluation)
    );
    html.push_str("<div class=\"agno-summary-title\">- Categories</div><ul class=\"agno-category-list\">");
    for (name, value) in &data.categories {
        let _ = write!(
            html,
            "<li><span class=\"agno-category-indicator {}\"></span><span class=\"agno-category-label\">{}</span></li>",
            IndicatorColor::for_value(*value).css_class(),
            escape_html(&humanize_category(name))
        );
    }
    html.push_str("</ul></div>");
    html
}

pub fn position_below(anchor: Rect) -> Point {
    Point {
        x: anchor.left,
        y: anchor.bottom() + OVERLAY_GAP,
    }
}

/// Keeps track of the single summary overlay.
#[derive(Debug, Default)]
pub struct OverlayTracker {
    open: Option<(ItemId, ViewHandle)>,
}

impl OverlayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_for(&self) -> Option<&ItemId> {
        self.open.as_ref().map(|(item, _)| item)
    }

    /// Shows the overlay for `item`, replacing any open one.
    pub fn open<V: HostView + ?Sized>(
        &mut self,
        view: &mut V,
        item: &ItemId,
        handle: ViewHandle,
        data: &ScoreData,
    ) -> bool {
        let Some(anchor) = view.anchor_rect(handle) else {
            return false;
        };
        view.show_overlay(Overlay {
            anchor: handle,
            html: overlay_html(data),
            position: position_below(anchor),
        });
        self.open = Some((item.clone(), handle));
        debug!(target: "feedwarden::render", %item, "summary overlay opened");
        true
    }

    /// Follows the anchor; dismisses the overlay once the anchor is gone.
    pub fn on_scroll<V: HostView + ?Sized>(&mut self, view: &mut V) {
        let Some(handle) = self.open.as_ref().map(|(_, handle)| *handle) else {
            return;
        };
        match view.anchor_rect(handle) {
            Some(anchor) => {
                view.move_overlay(position_below(anchor));
            }
            None => self.dismiss(view),
        }
    }

    pub fn on_pointer_down<V: HostView + ?Sized>(&mut self, view: &mut V, inside_overlay: bool) {
        if !inside_overlay {
            self.dismiss(view);
        }
    }

    pub fn dismiss<V: HostView + ?Sized>(&mut self, view: &mut V) {
        if self.open.take().is_some() {
            view.dismiss_overlay();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::{CardSpec, FeedDocument};

    fn thresholds() -> ScoreThresholds {
        ScoreThresholds {
            hide: 3.0,
            warning: 5.0,
        }
    }

    #[test]
    fn category_names_are_humanized() {
        assert_eq!(humanize_category("intellectualHealth"), "Intellectual Health");
        assert_eq!(humanize_category("clarity"), "Clarity");
        assert_eq!(humanize_category(""), "");
    }

    #[test]
    fn tooltip_lists_categories_with_one_decimal() {
        let data = ScoreData::new(2.46)
            .with_category("hatred", 1.0)
            .with_category("intellectualHealth", 7.3);
        assert_eq!(
            tooltip(data.score, &data.categories),
            "Score: 2.5\nHatred: 1.0\nIntellectual Health: 7.3"
        );
    }

    #[test]
    fn badge_tiers_follow_thresholds() {
        let bad = score_badge(&ScoreData::new(3.0), &thresholds());
        assert_eq!((bad.label.as_str(), bad.class, bad.icon), ("3.0", "bad", Some("✘")));
        let warning = score_badge(&ScoreData::new(5.0), &thresholds());
        assert_eq!((warning.class, warning.icon), ("warning", Some("⚠️")));
        let good = score_badge(&ScoreData::new(5.1), &thresholds());
        assert_eq!((good.class, good.icon), ("good", Some("✓")));
        assert_eq!(processing_badge().label, PROCESSING_LABEL);
    }

    #[test]
    fn repainting_leaves_one_badge() {
        let mut doc = FeedDocument::default();
        let card = doc.push_card(CardSpec::video("a"));
        assert!(paint_badge(&mut doc, card, processing_badge()));
        let data = ScoreData::new(6.0);
        assert!(render_scored(&mut doc, card, &data, &thresholds()));
        assert!(render_scored(&mut doc, card, &data, &thresholds()));
        assert_eq!(doc.badge(card), Some(score_badge(&data, &thresholds())));
        assert!(!doc.has_summary_affordance(card));
    }

    #[test]
    fn stale_handles_are_not_painted() {
        let mut doc = FeedDocument::default();
        let card = doc.push_card(CardSpec::video("a"));
        doc.remove_card(card);
        assert!(!render_scored(&mut doc, card, &ScoreData::new(1.0), &thresholds()));
    }

    #[test]
    fn overlay_escapes_text_and_uses_placeholders() {
        let mut data = ScoreData::new(4.0)
            .with_category("hatred", 4.9)
            .with_category("clarity", 5.0)
            .with_category("integrity", 8.0);
        data.content_summary = Some("<script>alert(1)</script>".into());
        let html = overlay_html(&data);
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains(EVALUATION_PLACEHOLDER));
        assert!(html.contains("agno-category-indicator red\"></span><span class=\"agno-category-label\">Hatred"));
        assert!(html.contains("agno-category-indicator orange\"></span><span class=\"agno-category-label\">Clarity"));
        assert!(html.contains("agno-category-indicator green\"></span><span class=\"agno-category-label\">Integrity"));
    }

    #[test]
    fn overlay_tracks_scroll_and_closes_outside() {
        let mut doc = FeedDocument::default();
        let card = doc.push_card(CardSpec::video("a"));
        let mut data = ScoreData::new(2.0);
        data.evaluation_summary = Some("thin".into());
        render_scored(&mut doc, card, &data, &thresholds());

        let mut tracker = OverlayTracker::new();
        let item = ItemId::from("a");
        assert!(tracker.open(&mut doc, &item, card, &data));
        let anchor = doc.anchor_rect(card).unwrap();
        assert_eq!(doc.overlay().unwrap().position, position_below(anchor));
        assert_eq!(
            doc.overlay().unwrap().position.y,
            anchor.top + anchor.height + OVERLAY_GAP
        );

        doc.set_scroll(Point { x: 0.0, y: 50.0 });
        tracker.on_scroll(&mut doc);
        assert_eq!(
            doc.overlay().unwrap().position,
            position_below(doc.anchor_rect(card).unwrap())
        );

        tracker.on_pointer_down(&mut doc, true);
        assert!(doc.overlay().is_some());
        tracker.on_pointer_down(&mut doc, false);
        assert!(doc.overlay().is_none());
        assert!(tracker.open_for().is_none());
    }
}
