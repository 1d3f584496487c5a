//! Policy actions for scored items: hide, warn and the host's
//! "not interested" interaction.
//!
//! Idempotency differs per action. The hidden treatment is reapplied on every
//! render. Warnings and not-interested are gated by their marker sets, and a
//! not-interested attempt that is waiting on the menu blocks new attempts for
//! the same item.

use std::collections::VecDeque;

use feedwarden_core_types::{ItemId, ScoreData, ViewHandle};
use feedwarden_policy_center::{Tier, WardenConfig};
use feedwarden_state_center::{AuditEntry, AuditKind, AuditSink, MarkerSets};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::discovery::DiscoveryEngine;
use crate::errors::OrchestratorError;
use crate::event::{Event, TimerEvent};
use crate::metrics;
use crate::timer::Timer;
use crate::view::{HostView, HIDDEN_CLASS, WARNING_CLASS};

pub const MENU_LABELS: [&str; 2] = ["Action menu", "Menú de acciones"];
pub const NOT_INTERESTED_TEXTS: [&str; 2] = ["Not interested", "No me interesa"];

#[derive(Clone, Debug, PartialEq)]
struct Attempt {
    item: ItemId,
    handle: ViewHandle,
    score: f64,
}

/// What a single policy evaluation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub hidden: bool,
    pub warned: bool,
    pub not_interested_requested: bool,
}

pub struct PolicyEngine {
    markers: MarkerSets,
    audit: Box<dyn AuditSink>,
    menu_timer: Timer<Event>,
    resume_timer: Timer<Event>,
    active: Option<Attempt>,
    waiting: VecDeque<Attempt>,
}

impl PolicyEngine {
    pub fn new(markers: MarkerSets, audit: Box<dyn AuditSink>, tx: UnboundedSender<Event>) -> Self {
        Self {
            markers,
            audit,
            menu_timer: Timer::new("menu-wait", tx.clone()),
            resume_timer: Timer::new("observation-resume", tx),
            active: None,
            waiting: VecDeque::new(),
        }
    }

    pub fn markers(&self) -> &MarkerSets {
        &self.markers
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    pub fn set_logging(&mut self, enabled: bool) {
        self.audit.set_enabled(enabled);
    }

    pub fn record(&mut self, entry: AuditEntry) {
        let kind = entry.kind;
        if let Err(err) = self.audit.append(entry) {
            warn!(target: "feedwarden::actions", kind = kind.as_str(), %err, "audit append failed");
        }
    }

    /// Whether a not-interested attempt for `item` is running or waiting.
    pub fn is_pending(&self, item: &ItemId) -> bool {
        self.active.as_ref().map_or(false, |a| &a.item == item)
            || self.waiting.iter().any(|a| &a.item == item)
    }

    pub fn flow_active(&self) -> bool {
        self.active.is_some()
    }

    /// Applies the configured actions for one rendered item.
    pub fn apply<V: HostView + ?Sized>(
        &mut self,
        view: &mut V,
        discovery: &mut DiscoveryEngine,
        item: &ItemId,
        handle: ViewHandle,
        data: &ScoreData,
        config: &WardenConfig,
    ) -> PolicyOutcome {
        let mut outcome = PolicyOutcome::default();
        let actions = config.auto_actions;
        match Tier::classify(data.score, &config.score_thresholds) {
            Tier::Bad => {
                if actions.hide_videos {
                    match view.add_class(handle, HIDDEN_CLASS) {
                        Ok(()) => {
                            outcome.hidden = true;
                            metrics::record_policy_action("hidden");
                            self.record(
                                AuditEntry::new(AuditKind::VideoHidden, item.clone())
                                    .with_score(data.score),
                            );
                        }
                        Err(err) => self.action_failed(OrchestratorError::action(item, err.to_string())),
                    }
                }
                if actions.use_not_interested {
                    outcome.not_interested_requested =
                        self.request_not_interested(view, discovery, item, handle, data.score, config);
                }
            }
            Tier::Warning => {
                if actions.show_warnings && !self.markers.warning.contains(item) {
                    match view.add_class(handle, WARNING_CLASS) {
                        Ok(()) => {
                            outcome.warned = true;
                            if let Err(err) = self.markers.warning.add(item) {
                                warn!(target: "feedwarden::actions", %item, %err, "warning marker not persisted");
                            }
                            metrics::record_policy_action("warning");
                            self.record(
                                AuditEntry::new(AuditKind::VideoWarningApplied, item.clone())
                                    .with_score(data.score),
                            );
                        }
                        Err(err) => self.action_failed(OrchestratorError::action(item, err.to_string())),
                    }
                } else if actions.show_warnings {
                    debug!(target: "feedwarden::actions", %item, "warning already applied");
                }
            }
            Tier::Good => {}
        }
        outcome
    }

    fn request_not_interested<V: HostView + ?Sized>(
        &mut self,
        view: &mut V,
        discovery: &mut DiscoveryEngine,
        item: &ItemId,
        handle: ViewHandle,
        score: f64,
        config: &WardenConfig,
    ) -> bool {
        if self.markers.not_interested.contains(item) {
            debug!(target: "feedwarden::actions", %item, "already marked not interested");
            return false;
        }
        if self.is_pending(item) {
            return false;
        }
        let attempt = Attempt {
            item: item.clone(),
            handle,
            score,
        };
        if self.active.is_some() {
            debug!(target: "feedwarden::actions", %item, "menu busy; not-interested attempt queued");
            self.waiting.push_back(attempt);
            return true;
        }
        self.start(view, discovery, attempt, config)
    }

    /// Opens the card menu. Returns `false` when the flow could not start.
    fn start<V: HostView + ?Sized>(
        &mut self,
        view: &mut V,
        discovery: &mut DiscoveryEngine,
        attempt: Attempt,
        config: &WardenConfig,
    ) -> bool {
        let Some(button) = view.find_menu_button(attempt.handle, &MENU_LABELS) else {
            self.action_failed(OrchestratorError::action(&attempt.item, "action menu button not found"));
            return false;
        };

        discovery.suspend();
        let item = attempt.item.clone();
        self.active = Some(attempt);
        match view.click(button) {
            Ok(()) => {
                debug!(target: "feedwarden::actions", %item, "action menu opened");
                self.menu_timer
                    .schedule(config.timings.menu_open_delay(), move |seq| {
                        Event::Timer(TimerEvent::MenuOpened { seq, item })
                    });
            }
            Err(err) => {
                self.action_failed(OrchestratorError::action(&item, err.to_string()));
                self.schedule_resume(config);
            }
        }
        true
    }

    /// Second half of the flow, after the menu had time to render.
    pub fn on_menu_opened<V: HostView + ?Sized>(
        &mut self,
        view: &mut V,
        seq: u64,
        item: &ItemId,
        config: &WardenConfig,
    ) {
        if !self.menu_timer.take_fired(seq) {
            return;
        }
        let score = self.active.as_ref().map(|a| a.score);
        match view.find_menu_option(&NOT_INTERESTED_TEXTS) {
            Some(option) => match view.click(option) {
                Ok(()) => {
                    if let Err(err) = self.markers.not_interested.add(item) {
                        warn!(target: "feedwarden::actions", %item, %err, "not-interested marker not persisted");
                    }
                    metrics::record_policy_action("not_interested");
                    let mut entry = AuditEntry::new(AuditKind::VideoMarkedNotInterested, item.clone());
                    entry.score = score;
                    self.record(entry);
                    info!(target: "feedwarden::actions", %item, "marked not interested");
                }
                Err(err) => self.action_failed(OrchestratorError::action(item, err.to_string())),
            },
            None => self.action_failed(OrchestratorError::action(item, "not-interested option not found")),
        }
        self.schedule_resume(config);
    }

    /// Ends the settle delay: starts the next waiting attempt or resumes
    /// observation.
    pub fn on_resume<V: HostView + ?Sized>(
        &mut self,
        view: &mut V,
        discovery: &mut DiscoveryEngine,
        seq: u64,
        config: &WardenConfig,
    ) {
        if !self.resume_timer.take_fired(seq) {
            return;
        }
        self.active = None;
        while let Some(next) = self.waiting.pop_front() {
            if self.markers.not_interested.contains(&next.item) {
                continue;
            }
            if !view.is_live(next.handle) {
                self.action_failed(OrchestratorError::action(&next.item, "card left the view"));
                continue;
            }
            if self.start(view, discovery, next, config) {
                return;
            }
        }
        discovery.resume();
        debug!(target: "feedwarden::actions", "observation resumed");
    }

    pub fn teardown(&mut self) {
        self.menu_timer.cancel();
        self.resume_timer.cancel();
        self.active = None;
        self.waiting.clear();
    }

    fn schedule_resume(&mut self, config: &WardenConfig) {
        self.resume_timer.schedule(config.timings.settle_delay(), |seq| {
            Event::Timer(TimerEvent::ResumeObservation { seq })
        });
    }

    fn action_failed(&self, err: OrchestratorError) {
        metrics::record_policy_action("error");
        warn!(target: "feedwarden::actions", kind = err.kind(), %err, "policy action failed");
    }
}
