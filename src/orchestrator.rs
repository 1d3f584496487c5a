//! The event loop that owns every piece of mutable state.
//!
//! Spawned tasks (timers, the push socket, evaluation requests, the location
//! poll) never touch state directly; they post [`Event`]s and the loop handles
//! them one at a time.

use std::sync::Arc;

use feedwarden_core_types::{ItemId, ItemState};
use feedwarden_policy_center::{ConfigSnapshot, WardenConfig};
use feedwarden_registry::{ItemRegistry, StateCounts};
use feedwarden_state_center::{AuditEntry, AuditSink, InMemoryAuditLog, MarkerSets, AUDIT_CAPACITY};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::actions::PolicyEngine;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, PushConnector};
use crate::discovery::{Discovered, DiscoveryEngine};
use crate::dispatcher::{Dispatcher, EvaluationClient};
use crate::errors::OrchestratorResult;
use crate::event::{Event, TimerEvent};
use crate::reconciler::{Reconciler, ScoreTargets};
use crate::render::{self, OverlayTracker};
use crate::timer::{Debouncer, Timer};
use crate::view::{HostEvent, HostView};

/// External collaborators the orchestrator is wired to.
pub struct Services {
    pub connector: Arc<dyn PushConnector>,
    pub client: Arc<dyn EvaluationClient>,
    pub markers: MarkerSets,
    pub audit: Box<dyn AuditSink>,
}

impl Services {
    /// Volatile markers and audit log.
    pub fn in_memory(connector: Arc<dyn PushConnector>, client: Arc<dyn EvaluationClient>) -> Self {
        Self {
            connector,
            client,
            markers: MarkerSets::in_memory(),
            audit: Box::new(InMemoryAuditLog::new(AUDIT_CAPACITY)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Cloneable sender used by hosts to feed the loop.
#[derive(Clone, Debug)]
pub struct OrchestratorHandle {
    tx: UnboundedSender<Event>,
}

impl OrchestratorHandle {
    pub fn from_sender(tx: UnboundedSender<Event>) -> Self {
        Self { tx }
    }

    pub fn post(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn view_mutated(&self, added: usize, removed: usize) -> bool {
        self.post(Event::ViewMutated { added, removed })
    }

    pub fn host(&self, event: HostEvent) -> bool {
        self.post(Event::Host(event))
    }

    pub fn shutdown(&self) -> bool {
        self.post(Event::Shutdown)
    }
}

/// Point-in-time view of the loop, for logs and the CLI.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub config_rev: u64,
    pub connection: String,
    pub unseen: usize,
    pub queued: usize,
    pub scored: usize,
    pub in_flight: usize,
    pub scores_applied: u64,
    pub messages_dropped: u64,
    pub not_interested: usize,
    pub warnings: usize,
    pub audit_entries: usize,
}

pub struct Orchestrator<V: HostView> {
    view: V,
    config: Arc<ConfigSnapshot>,
    registry: ItemRegistry,
    discovery: DiscoveryEngine,
    debouncer: Debouncer<Event>,
    navigation: Timer<Event>,
    connection: ConnectionManager,
    dispatcher: Dispatcher,
    reconciler: Reconciler,
    policy: PolicyEngine,
    overlay: OverlayTracker,
    background: CancellationToken,
    poll_task: Option<JoinHandle<()>>,
    config_task: Option<JoinHandle<()>>,
    tx: UnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
    started: bool,
    stopped: bool,
}

impl<V: HostView> Orchestrator<V> {
    pub fn new(view: V, config: Arc<ConfigSnapshot>, services: Services) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let timings = config.config.timings;
        let mut policy = PolicyEngine::new(services.markers, services.audit, tx.clone());
        policy.set_logging(config.config.log_actions);
        Self {
            view,
            registry: ItemRegistry::new(),
            discovery: DiscoveryEngine::new(),
            debouncer: Debouncer::new(timings.debounce(), tx.clone(), |seq| Event::DiscoveryDue { seq }),
            navigation: Timer::new("navigation-rescan", tx.clone()),
            connection: ConnectionManager::new(services.connector, tx.clone(), timings.reconnect_delay()),
            dispatcher: Dispatcher::new(services.client, tx.clone()),
            reconciler: Reconciler::new(),
            policy,
            overlay: OverlayTracker::new(),
            background: CancellationToken::new(),
            poll_task: None,
            config_task: None,
            config,
            tx,
            rx,
            started: false,
            stopped: false,
        }
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle::from_sender(self.tx.clone())
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    pub fn discovery(&self) -> &DiscoveryEngine {
        &self.discovery
    }

    pub fn policy(&self) -> &PolicyEngine {
        &self.policy
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.policy.audit_entries()
    }

    pub fn summary(&self) -> RunSummary {
        let StateCounts {
            unseen,
            queued,
            scored,
        } = self.registry.counts();
        let markers = self.policy.markers();
        RunSummary {
            config_rev: self.config.rev,
            connection: self.connection.state().to_string(),
            unseen,
            queued,
            scored,
            in_flight: self.dispatcher.in_flight_count(),
            scores_applied: self.reconciler.applied(),
            messages_dropped: self.reconciler.dropped(),
            not_interested: markers.not_interested.len(),
            warnings: markers.warning.len(),
            audit_entries: self.policy.audit_entries().len(),
        }
    }

    /// Connects the push channel, starts navigation polling and runs the
    /// initial discovery pass. Calling it twice is a no-op.
    pub fn start(&mut self) {
        if self.started || self.stopped {
            return;
        }
        self.started = true;
        let location = self.view.location();
        self.discovery.observe_location(&location);
        let ws_url = self.config.config.ws_url.clone();
        self.connection.connect(&ws_url);
        self.spawn_location_poll();
        info!(
            target: "feedwarden::orchestrator",
            %location,
            %ws_url,
            rev = self.config.rev,
            "orchestrator started"
        );
        self.run_discovery("initial");
    }

    /// Forwards every published snapshot into the loop.
    pub fn watch_config(&mut self, mut rx: watch::Receiver<Arc<ConfigSnapshot>>) {
        if let Some(task) = self.config_task.take() {
            task.abort();
        }
        let tx = self.tx.clone();
        let cancel = self.background.child_token();
        self.config_task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = Arc::clone(&rx.borrow_and_update());
                        if tx.send(Event::ConfigReplaced(snapshot)).is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// Runs until [`Event::Shutdown`], then tears everything down.
    pub async fn run(&mut self) -> OrchestratorResult<RunSummary> {
        self.start();
        while let Some(event) = self.rx.recv().await {
            if self.dispatch(event) == Flow::Stop {
                break;
            }
        }
        self.teardown();
        Ok(self.summary())
    }

    /// Handles every event already queued without waiting for more.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            handled += 1;
            if self.dispatch(event) == Flow::Stop {
                break;
            }
        }
        handled
    }

    /// Lets spawned tasks run and handles what they post until nothing new
    /// arrives. Useful with a paused clock.
    pub async fn settle(&mut self) -> usize {
        let mut handled = 0;
        loop {
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            let batch = self.pump();
            if batch == 0 {
                return handled;
            }
            handled += batch;
        }
    }

    pub fn dispatch(&mut self, event: Event) -> Flow {
        if self.stopped {
            return Flow::Stop;
        }
        trace!(target: "feedwarden::orchestrator", kind = event.kind(), "event");
        match event {
            Event::ViewMutated { added, removed } => {
                if self.discovery.accepts_mutation(added, removed) {
                    self.debouncer.trigger();
                }
            }
            Event::DiscoveryDue { seq } => {
                if self.debouncer.take_fired(seq) {
                    self.run_discovery("mutation");
                }
            }
            Event::LocationPoll => self.on_location_poll(),
            Event::Connection { generation, event } => self.on_connection(generation, event),
            Event::DispatchFinished { item, outcome } => {
                self.dispatcher.on_finished(&item, outcome, &mut self.registry);
            }
            Event::Timer(timer) => self.on_timer(timer),
            Event::ConfigReplaced(snapshot) => self.replace_config(snapshot),
            Event::Host(host) => self.on_host(host),
            Event::Shutdown => {
                self.teardown();
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Stops timers, background tasks and the connection. Registry state is
    /// kept for inspection.
    pub fn teardown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.background.cancel();
        for task in [self.poll_task.take(), self.config_task.take()].into_iter().flatten() {
            task.abort();
        }
        self.debouncer.cancel();
        self.navigation.cancel();
        self.connection.teardown();
        self.policy.teardown();
        self.overlay.dismiss(&mut self.view);
        info!(target: "feedwarden::orchestrator", "orchestrator stopped");
    }

    fn spawn_location_poll(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        let period = self.config.config.timings.location_poll();
        let tx = self.tx.clone();
        let cancel = self.background.child_token();
        let first_tick = Instant::now() + period;
        self.poll_task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if tx.send(Event::LocationPoll).is_err() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    fn run_discovery(&mut self, reason: &'static str) {
        let open = self.connection.is_open();
        let found = self.discovery.scan(&self.view, &self.registry, open);
        debug!(target: "feedwarden::orchestrator", reason, pending = found.len(), "discovery pass");
        for Discovered { id, handle } in found {
            self.registry.bind(&id, handle);
            match self.registry.state(&id) {
                Some(ItemState::Scored) => self.show_scored(&id),
                Some(ItemState::Queued) => {
                    render::paint_badge(&mut self.view, handle, render::processing_badge());
                }
                _ if open => self.request(&id),
                _ => trace!(target: "feedwarden::orchestrator", item = %id, "waiting for push channel"),
            }
        }
    }

    /// Renders a stored score on the item's current card and applies policy.
    fn show_scored(&mut self, id: &ItemId) {
        let snapshot = Arc::clone(&self.config);
        let config = &snapshot.config;
        let (Some(handle), Some(data)) = (self.registry.handle(id), self.registry.score(id).cloned()) else {
            return;
        };
        if render::render_scored(&mut self.view, handle, &data, &config.score_thresholds) {
            self.policy
                .apply(&mut self.view, &mut self.discovery, id, handle, &data, config);
        }
        self.discovery.mark_processed(id);
    }

    fn request(&mut self, id: &ItemId) {
        let snapshot = Arc::clone(&self.config);
        if !self
            .dispatcher
            .request_evaluation(id, &mut self.registry, &snapshot.config)
        {
            return;
        }
        if let Some(handle) = self.registry.handle(id) {
            render::paint_badge(&mut self.view, handle, render::processing_badge());
        }
    }

    fn on_location_poll(&mut self) {
        let location = self.view.location();
        if !self.discovery.observe_location(&location) {
            return;
        }
        info!(target: "feedwarden::orchestrator", %location, "navigation detected");
        self.discovery.clear_processed();
        self.overlay.dismiss(&mut self.view);
        let delay = self.config.config.timings.navigation_rescan();
        self.navigation
            .schedule(delay, |seq| Event::Timer(TimerEvent::NavigationRescan { seq }));
    }

    fn on_connection(&mut self, generation: u64, event: ConnectionEvent) {
        if !self.connection.accepts(generation) {
            trace!(target: "feedwarden::orchestrator", generation, "event from superseded connection dropped");
            return;
        }
        match event {
            ConnectionEvent::Opened => {
                self.connection.on_opened();
                self.flush_pending();
            }
            ConnectionEvent::Message(text) => {
                if let Some((item, data)) = self.reconciler.decode(&text) {
                    let snapshot = Arc::clone(&self.config);
                    self.reconciler.apply(
                        item,
                        data,
                        ScoreTargets {
                            view: &mut self.view,
                            registry: &mut self.registry,
                            discovery: &mut self.discovery,
                            policy: &mut self.policy,
                            config: &snapshot.config,
                        },
                    );
                }
            }
            ConnectionEvent::Error(message) => self.connection.on_error(&message),
            ConnectionEvent::Closed => self.connection.on_closed(),
        }
    }

    /// Requests every displayed item that has no score and no request in
    /// flight.
    fn flush_pending(&mut self) {
        let mut pending: Vec<(ItemId, ItemState)> = self
            .registry
            .iter()
            .filter(|record| record.view_handle.map_or(false, |handle| self.view.is_live(handle)))
            .filter(|record| match record.state {
                ItemState::Unseen => true,
                ItemState::Queued => !self.dispatcher.is_in_flight(&record.id),
                ItemState::Scored => false,
            })
            .map(|record| (record.id.clone(), record.state))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(target: "feedwarden::orchestrator", pending = pending.len(), "flushing after connect");
        for (id, state) in pending {
            if state == ItemState::Queued {
                self.registry.revert_to_unseen(&id);
            }
            self.request(&id);
        }
    }

    fn on_timer(&mut self, timer: TimerEvent) {
        let snapshot = Arc::clone(&self.config);
        let config = &snapshot.config;
        match timer {
            TimerEvent::NavigationRescan { seq } => {
                if self.navigation.take_fired(seq) {
                    self.run_discovery("navigation");
                }
            }
            TimerEvent::Reconnect { seq } => {
                if self.connection.take_reconnect(seq) {
                    self.connection.connect(&config.ws_url);
                }
            }
            TimerEvent::MenuOpened { seq, item } => {
                self.policy.on_menu_opened(&mut self.view, seq, &item, config);
            }
            TimerEvent::ResumeObservation { seq } => {
                self.policy
                    .on_resume(&mut self.view, &mut self.discovery, seq, config);
            }
        }
    }

    /// Installs a new snapshot and re-applies stored scores under it.
    fn replace_config(&mut self, snapshot: Arc<ConfigSnapshot>) {
        if snapshot.rev < self.config.rev {
            debug!(target: "feedwarden::orchestrator", rev = snapshot.rev, "stale configuration ignored");
            return;
        }
        let previous = std::mem::replace(&mut self.config, Arc::clone(&snapshot));
        let config = &snapshot.config;
        self.policy.set_logging(config.log_actions);
        self.debouncer.set_window(config.timings.debounce());
        self.connection
            .set_reconnect_delay(config.timings.reconnect_delay());
        if self.started && previous.config.timings.location_poll() != config.timings.location_poll() {
            self.spawn_location_poll();
        }
        if self.started && previous.config.ws_url != config.ws_url {
            info!(target: "feedwarden::orchestrator", ws_url = %config.ws_url, "push url changed; reconnecting");
            self.connection.connect(&config.ws_url);
        }
        info!(target: "feedwarden::orchestrator", rev = snapshot.rev, "configuration replaced");

        let scored = self.registry.scored_with_handles();
        let mut rendered = 0usize;
        for (id, handle) in scored {
            if !self.view.is_live(handle) {
                continue;
            }
            let Some(data) = self.registry.score(&id).cloned() else {
                continue;
            };
            if render::render_scored(&mut self.view, handle, &data, &config.score_thresholds) {
                rendered += 1;
                self.policy
                    .apply(&mut self.view, &mut self.discovery, &id, handle, &data, config);
            }
        }
        debug!(target: "feedwarden::orchestrator", rendered, "scores re-rendered");
    }

    fn on_host(&mut self, event: HostEvent) {
        match event {
            HostEvent::SummaryActivated { handle } => {
                let Some(item) = self.registry.item_at(handle).cloned() else {
                    return;
                };
                let Some(data) = self.registry.score(&item).cloned() else {
                    return;
                };
                self.overlay.open(&mut self.view, &item, handle, &data);
            }
            HostEvent::PointerDown { inside_overlay } => {
                self.overlay.on_pointer_down(&mut self.view, inside_overlay)
            }
            HostEvent::Scrolled { .. } => self.overlay.on_scroll(&mut self.view),
        }
    }
}

impl<V: HostView> Drop for Orchestrator<V> {
    fn drop(&mut self) {
        self.background.cancel();
    }
}
