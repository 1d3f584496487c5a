//! The single logical push connection to the scoring backend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::OrchestratorError;
use crate::event::{Event, TimerEvent};
use crate::metrics;
use crate::timer::Timer;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened,
    Message(String),
    Error(String),
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// The connector could not start; a retry is scheduled.
    Failed,
    /// Torn down; never reconnects.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Sender handed to a connection task. Every event carries the generation of
/// the connection attempt that produced it.
#[derive(Clone, Debug)]
pub struct ConnectionEvents {
    generation: u64,
    tx: UnboundedSender<Event>,
}

impl ConnectionEvents {
    pub fn new(generation: u64, tx: UnboundedSender<Event>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `false` once the orchestrator is gone.
    pub fn send(&self, event: ConnectionEvent) -> bool {
        self.tx
            .send(Event::Connection {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Opens push connections. The returned task owns the socket and reports
/// through `events` until it ends with [`ConnectionEvent::Closed`].
pub trait PushConnector: Send + Sync {
    fn open(&self, url: &str, events: ConnectionEvents) -> Result<JoinHandle<()>, OrchestratorError>;
}

#[derive(Clone, Debug, Default)]
pub struct WsConnector;

impl PushConnector for WsConnector {
    fn open(&self, url: &str, events: ConnectionEvents) -> Result<JoinHandle<()>, OrchestratorError> {
        let url = Url::parse(url)
            .map_err(|err| OrchestratorError::Transport(format!("invalid push url {url}: {err}")))?;
        Ok(tokio::spawn(async move {
            run_socket(url, &events).await;
            events.send(ConnectionEvent::Closed);
        }))
    }
}

async fn run_socket(url: Url, events: &ConnectionEvents) {
    let (mut ws_stream, _) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(err) => {
            events.send(ConnectionEvent::Error(err.to_string()));
            return;
        }
    };
    if !events.send(ConnectionEvent::Opened) {
        return;
    }
    // Pings are answered by tungstenite while the stream is polled.
    while let Some(frame) = ws_stream.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                events.send(ConnectionEvent::Error(err.to_string()));
                return;
            }
        };
        match message {
            WsMessage::Text(text) => {
                if !events.send(ConnectionEvent::Message(text)) {
                    return;
                }
            }
            WsMessage::Close(_) => return,
            _ => {}
        }
    }
}

/// Connection state machine with generation-tagged attempts and a fixed
/// delay retry.
pub struct ConnectionManager {
    connector: Arc<dyn PushConnector>,
    tx: UnboundedSender<Event>,
    state: ConnectionState,
    generation: u64,
    task: Option<JoinHandle<()>>,
    reconnect: Timer<Event>,
    reconnect_delay: Duration,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn PushConnector>,
        tx: UnboundedSender<Event>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            connector,
            reconnect: Timer::new("reconnect", tx.clone()),
            tx,
            state: ConnectionState::Disconnected,
            generation: 0,
            task: None,
            reconnect_delay,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    pub fn set_reconnect_delay(&mut self, delay: Duration) {
        self.reconnect_delay = delay;
    }

    /// Starts a new attempt, aborting the previous one and any pending retry
    /// first.
    pub fn connect(&mut self, url: &str) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.reconnect.cancel();
        self.abort_task();
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        let events = ConnectionEvents::new(self.generation, self.tx.clone());
        match self.connector.open(url, events) {
            Ok(task) => {
                debug!(target: "feedwarden::connection", generation = self.generation, %url, "connecting");
                self.task = Some(task);
            }
            Err(err) => {
                warn!(target: "feedwarden::connection", generation = self.generation, %err, "connector failed to start");
                self.state = ConnectionState::Failed;
                self.schedule_reconnect();
            }
        }
    }

    /// Events from superseded attempts, or after teardown, are dropped.
    pub fn accepts(&self, generation: u64) -> bool {
        self.state != ConnectionState::Closed && generation == self.generation
    }

    pub fn on_opened(&mut self) {
        self.state = ConnectionState::Open;
        self.reconnect.cancel();
        metrics::set_connection_open(true);
        info!(target: "feedwarden::connection", generation = self.generation, "push channel open");
    }

    pub fn on_error(&self, message: &str) {
        warn!(target: "feedwarden::connection", generation = self.generation, error = %message, "push channel error");
    }

    pub fn on_closed(&mut self) {
        self.task = None;
        self.state = ConnectionState::Disconnected;
        metrics::set_connection_open(false);
        info!(
            target: "feedwarden::connection",
            generation = self.generation,
            retry_in_ms = self.reconnect_delay.as_millis() as u64,
            "push channel closed"
        );
        self.schedule_reconnect();
    }

    /// Accepts a reconnect timer event. The caller then calls
    /// [`ConnectionManager::connect`].
    pub fn take_reconnect(&mut self, seq: u64) -> bool {
        if self.state == ConnectionState::Closed {
            return false;
        }
        if self.reconnect.take_fired(seq) {
            metrics::record_reconnect();
            true
        } else {
            false
        }
    }

    pub fn teardown(&mut self) {
        self.state = ConnectionState::Closed;
        self.reconnect.cancel();
        self.abort_task();
        metrics::set_connection_open(false);
    }

    fn schedule_reconnect(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.reconnect.schedule(self.reconnect_delay, |seq| {
            Event::Timer(TimerEvent::Reconnect { seq })
        });
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.abort_task();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingConnector {
        attempts: Mutex<Vec<(String, u64)>>,
        fail: bool,
    }

    impl PushConnector for RecordingConnector {
        fn open(&self, url: &str, events: ConnectionEvents) -> Result<JoinHandle<()>, OrchestratorError> {
            if self.fail {
                return Err(OrchestratorError::Transport("refused".into()));
            }
            self.attempts.lock().push((url.to_string(), events.generation()));
            Ok(tokio::spawn(std::future::pending::<()>()))
        }
    }

    fn new_manager(connector: Arc<RecordingConnector>) -> (ConnectionManager, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ConnectionManager::new(connector, tx, Duration::from_secs(5)),
            rx,
        )
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn generations_advance_per_attempt() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, _rx) = new_manager(Arc::clone(&connector));
        manager.connect("ws://localhost:3000/ws");
        manager.connect("ws://localhost:3000/ws");
        assert_eq!(manager.generation(), 2);
        assert!(!manager.accepts(1));
        assert!(manager.accepts(2));
        assert_eq!(connector.attempts.lock().len(), 2);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn close_schedules_exactly_one_reconnect() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, mut rx) = new_manager(connector);
        manager.connect("ws://localhost:3000/ws");
        manager.on_opened();
        manager.on_closed();
        manager.on_closed();
        assert!(manager.reconnect_pending());

        tokio::time::advance(Duration::from_millis(5_001)).await;
        settle().await;
        let mut fired = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Event::Timer(TimerEvent::Reconnect { seq }) = event {
                fired.push(seq);
            }
        }
        assert_eq!(fired.len(), 1);
        assert!(manager.take_reconnect(fired[0]));
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn open_cancels_pending_retry() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, mut rx) = new_manager(connector);
        manager.connect("ws://localhost:3000/ws");
        manager.on_closed();
        assert!(manager.reconnect_pending());
        manager.connect("ws://localhost:3000/ws");
        manager.on_opened();
        assert!(!manager.reconnect_pending());
        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn new_attempt_replaces_pending_retry() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, mut rx) = new_manager(Arc::clone(&connector));
        manager.connect("ws://localhost:3000/ws");
        manager.on_closed();
        assert!(manager.reconnect_pending());

        manager.connect("ws://localhost:4000/ws");
        assert!(!manager.reconnect_pending());
        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.state(), ConnectionState::Connecting);
        let last = connector.attempts.lock().last().cloned();
        assert_eq!(last, Some(("ws://localhost:4000/ws".to_string(), 2)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_is_retried() {
        let connector = Arc::new(RecordingConnector {
            fail: true,
            ..Default::default()
        });
        let (mut manager, _rx) = new_manager(connector);
        manager.connect("ws://localhost:3000/ws");
        assert_eq!(manager.state(), ConnectionState::Failed);
        assert!(manager.reconnect_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_reconnecting() {
        let connector = Arc::new(RecordingConnector::default());
        let (mut manager, mut rx) = new_manager(Arc::clone(&connector));
        manager.connect("ws://localhost:3000/ws");
        manager.on_closed();
        manager.teardown();
        assert_eq!(manager.state(), ConnectionState::Closed);
        assert!(!manager.reconnect_pending());
        assert!(!manager.accepts(manager.generation()));

        manager.connect("ws://localhost:3000/ws");
        assert_eq!(connector.attempts.lock().len(), 1);
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn ws_connector_rejects_invalid_url() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = WsConnector.open("not a url", ConnectionEvents::new(1, tx));
        assert!(matches!(result, Err(OrchestratorError::Transport(_))));
    }
}
