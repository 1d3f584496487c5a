#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feedwarden::connection::{ConnectionEvent, ConnectionEvents, PushConnector};
use feedwarden::protocol::EvaluateRequest;
use feedwarden::{EvaluationClient, HostView, Orchestrator, OrchestratorError, OrchestratorResult, Services};
use feedwarden_policy_center::{default_config, ConfigSnapshot, WardenConfig};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Connector whose sockets are driven by the test.
#[derive(Default)]
pub struct FakeConnector {
    sessions: Mutex<Vec<(String, ConnectionEvents)>>,
}

impl FakeConnector {
    pub fn attempts(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn session(&self, idx: usize) -> ConnectionEvents {
        self.sessions.lock()[idx].1.clone()
    }

    pub fn latest(&self) -> ConnectionEvents {
        self.sessions
            .lock()
            .last()
            .map(|(_, events)| events.clone())
            .expect("no connection attempt yet")
    }

    pub fn urls(&self) -> Vec<String> {
        self.sessions.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    pub fn open_latest(&self) {
        self.latest().send(ConnectionEvent::Opened);
    }

    pub fn push_latest(&self, text: &str) {
        self.latest().send(ConnectionEvent::Message(text.to_string()));
    }
}

impl PushConnector for FakeConnector {
    fn open(&self, url: &str, events: ConnectionEvents) -> Result<JoinHandle<()>, OrchestratorError> {
        self.sessions.lock().push((url.to_string(), events));
        Ok(tokio::spawn(std::future::pending::<()>()))
    }
}

/// Records every request; fails the next `fail_next` of them.
#[derive(Default)]
pub struct FakeClient {
    requests: Mutex<Vec<EvaluateRequest>>,
    timeouts: Mutex<Vec<Duration>>,
    failures: Mutex<VecDeque<String>>,
}

impl FakeClient {
    pub fn fail_next(&self, reason: &str) {
        self.failures.lock().push_back(reason.to_string());
    }

    pub fn requested(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|request| request.video_id.to_string())
            .collect()
    }

    pub fn timeouts(&self) -> Vec<Duration> {
        self.timeouts.lock().clone()
    }

    pub fn count_for(&self, id: &str) -> usize {
        self.requested().iter().filter(|r| r.as_str() == id).count()
    }
}

#[async_trait]
impl EvaluationClient for FakeClient {
    async fn evaluate(
        &self,
        _endpoint: &str,
        timeout: Duration,
        request: &EvaluateRequest,
    ) -> OrchestratorResult<()> {
        self.requests.lock().push(request.clone());
        self.timeouts.lock().push(timeout);
        match self.failures.lock().pop_front() {
            Some(reason) => Err(OrchestratorError::dispatch(&request.video_id, reason)),
            None => Ok(()),
        }
    }
}

pub struct Rig<V: HostView> {
    pub orchestrator: Orchestrator<V>,
    pub connector: Arc<FakeConnector>,
    pub client: Arc<FakeClient>,
}

pub fn rig<V: HostView>(view: V, config: WardenConfig) -> Rig<V> {
    let connector = Arc::new(FakeConnector::default());
    let client = Arc::new(FakeClient::default());
    let services = Services::in_memory(connector.clone(), client.clone());
    let orchestrator = Orchestrator::new(view, Arc::new(ConfigSnapshot::new(1, config)), services);
    Rig {
        orchestrator,
        connector,
        client,
    }
}

pub fn default_rig<V: HostView>(view: V) -> Rig<V> {
    rig(view, default_config())
}

impl<V: HostView> Rig<V> {
    /// Advances the paused clock and handles whatever that produced.
    pub async fn advance(&mut self, ms: u64) {
        self.orchestrator.settle().await;
        tokio::time::advance(Duration::from_millis(ms)).await;
        self.orchestrator.settle().await;
    }

    pub async fn settle(&mut self) {
        self.orchestrator.settle().await;
    }

    /// Starts the loop and opens the first connection.
    pub async fn start_open(&mut self) {
        self.orchestrator.start();
        self.connector.open_latest();
        self.orchestrator.settle().await;
    }
}

pub fn score_message(id: &str, score: f64) -> String {
    format!(r#"{{"type":"videoScore","videoId":"{id}","score":{score},"categories":{{"hatred":{score},"clarity":8.5}}}}"#)
}

pub fn score_with_summary(id: &str, score: f64, summary: &str) -> String {
    format!(
        r#"{{"type":"videoScore","videoId":"{id}","score":{score},"categories":{{}},"content_summary":"{summary}","evaluation_summary":"checked"}}"#
    )
}

/// Backend stand-in that accepts every request and answers on the push
/// channel with a preset score.
#[derive(Default)]
pub struct LoopbackBackend {
    events: Mutex<Option<ConnectionEvents>>,
    scores: Mutex<HashMap<String, f64>>,
    requests: Mutex<Vec<String>>,
}

impl LoopbackBackend {
    pub fn with_scores(scores: &[(&str, f64)]) -> Arc<Self> {
        let backend = Self::default();
        backend
            .scores
            .lock()
            .extend(scores.iter().map(|(id, score)| (id.to_string(), *score)));
        Arc::new(backend)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl PushConnector for LoopbackBackend {
    fn open(&self, _url: &str, events: ConnectionEvents) -> Result<JoinHandle<()>, OrchestratorError> {
        events.send(ConnectionEvent::Opened);
        *self.events.lock() = Some(events);
        Ok(tokio::spawn(std::future::pending::<()>()))
    }
}

#[async_trait]
impl EvaluationClient for LoopbackBackend {
    async fn evaluate(
        &self,
        _endpoint: &str,
        _timeout: Duration,
        request: &EvaluateRequest,
    ) -> OrchestratorResult<()> {
        let id = request.video_id.to_string();
        self.requests.lock().push(id.clone());
        let score = self.scores.lock().get(&id).copied();
        if let (Some(score), Some(events)) = (score, self.events.lock().as_ref()) {
            events.send(ConnectionEvent::Message(score_message(&id, score)));
        }
        Ok(())
    }
}
