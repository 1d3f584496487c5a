//! One-shot evaluation requests for Unseen items.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use feedwarden_core_types::{ItemId, ItemState};
use feedwarden_policy_center::WardenConfig;
use feedwarden_registry::ItemRegistry;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::errors::{OrchestratorError, OrchestratorResult};
use crate::event::Event;
use crate::metrics;
use crate::protocol::EvaluateRequest;

#[async_trait]
pub trait EvaluationClient: Send + Sync {
    /// Any non-success outcome is an error; the score itself arrives on the
    /// push channel. `timeout` bounds the whole exchange.
    async fn evaluate(
        &self,
        endpoint: &str,
        timeout: Duration,
        request: &EvaluateRequest,
    ) -> OrchestratorResult<()>;
}

/// reqwest-backed client. The timeout is taken per request so configuration
/// replacement applies to the next dispatch.
#[derive(Clone, Debug)]
pub struct HttpEvaluationClient {
    client: reqwest::Client,
}

impl HttpEvaluationClient {
    pub fn new() -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| OrchestratorError::Transport(format!("http client: {err}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EvaluationClient for HttpEvaluationClient {
    async fn evaluate(
        &self,
        endpoint: &str,
        timeout: Duration,
        request: &EvaluateRequest,
    ) -> OrchestratorResult<()> {
        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|err| OrchestratorError::dispatch(&request.video_id, err.to_string()))?;
        response
            .error_for_status()
            .map_err(|err| OrchestratorError::dispatch(&request.video_id, err.to_string()))?;
        Ok(())
    }
}

/// Issues requests on spawned tasks and tracks which ones are still in
/// flight. Outcomes come back as [`Event::DispatchFinished`].
pub struct Dispatcher {
    client: Arc<dyn EvaluationClient>,
    tx: UnboundedSender<Event>,
    in_flight: HashSet<ItemId>,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn EvaluationClient>, tx: UnboundedSender<Event>) -> Self {
        Self {
            client,
            tx,
            in_flight: HashSet::new(),
        }
    }

    pub fn is_in_flight(&self, id: &ItemId) -> bool {
        self.in_flight.contains(id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Moves the item to Queued and sends its request. Returns `false` without
    /// doing anything unless the item is Unseen.
    pub fn request_evaluation(
        &mut self,
        id: &ItemId,
        registry: &mut ItemRegistry,
        config: &WardenConfig,
    ) -> bool {
        if registry.state(id) == Some(ItemState::Queued) {
            return false;
        }
        if let Err(err) = registry.mark_queued(id) {
            debug!(target: "feedwarden::dispatcher", item = %id, %err, "evaluation not requested");
            return false;
        }

        let request = EvaluateRequest {
            video_id: id.clone(),
            categories: config.active_categories(),
            custom_prompts: config.custom_prompts.clone(),
        };
        let endpoint = config.evaluate_endpoint();
        let timeout = config.timings.request_timeout();
        self.in_flight.insert(id.clone());
        metrics::record_dispatch("sent");
        debug!(target: "feedwarden::dispatcher", item = %id, %endpoint, "evaluation requested");

        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        let item = id.clone();
        tokio::spawn(async move {
            let outcome = client.evaluate(&endpoint, timeout, &request).await;
            let _ = tx.send(Event::DispatchFinished { item, outcome });
        });
        true
    }

    /// Returns `true` when a failure reverted the item to Unseen.
    pub fn on_finished(
        &mut self,
        id: &ItemId,
        outcome: OrchestratorResult<()>,
        registry: &mut ItemRegistry,
    ) -> bool {
        self.in_flight.remove(id);
        match outcome {
            Ok(()) => {
                metrics::record_dispatch("accepted");
                debug!(target: "feedwarden::dispatcher", item = %id, "evaluation accepted");
                false
            }
            Err(err) => {
                metrics::record_dispatch("failed");
                // A score that overtook the failure keeps the item Scored.
                let reverted = registry.revert_to_unseen(id);
                warn!(
                    target: "feedwarden::dispatcher",
                    item = %id,
                    %err,
                    retryable = err.is_retryable(),
                    reverted,
                    "evaluation request failed"
                );
                reverted
            }
        }
    }
}
