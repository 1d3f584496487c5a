use std::net::SocketAddr;
use std::string::FromUtf8Error;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use feedwarden_registry::metrics as registry_metrics;
use lazy_static::lazy_static;
use once_cell::sync::{Lazy, OnceCell};
use prometheus::{
    core::Collector, opts, Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
    TEXT_FORMAT,
};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);
static REGISTER_ONCE: OnceCell<()> = OnceCell::new();

lazy_static! {
    static ref DISCOVERY_SCANS_TOTAL: IntCounter = IntCounter::new(
        "feedwarden_discovery_scans_total",
        "Discovery passes over the host view"
    )
    .unwrap();
    static ref DISCOVERED_ITEMS_TOTAL: IntCounter = IntCounter::new(
        "feedwarden_discovered_items_total",
        "Items reported by discovery as needing work"
    )
    .unwrap();
    static ref DISPATCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("feedwarden_dispatches_total", "Evaluation requests grouped by outcome"),
        &["outcome"]
    )
    .unwrap();
    static ref PUSH_MESSAGES_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("feedwarden_push_messages_total", "Push channel messages grouped by kind"),
        &["kind"]
    )
    .unwrap();
    static ref RECONNECTS_TOTAL: IntCounter = IntCounter::new(
        "feedwarden_reconnects_total",
        "Push channel reconnect attempts"
    )
    .unwrap();
    static ref CONNECTION_OPEN: IntGauge = IntGauge::new(
        "feedwarden_connection_open",
        "1 while the push channel is open"
    )
    .unwrap();
    static ref POLICY_ACTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("feedwarden_policy_actions_total", "Policy actions grouped by action"),
        &["action"]
    )
    .unwrap();
}

fn register<C>(registry: &Registry, collector: C)
where
    C: Collector + Clone + Send + Sync + 'static,
{
    if let Err(err) = registry.register(Box::new(collector.clone())) {
        if !matches!(err, prometheus::Error::AlreadyReg) {
            error!(?err, "failed to register orchestrator metric");
        }
    }
}

pub fn register_metrics() {
    REGISTER_ONCE.get_or_init(|| {
        let registry = global_registry();
        registry_metrics::register_metrics(registry);
        register(registry, DISCOVERY_SCANS_TOTAL.clone());
        register(registry, DISCOVERED_ITEMS_TOTAL.clone());
        register(registry, DISPATCHES_TOTAL.clone());
        register(registry, PUSH_MESSAGES_TOTAL.clone());
        register(registry, RECONNECTS_TOTAL.clone());
        register(registry, CONNECTION_OPEN.clone());
        register(registry, POLICY_ACTIONS_TOTAL.clone());
    });
}

pub fn record_scan(pending: usize) {
    DISCOVERY_SCANS_TOTAL.inc();
    DISCOVERED_ITEMS_TOTAL.inc_by(pending as u64);
}

pub fn record_dispatch(outcome: &str) {
    DISPATCHES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_push_message(kind: &str) {
    PUSH_MESSAGES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_reconnect() {
    RECONNECTS_TOTAL.inc();
}

pub fn set_connection_open(open: bool) {
    CONNECTION_OPEN.set(i64::from(open));
}

pub fn record_policy_action(action: &str) {
    POLICY_ACTIONS_TOTAL.with_label_values(&[action]).inc();
}

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
    #[error("metrics output is not UTF-8")]
    Utf8(#[from] FromUtf8Error),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        warn!(target: "feedwarden::metrics", err = %self, "scrape failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Prometheus text exposition of everything in `registry`.
pub fn encode_text(registry: &Registry) -> Result<String, MetricsError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

async fn scrape() -> Result<impl IntoResponse, MetricsError> {
    let body = encode_text(global_registry())?;
    Ok(([(header::CONTENT_TYPE, TEXT_FORMAT)], body))
}

pub fn router() -> Router {
    register_metrics();
    Router::new().route("/metrics", get(scrape))
}

/// `/metrics` endpoint served until its token is cancelled.
pub struct MetricsEndpoint {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MetricsEndpoint {
    /// Port 0 disables the endpoint.
    pub async fn start(port: u16, cancel: CancellationToken) -> Result<Option<Self>, MetricsError> {
        if port == 0 {
            return Ok(None);
        }
        Self::bind(([127, 0, 0, 1], port).into(), cancel).await.map(Some)
    }

    pub async fn bind(addr: SocketAddr, cancel: CancellationToken) -> Result<Self, MetricsError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| MetricsError::Bind { addr, source })?;
        let addr = listener
            .local_addr()
            .map_err(|source| MetricsError::Bind { addr, source })?;
        info!(target: "feedwarden::metrics", %addr, "serving /metrics");

        let shutdown = cancel.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(err) = served {
                warn!(target: "feedwarden::metrics", %err, "metrics endpoint stopped");
            }
        });
        Ok(Self { addr, cancel, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(target: "feedwarden::metrics", %err, "metrics endpoint task failed");
        }
    }
}

pub fn global_registry() -> &'static Registry {
    &GLOBAL_REGISTRY
}
