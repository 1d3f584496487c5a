//! FeedWarden library
//!
//! Discovers items in a feed view, requests remote evaluations, reconciles
//! pushed scores back onto whichever card shows the item, and applies the
//! configured hide / warn / not-interested policies.

pub mod actions;
pub mod connection;
pub mod discovery;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod harness;
pub mod metrics;
pub mod orchestrator;
pub mod protocol;
pub mod reconciler;
pub mod render;
pub mod timer;
pub mod view;

pub use connection::{ConnectionState, PushConnector, WsConnector};
pub use dispatcher::{EvaluationClient, HttpEvaluationClient};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{Orchestrator, OrchestratorHandle, RunSummary, Services};
pub use view::{FeedDocument, HostView, SharedDocument};
