//! Scripted feed driver for a [`FeedDocument`].
//!
//! A script is a YAML list of page changes (cards appearing, recycling,
//! navigation, scrolling, summary clicks) that is played against a shared
//! document while the orchestrator loop runs on its own task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::orchestrator::{Orchestrator, OrchestratorHandle, RunSummary};
use crate::view::{Badge, CardSpec, FeedDocument, HostEvent, HostView, Point, SharedDocument};

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid script: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("no card with key `{0}`")]
    UnknownCard(String),
    #[error("orchestrator task failed: {0}")]
    Loop(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedScript {
    /// Initial page location.
    #[serde(default)]
    pub location: Option<String>,
    /// Time to keep the loop running after the last step, in milliseconds.
    #[serde(default)]
    pub linger_ms: u64,
    /// Written as `- insert_video: abc` maps rather than YAML `!tags`.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Insert(CardSpec),
    /// Shorthand for a default watch card.
    InsertVideo(String),
    Remove(String),
    Recycle {
        key: String,
        card: CardSpec,
    },
    Navigate {
        url: String,
        #[serde(default)]
        clear: bool,
    },
    Scroll {
        x: f64,
        y: f64,
    },
    ClickSummary(String),
    ClickOutside,
    WaitMs(u64),
}

impl FeedScript {
    pub fn parse(text: &str) -> Result<Self, HarnessError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let text = std::fs::read_to_string(path).map_err(|source| HarnessError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CardReport {
    pub key: Option<String>,
    pub badge: Option<String>,
    pub tier: Option<String>,
    pub classes: Vec<String>,
    pub selected_options: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct HarnessReport {
    pub steps: usize,
    pub summary: RunSummary,
    pub cards: Vec<CardReport>,
}

/// Applies script steps to a document and forwards what the orchestrator
/// needs to hear about.
pub struct FeedHarness {
    document: SharedDocument,
    handle: OrchestratorHandle,
}

impl FeedHarness {
    /// Routes the document's structural changes into the loop.
    pub fn attach(document: SharedDocument, handle: OrchestratorHandle) -> Self {
        let sink = handle.clone();
        document.lock().observe(move |mutation| {
            sink.view_mutated(mutation.added, mutation.removed);
        });
        Self { document, handle }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    /// Applies one step. Returns how long the script wants to wait.
    pub fn apply(&self, step: &Step) -> Result<Option<Duration>, HarnessError> {
        match step {
            Step::Insert(spec) => {
                self.document.lock().push_card(spec.clone());
            }
            Step::InsertVideo(id) => {
                self.document.lock().push_card(CardSpec::video(id));
            }
            Step::Remove(key) => {
                let mut doc = self.document.lock();
                let handle = find(&doc, key)?;
                doc.remove_card(handle);
            }
            Step::Recycle { key, card } => {
                let mut doc = self.document.lock();
                let handle = find(&doc, key)?;
                doc.recycle_card(handle, card.clone());
            }
            Step::Navigate { url, clear } => {
                let mut doc = self.document.lock();
                doc.set_location(url.clone());
                if *clear {
                    doc.clear();
                }
            }
            Step::Scroll { x, y } => {
                self.document.lock().set_scroll(Point { x: *x, y: *y });
                self.handle.host(HostEvent::Scrolled { x: *x, y: *y });
            }
            Step::ClickSummary(key) => {
                let handle = find(&self.document.lock(), key)?;
                self.handle.host(HostEvent::SummaryActivated { handle });
            }
            Step::ClickOutside => {
                self.handle.host(HostEvent::PointerDown {
                    inside_overlay: false,
                });
            }
            Step::WaitMs(ms) => return Ok(Some(Duration::from_millis(*ms))),
        }
        Ok(None)
    }

    pub async fn play(&self, script: &FeedScript) -> Result<usize, HarnessError> {
        for (idx, step) in script.steps.iter().enumerate() {
            debug!(target: "feedwarden::harness", step = idx, ?step, "applying");
            if let Some(wait) = self.apply(step)? {
                tokio::time::sleep(wait).await;
            }
        }
        Ok(script.steps.len())
    }

    pub fn cards(&self) -> Vec<CardReport> {
        let doc = self.document.lock();
        doc.cards()
            .into_iter()
            .map(|handle| {
                let badge: Option<Badge> = doc.badge(handle);
                CardReport {
                    key: doc.find_key(handle),
                    badge: badge.as_ref().map(|b| b.label.clone()),
                    tier: badge.map(|b| b.class.to_string()),
                    classes: doc.classes(handle),
                    selected_options: doc.selected_options(handle),
                }
            })
            .collect()
    }
}

fn find(doc: &FeedDocument, key: &str) -> Result<feedwarden_core_types::ViewHandle, HarnessError> {
    doc.find_card(key)
        .ok_or_else(|| HarnessError::UnknownCard(key.to_string()))
}

/// Plays `script` against an orchestrator built around `document`, then shuts
/// the loop down and reports the final page.
pub async fn run_script(
    orchestrator: Orchestrator<SharedDocument>,
    document: SharedDocument,
    script: &FeedScript,
) -> Result<HarnessReport, HarnessError> {
    if let Some(location) = &script.location {
        document.lock().set_location(location.clone());
    }
    let harness = FeedHarness::attach(document, orchestrator.handle());
    let handle = orchestrator.handle();
    let mut orchestrator = orchestrator;
    let task = tokio::spawn(async move { orchestrator.run().await });

    let played = harness.play(script).await;
    if script.linger_ms > 0 {
        tokio::time::sleep(Duration::from_millis(script.linger_ms)).await;
    }
    handle.shutdown();
    let summary = task
        .await
        .map_err(|err| HarnessError::Loop(err.to_string()))?
        .map_err(|err| HarnessError::Loop(err.to_string()))?;
    let steps = played?;
    info!(target: "feedwarden::harness", steps, scored = summary.scored, "script finished");
    Ok(HarnessReport {
        steps,
        summary,
        cards: harness.cards(),
    })
}
