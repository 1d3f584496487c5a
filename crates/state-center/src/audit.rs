use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use feedwarden_core_types::ItemId;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::StoreError;
use crate::file::{read_json, write_json};

pub const AUDIT_CAPACITY: usize = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuditKind {
    VideoScored,
    VideoHidden,
    VideoWarningApplied,
    VideoMarkedNotInterested,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::VideoScored => "videoScored",
            AuditKind::VideoHidden => "videoHidden",
            AuditKind::VideoWarningApplied => "videoWarningApplied",
            AuditKind::VideoMarkedNotInterested => "videoMarkedNotInterested",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(rename = "type")]
    pub kind: AuditKind,
    #[serde(rename = "videoId")]
    pub item: ItemId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, item: ItemId) -> Self {
        Self {
            kind,
            item,
            score: None,
            categories: None,
            content_summary: None,
            evaluation_summary: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// Append-only diagnostic log. The orchestrator never reads it back for
/// decisions.
pub trait AuditSink: Send {
    fn append(&mut self, entry: AuditEntry) -> Result<(), StoreError>;
    /// Mirrors the `logActions` configuration flag; appends are dropped
    /// while disabled.
    fn set_enabled(&mut self, enabled: bool);
    /// Newest first.
    fn entries(&self) -> Vec<AuditEntry>;
}

#[derive(Debug)]
struct BoundedRing<T> {
    capacity: usize,
    data: VecDeque<T>,
}

impl<T> BoundedRing<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: VecDeque::new(),
        }
    }
}

impl<T: Clone> BoundedRing<T> {
    fn push(&mut self, item: T) {
        if self.data.len() == self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(item);
    }

    fn newest_first(&self) -> Vec<T> {
        self.data.iter().rev().cloned().collect()
    }

    fn clear(&mut self) {
        self.data.clear();
    }
}

#[derive(Debug)]
pub struct InMemoryAuditLog {
    ring: BoundedRing<AuditEntry>,
    enabled: bool,
}

impl InMemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: BoundedRing::new(capacity),
            enabled: true,
        }
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(AUDIT_CAPACITY)
    }
}

impl AuditSink for InMemoryAuditLog {
    fn append(&mut self, entry: AuditEntry) -> Result<(), StoreError> {
        if self.enabled {
            self.ring.push(entry);
        }
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.ring.newest_first()
    }
}

/// Audit log persisted as a newest-first JSON array.
#[derive(Debug)]
pub struct FileAuditLog {
    path: PathBuf,
    inner: InMemoryAuditLog,
}

impl FileAuditLog {
    pub const FILE_NAME: &'static str = "action_log.json";

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut inner = InMemoryAuditLog::default();
        if let Some(entries) = read_json::<Vec<AuditEntry>>(&path)? {
            for entry in entries.into_iter().rev() {
                inner.ring.push(entry);
            }
        }
        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.inner.ring.clear();
        write_json(&self.path, &Vec::<AuditEntry>::new())
    }
}

impl AuditSink for FileAuditLog {
    fn append(&mut self, entry: AuditEntry) -> Result<(), StoreError> {
        if !self.inner.enabled {
            return Ok(());
        }
        self.inner.ring.push(entry);
        if let Err(err) = write_json(&self.path, &self.inner.ring.newest_first()) {
            warn!(target: "feedwarden::audit", path = %self.path.display(), %err, "audit log write failed");
            return Err(err);
        }
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.inner.enabled = enabled;
    }

    fn entries(&self) -> Vec<AuditEntry> {
        self.inner.entries()
    }
}
