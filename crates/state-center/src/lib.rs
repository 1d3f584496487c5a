//! Externally persisted state the orchestrator consults but does not own:
//! the marker sets that make policy actions idempotent across restarts, and
//! the capped diagnostic audit log.

pub mod audit;
pub mod errors;
mod file;
pub mod markers;

pub use audit::{AuditEntry, AuditKind, AuditSink, FileAuditLog, InMemoryAuditLog, AUDIT_CAPACITY};
pub use errors::StoreError;
pub use markers::{FileMarkerSet, InMemoryMarkerSet, MarkerSets, MarkerStore};
