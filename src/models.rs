//! Core data models for the change-detection and reconciliation pipeline.
//!
//! These types represent the documents, registry records, and change sets
//! that flow between the tracker, the reconciler, and the collaborators.

use chrono::{DateTime, Utc};

/// A policy document materialized from the source repository.
///
/// Value type, copied freely; immutable once constructed by the metadata
/// extractor. The `identity` is the primary key for every downstream
/// operation and is unique within one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Stable key derived from the path.
    pub identity: String,
    /// Human-readable label derived from the body, falling back to `identity`.
    pub title: String,
    /// Full textual content. Opaque to the pipeline.
    pub body: String,
    /// Content-addressed version marker assigned by the source. Used only
    /// to detect change, never interpreted or ordered.
    pub version_token: String,
    /// Original location in the source repository. Informational.
    pub path: String,
}

/// Lifecycle status of a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Active,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
        }
    }
}

/// Persisted representation of a document; exactly one record per identity.
///
/// Absence from the registry means "not currently tracked". Created on ADD,
/// fully replaced on UPDATE, removed on DELETE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRecord {
    pub identity: String,
    pub title: String,
    pub version_token: String,
    pub path: String,
    pub status: RecordStatus,
    pub last_updated: DateTime<Utc>,
}

/// The added/modified/removed partition produced for one revision transition.
///
/// An identity appears in at most one of the lists. `removed` carries
/// identities only — content is never fetched for removed entries. `failed`
/// holds identities whose content fetch failed; they appear in no other
/// category and are retried on the next run.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<Document>,
    pub modified: Vec<Document>,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

impl ChangeSet {
    /// True when the transition produced no work at all.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.modified.is_empty()
            && self.removed.is_empty()
            && self.failed.is_empty()
    }
}

/// Counters for one reconciliation run, always consistent with the
/// classification lists they describe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Size of the deduplicated, validated current map (not the raw input).
    pub scanned: usize,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
}

/// Output of the reconciler's classification pass.
///
/// Computed fresh on every run and never persisted itself.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationResult {
    pub to_add: Vec<RegistryRecord>,
    pub to_update: Vec<RegistryRecord>,
    pub to_delete: Vec<String>,
    pub stats: SyncStats,
}

/// Operation recorded on a work-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOperation {
    Add,
    Update,
}

impl WorkOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOperation::Add => "add",
            WorkOperation::Update => "update",
        }
    }
}

/// Downstream queue entry, one per added or updated record.
///
/// Consumed and deleted by an external processing pipeline. Delivery is
/// at-least-once; `identity` is the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub identity: String,
    pub version_token: String,
    pub operation: WorkOperation,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Status reported by the source for one diff entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

/// One entry of a revision-to-revision diff reported by the source.
#[derive(Debug, Clone)]
pub struct DiffEntry {
    pub path: String,
    pub status: DiffStatus,
    pub version_token: String,
    /// Old path for `Renamed` entries.
    pub previous_path: Option<String>,
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
}

/// One entry of a recursive tree listing at a revision.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
    pub version_token: String,
}

/// Marker recording which revision the registry last caught up to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMetadata {
    pub revision: String,
    pub updated_at: DateTime<Utc>,
}
