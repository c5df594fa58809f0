//! Collaborator seams for the reconciliation engine.
//!
//! The engine is a library invoked by an external scheduler; everything it
//! talks to — the remote source of truth, the key-value registry, the work
//! queue, and the downstream object store — is reached through the traits
//! in this module. Concrete implementations live in [`source_github`]
//! (GitHub REST), [`store`] (SQLite + filesystem), and [`memory`]
//! (in-memory, for tests).
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────────┐
//! │ SourceRepo   │──▶│  Tracker /  │──▶│ Registry + Queue  │
//! │ (GitHub/mem) │   │  Reconciler │   │ (SQLite/mem)      │
//! └──────────────┘   └──────┬──────┘   └───────────────────┘
//!                           ▼
//!                    ┌──────────────┐
//!                    │ ObjectStore  │
//!                    │ (fs/mem sink)│
//!                    └──────────────┘
//! ```
//!
//! [`source_github`]: crate::source_github
//! [`store`]: crate::store
//! [`memory`]: crate::memory

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::SourceError;
use crate::models::{DiffEntry, RegistryRecord, TreeEntry, WorkItem};

/// Remote source-of-truth repository holding versioned policy documents.
///
/// Implementations own their wire protocol, authentication, timeouts, and
/// retries; the engine only requires that calls eventually resolve and that
/// failures are classified by [`SourceError`].
#[async_trait]
pub trait SourceRepository: Send + Sync {
    /// Resolve a symbolic reference (e.g. a branch name) to a revision id.
    async fn latest_revision(&self, reference: &str) -> Result<String, SourceError>;

    /// List the changes between two revisions.
    async fn diff(&self, from: &str, to: &str) -> Result<Vec<DiffEntry>, SourceError>;

    /// Enumerate the document tree at a revision.
    async fn tree(&self, revision: &str, recursive: bool) -> Result<Vec<TreeEntry>, SourceError>;

    /// Fetch the raw content addressed by a version token.
    async fn content(&self, version_token: &str) -> Result<Vec<u8>, SourceError>;
}

/// Per-item outcome of a batched registry write or delete.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub identity: String,
    /// `None` on success.
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn ok(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            error: None,
        }
    }

    pub fn failed(identity: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            error: Some(error.into()),
        }
    }
}

/// Key-value system of record, one entry per identity.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Load the full last-known snapshot, keyed by identity.
    async fn snapshot(&self) -> Result<HashMap<String, RegistryRecord>>;

    /// Write records; returns one outcome per input, in input order.
    async fn put_many(&self, records: &[RegistryRecord]) -> Result<Vec<ItemOutcome>>;

    /// Delete records by identity; returns one outcome per input, in input order.
    async fn delete_many(&self, identities: &[String]) -> Result<Vec<ItemOutcome>>;

    /// Revision the registry last caught up to, if any run has completed.
    async fn last_revision(&self) -> Result<Option<String>>;

    /// Record the revision a successful run caught up to.
    async fn set_last_revision(&self, revision: &str) -> Result<()>;
}

/// Downstream notification queue for added/updated records.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue items, upserting on identity (at-least-once delivery).
    async fn enqueue_many(&self, items: &[WorkItem]) -> Result<()>;

    /// Drop the pending item for an identity, if present.
    async fn dequeue(&self, identity: &str) -> Result<()>;
}

/// Pure sink receiving final document bodies keyed by identity.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, identity: &str, body: &str) -> Result<()>;

    async fn delete(&self, identity: &str) -> Result<()>;
}
