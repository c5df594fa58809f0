//! In-memory collaborator implementations.
//!
//! Used by unit and integration tests, and usable as lightweight backends
//! for embedding the engine without SQLite or a network source. State lives
//! in `HashMap`s behind `std::sync::RwLock`; the source records call counts
//! so tests can assert the no-call fast paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::SourceError;
use crate::models::{DiffEntry, EntryKind, RegistryRecord, TreeEntry, WorkItem};
use crate::traits::{ItemOutcome, ObjectStore, Registry, SourceRepository, WorkQueue};

/// Content-address a body the way the source would: 40 hex characters.
pub fn token_for(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())[..40].to_string()
}

/// Scripted in-memory [`SourceRepository`].
///
/// Tests register references, trees, diffs, and blobs up front, then assert
/// on the per-endpoint call counters afterwards.
#[derive(Default)]
pub struct MemorySource {
    refs: RwLock<HashMap<String, String>>,
    trees: RwLock<HashMap<String, Vec<TreeEntry>>>,
    diffs: RwLock<HashMap<(String, String), Vec<DiffEntry>>>,
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    failing: RwLock<HashSet<String>>,
    pub revision_calls: AtomicUsize,
    pub diff_calls: AtomicUsize,
    pub tree_calls: AtomicUsize,
    pub content_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point a symbolic reference at a revision.
    pub fn set_ref(&self, reference: &str, revision: &str) {
        self.refs
            .write()
            .unwrap()
            .insert(reference.to_string(), revision.to_string());
    }

    /// Store a blob and return its version token.
    pub fn insert_blob(&self, body: &str) -> String {
        let token = token_for(body);
        self.blobs
            .write()
            .unwrap()
            .insert(token.clone(), body.as_bytes().to_vec());
        token
    }

    /// Register a document in a revision's tree, returning its token.
    pub fn add_document(&self, revision: &str, path: &str, body: &str) -> String {
        let token = self.insert_blob(body);
        self.trees
            .write()
            .unwrap()
            .entry(revision.to_string())
            .or_default()
            .push(TreeEntry {
                path: path.to_string(),
                kind: EntryKind::Blob,
                version_token: token.clone(),
            });
        token
    }

    /// Register a non-document tree entry (a directory).
    pub fn add_tree_dir(&self, revision: &str, path: &str) {
        self.trees
            .write()
            .unwrap()
            .entry(revision.to_string())
            .or_default()
            .push(TreeEntry {
                path: path.to_string(),
                kind: EntryKind::Tree,
                version_token: String::new(),
            });
    }

    /// Script the diff between two revisions.
    pub fn set_diff(&self, from: &str, to: &str, entries: Vec<DiffEntry>) {
        self.diffs
            .write()
            .unwrap()
            .insert((from.to_string(), to.to_string()), entries);
    }

    /// Make every fetch of `token` fail as transient.
    pub fn fail_token(&self, token: &str) {
        self.failing.write().unwrap().insert(token.to_string());
    }

    /// Stop failing fetches of `token`.
    pub fn heal_token(&self, token: &str) {
        self.failing.write().unwrap().remove(token);
    }
}

#[async_trait]
impl SourceRepository for MemorySource {
    async fn latest_revision(&self, reference: &str) -> Result<String, SourceError> {
        self.revision_calls.fetch_add(1, Ordering::SeqCst);
        self.refs
            .read()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("reference {}", reference)))
    }

    async fn diff(&self, from: &str, to: &str) -> Result<Vec<DiffEntry>, SourceError> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        self.diffs
            .read()
            .unwrap()
            .get(&(from.to_string(), to.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("diff {}..{}", from, to)))
    }

    async fn tree(&self, revision: &str, _recursive: bool) -> Result<Vec<TreeEntry>, SourceError> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        self.trees
            .read()
            .unwrap()
            .get(revision)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("revision {}", revision)))
    }

    async fn content(&self, version_token: &str) -> Result<Vec<u8>, SourceError> {
        self.content_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().unwrap().contains(version_token) {
            return Err(SourceError::Transient(format!(
                "scripted failure for {}",
                version_token
            )));
        }
        self.blobs
            .read()
            .unwrap()
            .get(version_token)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("blob {}", version_token)))
    }
}

/// In-memory [`Registry`] with scriptable per-identity write failures.
#[derive(Default)]
pub struct MemoryRegistry {
    records: RwLock<HashMap<String, RegistryRecord>>,
    revision: RwLock<Option<String>>,
    fail_identities: RwLock<HashSet<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes and deletes for `identity` fail.
    pub fn fail_identity(&self, identity: &str) {
        self.fail_identities
            .write()
            .unwrap()
            .insert(identity.to_string());
    }

    /// Direct read access for assertions.
    pub fn record(&self, identity: &str) -> Option<RegistryRecord> {
        self.records.read().unwrap().get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn snapshot(&self) -> Result<HashMap<String, RegistryRecord>> {
        Ok(self.records.read().unwrap().clone())
    }

    async fn put_many(&self, records: &[RegistryRecord]) -> Result<Vec<ItemOutcome>> {
        let failing = self.fail_identities.read().unwrap().clone();
        let mut stored = self.records.write().unwrap();
        Ok(records
            .iter()
            .map(|record| {
                if failing.contains(&record.identity) {
                    ItemOutcome::failed(&record.identity, "scripted write failure")
                } else {
                    stored.insert(record.identity.clone(), record.clone());
                    ItemOutcome::ok(&record.identity)
                }
            })
            .collect())
    }

    async fn delete_many(&self, identities: &[String]) -> Result<Vec<ItemOutcome>> {
        let failing = self.fail_identities.read().unwrap().clone();
        let mut stored = self.records.write().unwrap();
        Ok(identities
            .iter()
            .map(|identity| {
                if failing.contains(identity) {
                    ItemOutcome::failed(identity, "scripted delete failure")
                } else {
                    stored.remove(identity);
                    ItemOutcome::ok(identity)
                }
            })
            .collect())
    }

    async fn last_revision(&self) -> Result<Option<String>> {
        Ok(self.revision.read().unwrap().clone())
    }

    async fn set_last_revision(&self, revision: &str) -> Result<()> {
        *self.revision.write().unwrap() = Some(revision.to_string());
        Ok(())
    }
}

/// In-memory [`WorkQueue`], one pending item per identity.
#[derive(Default)]
pub struct MemoryQueue {
    items: RwLock<HashMap<String, WorkItem>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> Vec<WorkItem> {
        self.items.read().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue_many(&self, items: &[WorkItem]) -> Result<()> {
        let mut stored = self.items.write().unwrap();
        for item in items {
            stored.insert(item.identity.clone(), item.clone());
        }
        Ok(())
    }

    async fn dequeue(&self, identity: &str) -> Result<()> {
        self.items.write().unwrap().remove(identity);
        Ok(())
    }
}

/// In-memory [`ObjectStore`] sink.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn body(&self, identity: &str) -> Option<String> {
        self.objects.read().unwrap().get(identity).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, identity: &str, body: &str) -> Result<()> {
        self.objects
            .write()
            .unwrap()
            .insert(identity.to_string(), body.to_string());
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        self.objects.write().unwrap().remove(identity);
        Ok(())
    }
}
