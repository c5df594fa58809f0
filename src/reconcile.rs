//! Reconciliation of the current document set against the registry.
//!
//! Split into a pure classification pass ([`classify`]) and a persistence
//! pass ([`persist`]) so the decision logic is unit-testable without
//! mocking time or I/O. [`reconcile`] runs both.
//!
//! Persistence semantics differ deliberately from the fetch layer: a failed
//! registry write or delete fails the whole run with a combined error
//! naming every failed identity. An inconsistent registry is worse than a
//! failed run that can be retried wholesale. There is no rollback — items
//! that succeeded stay persisted, and re-running with the same inputs is a
//! no-op for anything already written.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::PersistError;
use crate::events::{EventSink, SyncEvent};
use crate::models::{
    Document, ReconciliationResult, RecordStatus, RegistryRecord, SyncStats, WorkItem,
    WorkOperation,
};
use crate::traits::{Registry, WorkQueue};

/// Default registry write/delete batch size.
pub const DEFAULT_WRITE_BATCH: usize = 100;

/// Expected version token length: 40 hex characters (a content hash).
pub const VERSION_TOKEN_LEN: usize = 40;

/// Whether a token matches the expected fixed-length hexadecimal pattern.
pub fn is_version_token(token: &str) -> bool {
    token.len() == VERSION_TOKEN_LEN && hex::decode(token).is_ok()
}

/// Validation gate applied before classification. Invalid documents are
/// filtered, never thrown.
fn validate(document: &Document) -> Result<(), &'static str> {
    if document.identity.is_empty() {
        return Err("empty identity");
    }
    if !is_version_token(&document.version_token) {
        return Err("malformed version token");
    }
    if document.path.is_empty() {
        return Err("empty path");
    }
    if document.body.is_empty() {
        return Err("empty body");
    }
    Ok(())
}

/// Classify the current documents against the registry snapshot.
///
/// Pure and deterministic for a fixed `now`: dedup keeps the first
/// occurrence of an identity (a warning, never an error), the validation
/// gate drops invalid documents before anything is counted, and each
/// surviving document is classified as ADD, UPDATE, or no-op by comparing
/// version tokens. Snapshot entries absent from the current map become
/// DELETEs. `stats.scanned` counts the deduplicated map, not the raw input.
pub fn classify(
    current: &[Document],
    snapshot: &HashMap<String, RegistryRecord>,
    now: DateTime<Utc>,
    events: &dyn EventSink,
) -> ReconciliationResult {
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut deduped: Vec<&Document> = Vec::new();

    for document in current {
        if let Err(reason) = validate(document) {
            events.emit(SyncEvent::InvalidDocument {
                identity: document.identity.clone(),
                reason: reason.to_string(),
            });
            continue;
        }
        if let Some(kept_path) = seen.get(&document.identity) {
            events.emit(SyncEvent::DuplicateIdentity {
                identity: document.identity.clone(),
                kept_path: kept_path.clone(),
                dropped_path: document.path.clone(),
            });
            continue;
        }
        seen.insert(document.identity.clone(), document.path.clone());
        deduped.push(document);
    }

    let mut result = ReconciliationResult::default();
    for document in &deduped {
        let record = RegistryRecord {
            identity: document.identity.clone(),
            title: document.title.clone(),
            version_token: document.version_token.clone(),
            path: document.path.clone(),
            status: RecordStatus::Active,
            last_updated: now,
        };
        match snapshot.get(&document.identity) {
            None => result.to_add.push(record),
            Some(existing) if existing.version_token != document.version_token => {
                result.to_update.push(record)
            }
            Some(_) => {}
        }
    }

    let current_identities: HashSet<&String> = seen.keys().collect();
    result.to_delete = snapshot
        .keys()
        .filter(|identity| !current_identities.contains(identity))
        .cloned()
        .collect();
    result.to_delete.sort();

    result.stats = SyncStats {
        scanned: deduped.len(),
        added: result.to_add.len(),
        updated: result.to_update.len(),
        deleted: result.to_delete.len(),
    };
    result
}

/// Persist a classification: batched registry writes, work-queue entries
/// for every ADD/UPDATE, then batched deletes and their dequeues.
///
/// Any failed item fails the run via [`PersistError`]; later batches are
/// not attempted, successful items stay persisted.
pub async fn persist(
    result: &ReconciliationResult,
    registry: &dyn Registry,
    queue: &dyn WorkQueue,
    write_batch_size: usize,
    now: DateTime<Utc>,
) -> Result<()> {
    let write_batch_size = write_batch_size.max(1);

    let upserts: Vec<RegistryRecord> = result
        .to_add
        .iter()
        .cloned()
        .chain(result.to_update.iter().cloned())
        .collect();

    for batch in upserts.chunks(write_batch_size) {
        let outcomes = registry.put_many(batch).await?;
        let failed: Vec<String> = outcomes
            .into_iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.identity)
            .collect();
        if !failed.is_empty() {
            return Err(PersistError {
                operation: "write",
                identities: failed,
            }
            .into());
        }
    }

    let items: Vec<WorkItem> = result
        .to_add
        .iter()
        .map(|r| work_item(r, WorkOperation::Add, now))
        .chain(
            result
                .to_update
                .iter()
                .map(|r| work_item(r, WorkOperation::Update, now)),
        )
        .collect();
    if !items.is_empty() {
        queue.enqueue_many(&items).await?;
    }

    for batch in result.to_delete.chunks(write_batch_size) {
        let outcomes = registry.delete_many(batch).await?;
        let failed: Vec<String> = outcomes
            .into_iter()
            .filter(|o| o.error.is_some())
            .map(|o| o.identity)
            .collect();
        if !failed.is_empty() {
            return Err(PersistError {
                operation: "delete",
                identities: failed,
            }
            .into());
        }
    }
    for identity in &result.to_delete {
        queue.dequeue(identity).await?;
    }

    Ok(())
}

/// Classify and persist in one call.
pub async fn reconcile(
    current: &[Document],
    snapshot: &HashMap<String, RegistryRecord>,
    registry: &dyn Registry,
    queue: &dyn WorkQueue,
    write_batch_size: usize,
    events: &dyn EventSink,
) -> Result<ReconciliationResult> {
    let now = Utc::now();
    let result = classify(current, snapshot, now, events);
    persist(&result, registry, queue, write_batch_size, now).await?;
    Ok(result)
}

fn work_item(record: &RegistryRecord, operation: WorkOperation, now: DateTime<Utc>) -> WorkItem {
    WorkItem {
        id: Uuid::new_v4().to_string(),
        identity: record.identity.clone(),
        version_token: record.version_token.clone(),
        operation,
        retry_count: 0,
        created_at: now,
        last_error: None,
    }
}
