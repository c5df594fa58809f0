//! Change detection between two revisions of the source repository.
//!
//! Three modes, selected by the previous revision pointer:
//!
//! 1. **First run** (no previous revision) — enumerate the full tree at the
//!    current revision and return every eligible document as `added`.
//! 2. **No-op** (previous == current) — return an empty change set without
//!    touching the network or storage at all.
//! 3. **Incremental** — ask the source for a revision-to-revision diff and
//!    classify each eligible entry by its reported status.
//!
//! A rename is a removal of the old path's identity plus an addition of the
//! new path — never an in-place update, because identity is path-derived
//! and a rename changes it. The one exception is a move between directories
//! that keeps the file name: the identity is unchanged, so the entry is
//! classified as modified to keep the partition invariant intact.
//!
//! All content-requiring entries are fetched through the batch fetcher in a
//! single pass; entries whose fetch fails land in `ChangeSet::failed` and
//! in no other category.

use crate::events::EventSink;
use crate::fetch::{fetch_bodies, FetchDescriptor};
use crate::error::SourceError;
use crate::metadata;
use crate::models::{ChangeSet, DiffStatus, EntryKind};
use crate::traits::SourceRepository;

/// Destination list for an entry queued for content fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Destination {
    Added,
    Modified,
}

/// Compute the change set for the transition `previous_revision` →
/// `current_revision`.
pub async fn detect_changes(
    source: &dyn SourceRepository,
    current_revision: &str,
    previous_revision: Option<&str>,
    fetch_batch_size: usize,
    events: &dyn EventSink,
) -> Result<ChangeSet, SourceError> {
    match previous_revision {
        Some(previous) if previous == current_revision => Ok(ChangeSet::default()),
        None => full_tree(source, current_revision, fetch_batch_size, events).await,
        Some(previous) => {
            incremental(
                source,
                previous,
                current_revision,
                fetch_batch_size,
                events,
            )
            .await
        }
    }
}

/// First-run mode: every eligible document in the tree is an addition.
async fn full_tree(
    source: &dyn SourceRepository,
    revision: &str,
    fetch_batch_size: usize,
    events: &dyn EventSink,
) -> Result<ChangeSet, SourceError> {
    let entries = source.tree(revision, true).await?;

    let descriptors: Vec<FetchDescriptor> = entries
        .iter()
        .filter(|entry| entry.kind == EntryKind::Blob && metadata::is_eligible(&entry.path))
        .map(|entry| FetchDescriptor {
            path: entry.path.clone(),
            version_token: entry.version_token.clone(),
        })
        .collect();

    let mut outcome = fetch_bodies(source, &descriptors, fetch_batch_size, events).await;

    let mut changes = ChangeSet::default();
    for descriptor in &descriptors {
        let identity = metadata::identity_for(&descriptor.path);
        if let Some(body) = outcome.bodies.remove(&identity) {
            changes.added.push(metadata::extract(
                &descriptor.path,
                &body,
                &descriptor.version_token,
                events,
            ));
        }
    }
    changes.failed = outcome.failures.into_iter().map(|(id, _)| id).collect();
    Ok(changes)
}

/// Incremental mode: classify the source-reported diff entries.
async fn incremental(
    source: &dyn SourceRepository,
    previous_revision: &str,
    current_revision: &str,
    fetch_batch_size: usize,
    events: &dyn EventSink,
) -> Result<ChangeSet, SourceError> {
    let entries = source.diff(previous_revision, current_revision).await?;

    let mut changes = ChangeSet::default();
    let mut queued: Vec<(FetchDescriptor, Destination)> = Vec::new();

    for entry in entries {
        match entry.status {
            DiffStatus::Added => {
                if metadata::is_eligible(&entry.path) {
                    queued.push((descriptor_for(&entry.path, &entry.version_token), Destination::Added));
                }
            }
            DiffStatus::Modified => {
                if metadata::is_eligible(&entry.path) {
                    queued.push((
                        descriptor_for(&entry.path, &entry.version_token),
                        Destination::Modified,
                    ));
                }
            }
            DiffStatus::Removed => {
                if metadata::is_eligible(&entry.path) {
                    changes.removed.push(metadata::identity_for(&entry.path));
                }
            }
            DiffStatus::Renamed => {
                // Both sides must be eligible or the entry is dropped entirely.
                let Some(old_path) = entry.previous_path.as_deref() else {
                    continue;
                };
                if !metadata::is_eligible(old_path) || !metadata::is_eligible(&entry.path) {
                    continue;
                }
                let old_identity = metadata::identity_for(old_path);
                let new_identity = metadata::identity_for(&entry.path);
                if old_identity == new_identity {
                    // Directory move; identity unchanged.
                    queued.push((
                        descriptor_for(&entry.path, &entry.version_token),
                        Destination::Modified,
                    ));
                } else {
                    changes.removed.push(old_identity);
                    queued.push((descriptor_for(&entry.path, &entry.version_token), Destination::Added));
                }
            }
        }
    }

    // One batched pass over everything that needs content.
    let descriptors: Vec<FetchDescriptor> = queued.iter().map(|(d, _)| d.clone()).collect();
    let mut outcome = fetch_bodies(source, &descriptors, fetch_batch_size, events).await;

    for (descriptor, destination) in &queued {
        let identity = metadata::identity_for(&descriptor.path);
        let Some(body) = outcome.bodies.remove(&identity) else {
            continue;
        };
        let document = metadata::extract(&descriptor.path, &body, &descriptor.version_token, events);
        match destination {
            Destination::Added => changes.added.push(document),
            Destination::Modified => changes.modified.push(document),
        }
    }
    changes.failed = outcome.failures.into_iter().map(|(id, _)| id).collect();

    Ok(changes)
}

fn descriptor_for(path: &str, version_token: &str) -> FetchDescriptor {
    FetchDescriptor {
        path: path.to_string(),
        version_token: version_token.to_string(),
    }
}
