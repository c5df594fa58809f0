//! One reconciliation run end to end.
//!
//! Wires the tracker, the batch fetcher/extractor, and the reconciler
//! against injected collaborators: resolve the current revision, detect
//! changes since the stored pointer, reconcile against the registry
//! snapshot, push bodies to the object store, and finally advance the
//! pointer.
//!
//! The pointer only advances when the change set carried no fetch
//! failures; otherwise the next run re-diffs the same transition and
//! retries the stragglers. Reconciliation is idempotent, so re-processing
//! the successful remainder is a no-op. On any hard failure the pointer is
//! left untouched.
//!
//! Runs are not re-entrant; the calling scheduler serializes invocations.
//! A caller that wants to cancel simply abandons the future and re-invokes
//! later — no partial run state lives outside the registry and the object
//! store.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;

use crate::events::EventSink;
use crate::models::{ChangeSet, Document, RegistryRecord, SyncStats};
use crate::reconcile::{classify, reconcile};
use crate::tracker::detect_changes;
use crate::traits::{ObjectStore, Registry, SourceRepository, WorkQueue};

/// Options for one run.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Symbolic reference to sync (e.g. a branch name).
    pub reference: String,
    /// Ignore the stored pointer and re-enumerate the full tree.
    pub full: bool,
    /// Classify and report without writing anything.
    pub dry_run: bool,
    pub fetch_batch_size: usize,
    pub write_batch_size: usize,
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Revision the run reconciled towards.
    pub revision: String,
    /// Pointer the run started from.
    pub previous: Option<String>,
    pub stats: SyncStats,
    /// Identities whose content fetch failed.
    pub failed: Vec<String>,
    /// Whether the stored pointer moved to `revision`.
    pub advanced: bool,
    /// Whether the run short-circuited with nothing to do.
    pub no_op: bool,
}

pub async fn run_sync(
    source: &dyn SourceRepository,
    registry: &dyn Registry,
    queue: &dyn WorkQueue,
    objects: &dyn ObjectStore,
    options: &SyncOptions,
    events: &dyn EventSink,
) -> Result<SyncOutcome> {
    let revision = source.latest_revision(&options.reference).await?;
    let previous = if options.full {
        None
    } else {
        registry.last_revision().await?
    };

    if previous.as_deref() == Some(revision.as_str()) {
        return Ok(SyncOutcome {
            revision,
            previous,
            stats: SyncStats::default(),
            failed: Vec::new(),
            advanced: false,
            no_op: true,
        });
    }

    let changes = detect_changes(
        source,
        &revision,
        previous.as_deref(),
        options.fetch_batch_size,
        events,
    )
    .await?;

    let snapshot = registry.snapshot().await?;
    let (current, scoped) = reconciler_input(&changes, snapshot, previous.is_some());

    if options.dry_run {
        let result = classify(&current, &scoped, Utc::now(), events);
        return Ok(SyncOutcome {
            revision,
            previous,
            stats: result.stats,
            failed: changes.failed.clone(),
            advanced: false,
            no_op: false,
        });
    }

    let bodies: HashMap<&str, &str> = current
        .iter()
        .map(|d| (d.identity.as_str(), d.body.as_str()))
        .collect();

    let result = reconcile(
        &current,
        &scoped,
        registry,
        queue,
        options.write_batch_size,
        events,
    )
    .await?;

    for record in result.to_add.iter().chain(result.to_update.iter()) {
        if let Some(body) = bodies.get(record.identity.as_str()) {
            objects.put(&record.identity, body).await?;
        }
    }
    for identity in &result.to_delete {
        objects.delete(identity).await?;
    }

    let advanced = changes.failed.is_empty();
    if advanced {
        registry.set_last_revision(&revision).await?;
    }

    Ok(SyncOutcome {
        revision,
        previous,
        stats: result.stats,
        failed: changes.failed,
        advanced,
        no_op: false,
    })
}

/// Build the reconciler's `(current documents, snapshot)` input.
///
/// On first/full runs the change set holds the whole tree, so the full
/// snapshot is compared. On incremental runs the snapshot is restricted to
/// identities the change set names — anything the transition did not touch
/// must not be classified, and failed fetches stay out so they are neither
/// updated nor deleted.
fn reconciler_input(
    changes: &ChangeSet,
    snapshot: HashMap<String, RegistryRecord>,
    incremental: bool,
) -> (Vec<Document>, HashMap<String, RegistryRecord>) {
    let mut current: Vec<Document> = changes.added.clone();
    current.extend(changes.modified.iter().cloned());

    if !incremental {
        return (current, snapshot);
    }

    let mut touched: HashSet<&str> = current.iter().map(|d| d.identity.as_str()).collect();
    touched.extend(changes.removed.iter().map(String::as_str));

    let scoped = snapshot
        .into_iter()
        .filter(|(identity, _)| touched.contains(identity.as_str()))
        .collect();
    (current, scoped)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::events::BufferSink;
    use crate::memory::{MemoryObjectStore, MemoryQueue, MemoryRegistry, MemorySource};
    use crate::models::{DiffEntry, DiffStatus};

    fn options() -> SyncOptions {
        SyncOptions {
            reference: "main".to_string(),
            full: false,
            dry_run: false,
            fetch_batch_size: 40,
            write_batch_size: 100,
        }
    }

    struct Fixture {
        source: MemorySource,
        registry: MemoryRegistry,
        queue: MemoryQueue,
        objects: MemoryObjectStore,
        events: BufferSink,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                source: MemorySource::new(),
                registry: MemoryRegistry::new(),
                queue: MemoryQueue::new(),
                objects: MemoryObjectStore::new(),
                events: BufferSink::new(),
            }
        }

        async fn run(&self, options: &SyncOptions) -> SyncOutcome {
            run_sync(
                &self.source,
                &self.registry,
                &self.queue,
                &self.objects,
                options,
                &self.events,
            )
            .await
            .unwrap()
        }
    }

    #[tokio::test]
    async fn first_run_then_incremental_then_noop() {
        let fx = Fixture::new();
        fx.source.set_ref("main", "rev1");
        fx.source.add_document("rev1", "policies/aml.md", "# AML\nv1");
        fx.source.add_document("rev1", "policies/kyc.md", "# KYC\nv1");

        let outcome = fx.run(&options()).await;
        assert!(!outcome.no_op);
        assert_eq!(outcome.stats.added, 2);
        assert!(outcome.advanced);
        assert_eq!(fx.registry.len(), 2);
        assert_eq!(fx.objects.body("aml").unwrap(), "# AML\nv1");
        assert_eq!(fx.queue.pending().len(), 2);

        // Incremental: one modified, one removed.
        fx.source.set_ref("main", "rev2");
        let token = fx.source.insert_blob("# AML\nv2");
        fx.source.set_diff(
            "rev1",
            "rev2",
            vec![
                DiffEntry {
                    path: "policies/aml.md".to_string(),
                    status: DiffStatus::Modified,
                    version_token: token,
                    previous_path: None,
                },
                DiffEntry {
                    path: "policies/kyc.md".to_string(),
                    status: DiffStatus::Removed,
                    version_token: String::new(),
                    previous_path: None,
                },
            ],
        );

        let outcome = fx.run(&options()).await;
        assert_eq!(outcome.stats.updated, 1);
        assert_eq!(outcome.stats.deleted, 1);
        assert!(outcome.advanced);
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(fx.objects.body("aml").unwrap(), "# AML\nv2");
        assert!(fx.objects.body("kyc").is_none());
        assert!(fx.registry.record("kyc").is_none());

        // No-op: pointer already at rev2, no tree or diff call.
        let trees_before = fx.source.tree_calls.load(Ordering::SeqCst);
        let diffs_before = fx.source.diff_calls.load(Ordering::SeqCst);
        let outcome = fx.run(&options()).await;
        assert!(outcome.no_op);
        assert_eq!(fx.source.tree_calls.load(Ordering::SeqCst), trees_before);
        assert_eq!(fx.source.diff_calls.load(Ordering::SeqCst), diffs_before);
    }

    #[tokio::test]
    async fn incremental_leaves_untouched_records_alone() {
        let fx = Fixture::new();
        fx.source.set_ref("main", "rev1");
        fx.source
            .add_document("rev1", "policies/stable.md", "# Stable\n");
        fx.source.add_document("rev1", "policies/aml.md", "# AML\nv1");
        fx.run(&options()).await;

        fx.source.set_ref("main", "rev2");
        let token = fx.source.insert_blob("# AML\nv2");
        fx.source.set_diff(
            "rev1",
            "rev2",
            vec![DiffEntry {
                path: "policies/aml.md".to_string(),
                status: DiffStatus::Modified,
                version_token: token,
                previous_path: None,
            }],
        );

        let before = fx.registry.record("stable").unwrap();
        let outcome = fx.run(&options()).await;
        assert_eq!(outcome.stats.updated, 1);
        assert_eq!(outcome.stats.deleted, 0);
        assert_eq!(fx.registry.record("stable").unwrap(), before);
    }

    #[tokio::test]
    async fn fetch_failure_holds_the_pointer_until_healed() {
        let fx = Fixture::new();
        fx.source.set_ref("main", "rev1");
        fx.source.add_document("rev1", "policies/good.md", "# Good\n");
        fx.run(&options()).await;

        fx.source.set_ref("main", "rev2");
        let flaky = fx.source.insert_blob("# Flaky\n");
        fx.source.fail_token(&flaky);
        fx.source.set_diff(
            "rev1",
            "rev2",
            vec![DiffEntry {
                path: "policies/flaky.md".to_string(),
                status: DiffStatus::Added,
                version_token: flaky.clone(),
                previous_path: None,
            }],
        );

        let outcome = fx.run(&options()).await;
        assert!(!outcome.advanced);
        assert_eq!(outcome.failed, vec!["flaky".to_string()]);
        assert_eq!(
            fx.registry.last_revision().await.unwrap(),
            Some("rev1".to_string())
        );

        // The next run retries the same transition and advances.
        fx.source.heal_token(&flaky);
        let outcome = fx.run(&options()).await;
        assert!(outcome.advanced);
        assert_eq!(outcome.stats.added, 1);
        assert_eq!(
            fx.registry.last_revision().await.unwrap(),
            Some("rev2".to_string())
        );
        assert_eq!(fx.objects.body("flaky").unwrap(), "# Flaky\n");
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let fx = Fixture::new();
        fx.source.set_ref("main", "rev1");
        fx.source.add_document("rev1", "policies/aml.md", "# AML\n");

        let outcome = fx
            .run(&SyncOptions {
                dry_run: true,
                ..options()
            })
            .await;

        assert_eq!(outcome.stats.added, 1);
        assert!(!outcome.advanced);
        assert!(fx.registry.is_empty());
        assert_eq!(fx.objects.len(), 0);
        assert!(fx.queue.pending().is_empty());
        assert_eq!(fx.registry.last_revision().await.unwrap(), None);
    }

    #[tokio::test]
    async fn full_run_ignores_the_stored_pointer() {
        let fx = Fixture::new();
        fx.source.set_ref("main", "rev1");
        fx.source.add_document("rev1", "policies/aml.md", "# AML\n");
        fx.run(&options()).await;

        // Pointer is at rev1; a plain run is a no-op, a full run re-enumerates.
        let outcome = fx.run(&options()).await;
        assert!(outcome.no_op);

        let outcome = fx
            .run(&SyncOptions {
                full: true,
                ..options()
            })
            .await;
        assert!(!outcome.no_op);
        assert_eq!(outcome.stats.scanned, 1);
        assert_eq!(outcome.stats.added, 0);
    }
}
