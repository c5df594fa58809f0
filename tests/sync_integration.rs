use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

use policy_sync::events::BufferSink;
use policy_sync::memory::MemorySource;
use policy_sync::migrate;
use policy_sync::models::{DiffEntry, DiffStatus};
use policy_sync::store::{FsObjectStore, SqliteRegistry, SqliteWorkQueue};
use policy_sync::sync::{run_sync, SyncOptions};
use policy_sync::traits::Registry;

async fn pool_at(tmp: &TempDir) -> SqlitePool {
    let path = tmp.path().join("data").join("policy.sqlite");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    pool
}

fn options() -> SyncOptions {
    SyncOptions {
        reference: "main".to_string(),
        full: false,
        dry_run: false,
        fetch_batch_size: 40,
        write_batch_size: 100,
    }
}

fn diff_entry(path: &str, status: DiffStatus, token: &str) -> DiffEntry {
    DiffEntry {
        path: path.to_string(),
        status,
        version_token: token.to_string(),
        previous_path: None,
    }
}

#[tokio::test]
async fn full_lifecycle_against_sqlite_registry() {
    let tmp = TempDir::new().unwrap();
    let pool = pool_at(&tmp).await;
    let registry = SqliteRegistry::new(pool.clone(), "main");
    let queue = SqliteWorkQueue::new(pool.clone());
    let objects = FsObjectStore::new(tmp.path().join("data/objects"));
    let events = BufferSink::new();

    let source = MemorySource::new();
    source.set_ref("main", "rev1");
    source.add_document("rev1", "policies/aml.md", "# Anti-Money Laundering\nv1");
    source.add_document("rev1", "policies/kyc.md", "# Know Your Customer\nv1");
    source.add_document("rev1", "README.md", "# Repo index\n");
    source.add_document("rev1", "scripts/check.sh", "#!/bin/sh\n");

    // First run: full tree, everything eligible is an addition.
    let outcome = run_sync(&source, &registry, &queue, &objects, &options(), &events)
        .await
        .unwrap();
    assert_eq!(outcome.stats.added, 2);
    assert_eq!(outcome.stats.scanned, 2);
    assert!(outcome.advanced);

    let snapshot = registry.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot["aml"].title, "Anti-Money Laundering");
    assert!(tmp.path().join("data/objects/aml.md").exists());
    assert!(tmp.path().join("data/objects/kyc.md").exists());
    assert_eq!(queue.pending_count().await.unwrap(), 2);
    assert_eq!(
        registry.last_revision().await.unwrap(),
        Some("rev1".to_string())
    );

    // Second run: one modification, one rename, one addition.
    source.set_ref("main", "rev2");
    let aml_v2 = source.insert_blob("# Anti-Money Laundering\nv2");
    let kyc_eu = source.insert_blob("# Know Your Customer (EU)\nv1");
    let gdpr = source.insert_blob("# GDPR\nv1");
    source.set_diff(
        "rev1",
        "rev2",
        vec![
            diff_entry("policies/aml.md", DiffStatus::Modified, &aml_v2),
            DiffEntry {
                path: "policies/kyc-eu.md".to_string(),
                status: DiffStatus::Renamed,
                version_token: kyc_eu.clone(),
                previous_path: Some("policies/kyc.md".to_string()),
            },
            diff_entry("policies/gdpr.md", DiffStatus::Added, &gdpr),
        ],
    );

    let outcome = run_sync(&source, &registry, &queue, &objects, &options(), &events)
        .await
        .unwrap();
    assert_eq!(outcome.stats.added, 2); // kyc-eu + gdpr
    assert_eq!(outcome.stats.updated, 1); // aml
    assert_eq!(outcome.stats.deleted, 1); // kyc
    assert!(outcome.advanced);

    let snapshot = registry.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.contains_key("aml"));
    assert!(snapshot.contains_key("kyc-eu"));
    assert!(snapshot.contains_key("gdpr"));
    assert_eq!(snapshot["aml"].version_token, aml_v2);

    assert!(!tmp.path().join("data/objects/kyc.md").exists());
    assert!(tmp.path().join("data/objects/kyc-eu.md").exists());
    let body = std::fs::read_to_string(tmp.path().join("data/objects/aml.md")).unwrap();
    assert_eq!(body, "# Anti-Money Laundering\nv2");

    // kyc's queue entry was dropped with its record.
    assert_eq!(queue.pending_count().await.unwrap(), 3);

    // Third run: pointer already at rev2.
    let outcome = run_sync(&source, &registry, &queue, &objects, &options(), &events)
        .await
        .unwrap();
    assert!(outcome.no_op);
    assert_eq!(
        registry.last_revision().await.unwrap(),
        Some("rev2".to_string())
    );

    pool.close().await;
}

#[tokio::test]
async fn rerun_after_fetch_failure_converges() {
    let tmp = TempDir::new().unwrap();
    let pool = pool_at(&tmp).await;
    let registry = SqliteRegistry::new(pool.clone(), "main");
    let queue = SqliteWorkQueue::new(pool.clone());
    let objects = FsObjectStore::new(tmp.path().join("data/objects"));
    let events = BufferSink::new();

    let source = MemorySource::new();
    source.set_ref("main", "rev1");
    source.add_document("rev1", "policies/stable.md", "# Stable\nv1");
    run_sync(&source, &registry, &queue, &objects, &options(), &events)
        .await
        .unwrap();

    source.set_ref("main", "rev2");
    let good = source.insert_blob("# Good\nv1");
    let flaky = source.insert_blob("# Flaky\nv1");
    source.fail_token(&flaky);
    source.set_diff(
        "rev1",
        "rev2",
        vec![
            diff_entry("policies/good.md", DiffStatus::Added, &good),
            diff_entry("policies/flaky.md", DiffStatus::Added, &flaky),
        ],
    );

    // The failed fetch holds the pointer; the good document still lands.
    let outcome = run_sync(&source, &registry, &queue, &objects, &options(), &events)
        .await
        .unwrap();
    assert_eq!(outcome.stats.added, 1);
    assert_eq!(outcome.failed, vec!["flaky".to_string()]);
    assert!(!outcome.advanced);
    assert_eq!(
        registry.last_revision().await.unwrap(),
        Some("rev1".to_string())
    );
    assert!(registry.snapshot().await.unwrap().contains_key("good"));

    // The retry re-diffs the same transition: the good document is a
    // no-op, the straggler lands, and the pointer advances.
    source.heal_token(&flaky);
    let outcome = run_sync(&source, &registry, &queue, &objects, &options(), &events)
        .await
        .unwrap();
    assert_eq!(outcome.stats.added, 1);
    assert_eq!(outcome.stats.updated, 0);
    assert!(outcome.failed.is_empty());
    assert!(outcome.advanced);
    assert_eq!(
        registry.last_revision().await.unwrap(),
        Some("rev2".to_string())
    );

    let snapshot = registry.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.contains_key("flaky"));
    assert!(tmp.path().join("data/objects/flaky.md").exists());

    pool.close().await;
}
