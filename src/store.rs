//! Concrete collaborator backends: SQLite registry and work queue, and the
//! filesystem object-store sink.
//!
//! The registry keeps one row per identity and performs writes item by
//! item, reporting a per-item outcome instead of failing the whole batch —
//! the reconciler decides what a failed item means for the run.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::models::{RecordStatus, RegistryRecord, SyncMetadata, WorkItem};
use crate::traits::{ItemOutcome, ObjectStore, Registry, WorkQueue};

/// SQLite-backed [`Registry`]. The revision pointer is stored per symbolic
/// reference, so one database can track multiple branches.
pub struct SqliteRegistry {
    pool: SqlitePool,
    reference: String,
}

impl SqliteRegistry {
    pub fn new(pool: SqlitePool, reference: impl Into<String>) -> Self {
        Self {
            pool,
            reference: reference.into(),
        }
    }

    /// Number of tracked records, for status reporting.
    pub async fn record_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// The stored pointer plus its update time, for status reporting.
    pub async fn metadata(&self) -> Result<Option<SyncMetadata>> {
        let row = sqlx::query("SELECT revision, updated_at FROM revisions WHERE reference = ?")
            .bind(&self.reference)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            None => Ok(None),
            Some(row) => {
                let revision: String = row.try_get("revision")?;
                let updated_at: i64 = row.try_get("updated_at")?;
                Ok(Some(SyncMetadata {
                    revision,
                    updated_at: timestamp(updated_at)?,
                }))
            }
        }
    }
}

#[async_trait]
impl Registry for SqliteRegistry {
    async fn snapshot(&self) -> Result<HashMap<String, RegistryRecord>> {
        let rows = sqlx::query(
            "SELECT identity, title, version_token, path, status, last_updated FROM records",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut snapshot = HashMap::with_capacity(rows.len());
        for row in rows {
            let identity: String = row.try_get("identity")?;
            let last_updated: i64 = row.try_get("last_updated")?;
            let status: String = row.try_get("status")?;
            let record = RegistryRecord {
                title: row.try_get("title")?,
                version_token: row.try_get("version_token")?,
                path: row.try_get("path")?,
                status: parse_status(&status)?,
                last_updated: timestamp(last_updated)?,
                identity: identity.clone(),
            };
            snapshot.insert(identity, record);
        }
        Ok(snapshot)
    }

    async fn put_many(&self, records: &[RegistryRecord]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO records (identity, title, version_token, path, status, last_updated)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(identity) DO UPDATE SET
                    title = excluded.title,
                    version_token = excluded.version_token,
                    path = excluded.path,
                    status = excluded.status,
                    last_updated = excluded.last_updated
                "#,
            )
            .bind(&record.identity)
            .bind(&record.title)
            .bind(&record.version_token)
            .bind(&record.path)
            .bind(record.status.as_str())
            .bind(record.last_updated.timestamp())
            .execute(&self.pool)
            .await;

            outcomes.push(match result {
                Ok(_) => ItemOutcome::ok(&record.identity),
                Err(e) => ItemOutcome::failed(&record.identity, e.to_string()),
            });
        }
        Ok(outcomes)
    }

    async fn delete_many(&self, identities: &[String]) -> Result<Vec<ItemOutcome>> {
        let mut outcomes = Vec::with_capacity(identities.len());
        for identity in identities {
            let result = sqlx::query("DELETE FROM records WHERE identity = ?")
                .bind(identity)
                .execute(&self.pool)
                .await;
            outcomes.push(match result {
                Ok(_) => ItemOutcome::ok(identity),
                Err(e) => ItemOutcome::failed(identity, e.to_string()),
            });
        }
        Ok(outcomes)
    }

    async fn last_revision(&self) -> Result<Option<String>> {
        let revision: Option<String> =
            sqlx::query_scalar("SELECT revision FROM revisions WHERE reference = ?")
                .bind(&self.reference)
                .fetch_optional(&self.pool)
                .await?;
        Ok(revision)
    }

    async fn set_last_revision(&self, revision: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO revisions (reference, revision, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(reference) DO UPDATE SET
                revision = excluded.revision,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.reference)
        .bind(revision)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// SQLite-backed [`WorkQueue`]; at most one pending item per identity.
pub struct SqliteWorkQueue {
    pool: SqlitePool,
}

impl SqliteWorkQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of pending items, for status reporting.
    pub async fn pending_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn enqueue_many(&self, items: &[WorkItem]) -> Result<()> {
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO work_items (id, identity, version_token, operation, retry_count, created_at, last_error)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(identity) DO UPDATE SET
                    version_token = excluded.version_token,
                    operation = excluded.operation,
                    retry_count = 0,
                    created_at = excluded.created_at,
                    last_error = NULL
                "#,
            )
            .bind(&item.id)
            .bind(&item.identity)
            .bind(&item.version_token)
            .bind(item.operation.as_str())
            .bind(item.retry_count as i64)
            .bind(item.created_at.timestamp())
            .bind(&item.last_error)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn dequeue(&self, identity: &str) -> Result<()> {
        sqlx::query("DELETE FROM work_items WHERE identity = ?")
            .bind(identity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Filesystem [`ObjectStore`]: one `<identity>.md` file per document.
pub struct FsObjectStore {
    dir: PathBuf,
}

impl FsObjectStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn object_path(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.md", identity))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, identity: &str, body: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.object_path(identity), body)?;
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        match std::fs::remove_file(self.object_path(identity)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_status(status: &str) -> Result<RecordStatus> {
    match status {
        "active" => Ok(RecordStatus::Active),
        other => anyhow::bail!("unknown record status '{}'", other),
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid timestamp {}", secs))
}
