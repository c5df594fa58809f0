use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotent schema creation, shared with tests that hold their own pool.
pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // System of record: one row per identity
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            identity TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            version_token TEXT NOT NULL,
            path TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            last_updated INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Downstream work queue: one pending entry per identity
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_items (
            id TEXT PRIMARY KEY,
            identity TEXT NOT NULL UNIQUE,
            version_token TEXT NOT NULL,
            operation TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            last_error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Last-revision pointer per symbolic reference
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS revisions (
            reference TEXT PRIMARY KEY,
            revision TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_status ON records(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_work_items_created_at ON work_items(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}
