use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store::{SqliteRegistry, SqliteWorkQueue};

/// Print the registry's view of the sync: repository, stored revision
/// pointer, tracked record count, and pending work items.
pub async fn run_status(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let registry = SqliteRegistry::new(pool.clone(), config.source.reference.clone());
    let queue = SqliteWorkQueue::new(pool.clone());

    println!("{:<14} {}", "REPOSITORY", config.source.repository);
    println!("{:<14} {}", "REFERENCE", config.source.reference);

    match registry.metadata().await? {
        Some(meta) => println!(
            "{:<14} {} ({})",
            "REVISION",
            meta.revision,
            meta.updated_at.format("%Y-%m-%dT%H:%M:%SZ")
        ),
        None => println!("{:<14} never synced", "REVISION"),
    }

    println!("{:<14} {}", "RECORDS", registry.record_count().await?);
    println!("{:<14} {}", "PENDING ITEMS", queue.pending_count().await?);

    pool.close().await;
    Ok(())
}
