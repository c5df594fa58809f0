//! # Policy Sync CLI (`polsync`)
//!
//! The `polsync` binary drives the reconciliation engine from the command
//! line (typically under cron or a CI schedule). It provides commands for
//! registry initialization, running a sync, and inspecting the stored
//! state.
//!
//! ## Usage
//!
//! ```bash
//! polsync --config ./config/polsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `polsync init` | Create the SQLite registry and run schema migrations |
//! | `polsync sync` | Reconcile the source repository against the registry |
//! | `polsync sync --full` | Ignore the stored pointer and re-enumerate the tree |
//! | `polsync sync --dry-run` | Classify and report without writing |
//! | `polsync status` | Show the revision pointer and registry counts |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the registry
//! polsync init --config ./config/polsync.toml
//!
//! # Reconcile once (incremental when a pointer is stored)
//! polsync sync --config ./config/polsync.toml
//!
//! # Machine-readable warnings on stderr
//! polsync sync --events json --config ./config/polsync.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use policy_sync::config;
use policy_sync::db;
use policy_sync::events::EventMode;
use policy_sync::migrate;
use policy_sync::source_github::GitHubSource;
use policy_sync::status;
use policy_sync::store::{FsObjectStore, SqliteRegistry, SqliteWorkQueue};
use policy_sync::sync::{run_sync, SyncOptions, SyncOutcome};

/// Policy Sync CLI — reconcile versioned policy documents from a remote
/// source-of-truth repository into a persisted registry.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/polsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "polsync",
    about = "Policy Sync — change detection and reconciliation for versioned policy documents",
    version,
    long_about = "Policy Sync reconciles the policy documents in a remote source-of-truth \
    repository against a persisted registry: it detects added, modified, and removed documents \
    between revisions (incremental diff or full-tree enumeration), classifies them into an \
    idempotent add/update/delete plan, and persists the result with partial-failure isolation."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/polsync.toml`. Source, registry, and batch
    /// settings are read from this file.
    #[arg(long, global = true, default_value = "./config/polsync.toml")]
    config: PathBuf,

    /// Diagnostics channel: `off`, `human`, or `json` (stderr).
    ///
    /// Defaults to `human` when stderr is a TTY, `off` otherwise.
    #[arg(long, global = true)]
    events: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the registry schema.
    ///
    /// Creates the SQLite database file and all required tables (records,
    /// work_items, revisions). This command is idempotent — running it
    /// multiple times is safe.
    Init,

    /// Run one reconciliation against the source repository.
    ///
    /// Resolves the configured reference to a revision, detects changes
    /// since the stored pointer, and applies the resulting add/update/delete
    /// plan to the registry, work queue, and object store.
    Sync {
        /// Ignore the stored revision pointer — re-enumerate the full tree.
        #[arg(long)]
        full: bool,

        /// Classify and report without writing to the registry.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the stored revision pointer and registry counts.
    Status,
}

fn event_mode(flag: Option<&str>) -> Result<EventMode> {
    match flag {
        None => Ok(EventMode::default_for_tty()),
        Some("off") => Ok(EventMode::Off),
        Some("human") => Ok(EventMode::Human),
        Some("json") => Ok(EventMode::Json),
        Some(other) => anyhow::bail!(
            "Unknown events mode: '{}'. Must be off, human, or json.",
            other
        ),
    }
}

fn print_summary(repository: &str, outcome: &SyncOutcome, dry_run: bool) {
    if dry_run {
        println!("sync {} (dry-run)", repository);
    } else {
        println!("sync {}", repository);
    }

    if outcome.no_op {
        println!("  up to date at {}", outcome.revision);
        println!("ok");
        return;
    }

    println!(
        "  revision: {} (from {})",
        outcome.revision,
        outcome.previous.as_deref().unwrap_or("initial")
    );
    println!("  scanned: {}", outcome.stats.scanned);
    println!(
        "  added: {}  updated: {}  deleted: {}",
        outcome.stats.added, outcome.stats.updated, outcome.stats.deleted
    );
    if !outcome.failed.is_empty() {
        println!("  fetch failures: {}", outcome.failed.len());
    }
    if !dry_run {
        println!(
            "  pointer: {}",
            if outcome.advanced { "advanced" } else { "held" }
        );
    }
    println!("ok");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let mode = event_mode(cli.events.as_deref())?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Registry initialized successfully.");
        }
        Commands::Sync { full, dry_run } => {
            let source = GitHubSource::new(&cfg.source)?;
            let pool = db::connect(&cfg).await?;
            let registry = SqliteRegistry::new(pool.clone(), cfg.source.reference.clone());
            let queue = SqliteWorkQueue::new(pool.clone());
            let objects = FsObjectStore::new(cfg.registry.object_dir.clone());
            let sink = mode.sink();

            let options = SyncOptions {
                reference: cfg.source.reference.clone(),
                full,
                dry_run,
                fetch_batch_size: cfg.sync.fetch_batch_size,
                write_batch_size: cfg.sync.write_batch_size,
            };

            let outcome =
                run_sync(&source, &registry, &queue, &objects, &options, sink.as_ref()).await?;
            print_summary(&cfg.source.repository, &outcome, dry_run);
            pool.close().await;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
    }

    Ok(())
}
