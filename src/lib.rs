//! # Policy Sync
//!
//! A change-detection and reconciliation engine for versioned policy
//! documents.
//!
//! Policy Sync periodically reconciles the documents in a remote
//! source-of-truth repository against a persisted registry, so downstream
//! consumers always see an up-to-date, deduplicated view without
//! re-processing unchanged documents. Between two revisions it computes
//! which documents were added, modified, or removed — via an incremental
//! diff or a full-tree enumeration — and classifies the result into an
//! idempotent add/update/delete plan, tolerant of partial failures.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │  Source     │──▶│  Tracker     │──▶│ Reconciler  │
//! │  (GitHub)   │   │  diff/tree   │   │ add/upd/del │
//! └─────────────┘   └──────┬───────┘   └──────┬──────┘
//!                          │                  │
//!                    ┌─────▼──────┐    ┌──────▼──────────┐
//!                    │  Batch     │    │ SQLite registry │
//!                    │  fetcher   │    │ + work queue    │
//!                    └────────────┘    └──────┬──────────┘
//!                                             ▼
//!                                      ┌─────────────┐
//!                                      │ Object sink │
//!                                      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! polsync init                  # create the registry database
//! polsync sync                  # reconcile against the source
//! polsync sync --dry-run        # classify without writing
//! polsync status                # show the stored revision pointer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`metadata`] | Identity/title extraction and path eligibility |
//! | [`fetch`] | Batched content fetching with failure isolation |
//! | [`tracker`] | Change detection between revisions |
//! | [`reconcile`] | Classification and batched persistence |
//! | [`sync`] | One reconciliation run end to end |
//! | [`traits`] | Collaborator seams (source, registry, queue, sink) |
//! | [`source_github`] | GitHub REST source adapter |
//! | [`store`] | SQLite registry/queue and filesystem sink |
//! | [`memory`] | In-memory collaborators for tests and embedding |
//! | [`events`] | Structured non-fatal diagnostics |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod fetch;
pub mod memory;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod reconcile;
pub mod source_github;
pub mod status;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod traits;
