//! Error types at the collaborator boundaries.
//!
//! The pipeline itself uses `anyhow` like the rest of the crate; these
//! typed errors exist where the contract requires distinguishing failure
//! classes: the source taxonomy (not-found vs rate-limited vs transient)
//! and the combined registry persistence failure that names every failed
//! identity.

use thiserror::Error;

/// Failure classes surfaced by a [`SourceRepository`](crate::traits::SourceRepository).
///
/// `NotFound` is a hard failure for the whole run — an unknown baseline
/// cannot be diffed safely. `RateLimited` and `Transient` are expected to
/// be retried by the source implementation; when retries are exhausted the
/// fetch layer isolates them per item instead of cascading.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient source failure: {0}")]
    Transient(String),

    #[error("source failure: {0}")]
    Other(String),
}

impl SourceError {
    /// Whether a source implementation may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::RateLimited(_) | SourceError::Transient(_))
    }
}

/// Combined failure for a batched registry write or delete.
///
/// Raised when any item in a batch fails; the identities list names every
/// failed item so the caller can log and retry the run wholesale. Items
/// that succeeded before the failure remain persisted — reconciliation is
/// idempotent, so the retry reproduces the remainder.
#[derive(Debug, Error)]
#[error("registry {operation} failed for {} item(s): {}", .identities.len(), .identities.join(", "))]
pub struct PersistError {
    /// `"write"` or `"delete"`.
    pub operation: &'static str,
    /// Every identity that failed in the batch.
    pub identities: Vec<String>,
}
