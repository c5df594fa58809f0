//! Batched document body fetching.
//!
//! Splits fetch descriptors into fixed-size batches and fans each batch out
//! concurrently, staying under the execution environment's concurrent
//! request ceiling. Per-item failures are captured individually and never
//! abort the batch or later batches; one slow or broken document must never
//! block unrelated ones. Retries, if any, belong to the source
//! implementation — this layer only isolates and reports.

use std::collections::HashMap;

use futures::future::join_all;

use crate::events::{EventSink, SyncEvent};
use crate::metadata;
use crate::traits::SourceRepository;

/// Default batch size, chosen to stay under the request ceiling.
pub const DEFAULT_FETCH_BATCH: usize = 40;

/// A path plus the version token addressing its content.
///
/// Callers filter with [`metadata::is_eligible`] before building these.
#[derive(Debug, Clone)]
pub struct FetchDescriptor {
    pub path: String,
    pub version_token: String,
}

/// Result of one batched fetch pass.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Successfully fetched bodies, keyed by identity.
    pub bodies: HashMap<String, String>,
    /// `(identity, error)` for every failed item, in completion order.
    pub failures: Vec<(String, String)>,
}

/// Fetch the bodies for `descriptors`, batch by batch.
///
/// All members of a batch are awaited before the next batch starts. Items
/// whose fetch fails are excluded from `bodies`, reported in `failures`,
/// and emitted as [`SyncEvent::FetchFailed`] warnings.
pub async fn fetch_bodies(
    source: &dyn SourceRepository,
    descriptors: &[FetchDescriptor],
    batch_size: usize,
    events: &dyn EventSink,
) -> FetchOutcome {
    let batch_size = batch_size.max(1);
    let mut outcome = FetchOutcome::default();

    for batch in descriptors.chunks(batch_size) {
        let fetches = batch.iter().map(|descriptor| async move {
            let identity = metadata::identity_for(&descriptor.path);
            let result = source.content(&descriptor.version_token).await;
            (identity, result)
        });

        for (identity, result) in join_all(fetches).await {
            match result {
                Ok(bytes) => {
                    let body = String::from_utf8_lossy(&bytes).into_owned();
                    outcome.bodies.insert(identity, body);
                }
                Err(err) => {
                    let error = err.to_string();
                    events.emit(SyncEvent::FetchFailed {
                        identity: identity.clone(),
                        error: error.clone(),
                    });
                    outcome.failures.push((identity, error));
                }
            }
        }
    }

    outcome
}
