//! Capacity-bounded FIFO eviction.

use crate::Result;
use crate::storage::CacheStore;

/// Deletes the oldest entries until at most `max_entries` remain.
///
/// Age is `(created_at, id)` ascending, so a re-stored image counts as new.
/// Returns the number of entries removed.
///
/// # Errors
///
/// Returns an error if the store cannot count or delete.
pub fn prune_to_capacity(store: &dyn CacheStore, max_entries: usize) -> Result<usize> {
    let count = store.count()?;
    if count <= max_entries {
        return Ok(0);
    }

    let removed = store.delete_oldest(count - max_entries)?;
    tracing::debug!(
        count,
        max_entries,
        removed,
        backend = store.backend_name(),
        "Evicted oldest cache entries"
    );
    metrics::counter!("cache_evictions_total").increment(removed as u64);
    Ok(removed)
}
