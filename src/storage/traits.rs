//! Cache store trait.

use crate::Result;
use crate::models::{CacheEntry, EntryId, NewCacheEntry};

/// Trait for cache entry stores.
///
/// Stores are the single source of truth for cached analyses. Every method
/// takes `&self`; implementations provide their own interior locking so one
/// store can be shared between threads behind an `Arc`.
///
/// Rows that cannot be decoded are skipped by the read methods rather than
/// reported as errors.
pub trait CacheStore: Send + Sync {
    /// Returns the entry for `image_hash` if it was stored under `fingerprint_version`.
    fn get_by_hash(&self, image_hash: &str, fingerprint_version: &str)
    -> Result<Option<CacheEntry>>;

    /// Lists every entry stored under `fingerprint_version`, ascending by id.
    fn list_by_version(&self, fingerprint_version: &str) -> Result<Vec<CacheEntry>>;

    /// Records a hit: sets `last_hit_at` to now and increments `hit_count`.
    ///
    /// Touching an unknown id is a no-op.
    fn touch(&self, id: EntryId) -> Result<()>;

    /// Inserts an entry, or replaces the entry with the same `image_hash`.
    ///
    /// A replaced entry keeps its id and hit statistics.
    fn upsert(&self, entry: &NewCacheEntry) -> Result<EntryId>;

    /// Returns the number of stored entries.
    fn count(&self) -> Result<usize>;

    /// Deletes the `n` oldest entries by `(created_at, id)` and returns how many were removed.
    fn delete_oldest(&self, n: usize) -> Result<usize>;

    /// Deletes every entry.
    fn clear(&self) -> Result<()>;

    /// Backend name used in logs and metrics.
    fn backend_name(&self) -> &'static str;
}
