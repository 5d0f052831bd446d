//! In-memory cache store.

use crate::models::{CacheEntry, EntryId, NewCacheEntry};
use crate::storage::CacheStore;
use crate::{Result, current_timestamp_ms};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<EntryId, CacheEntry>,
    by_hash: HashMap<String, EntryId>,
    next_id: i64,
}

/// Volatile cache store backed by an ordered map.
///
/// Ids are assigned from a monotonic counter starting at 1, so iteration
/// order over the map is insertion order.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    inner: RwLock<Inner>,
}

impl InMemoryCacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get_by_hash(
        &self,
        image_hash: &str,
        fingerprint_version: &str,
    ) -> Result<Option<CacheEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .by_hash
            .get(image_hash)
            .and_then(|id| inner.entries.get(id))
            .filter(|e| e.fingerprint_version == fingerprint_version)
            .cloned())
    }

    fn list_by_version(&self, fingerprint_version: &str) -> Result<Vec<CacheEntry>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner
            .entries
            .values()
            .filter(|e| e.fingerprint_version == fingerprint_version)
            .cloned()
            .collect())
    }

    fn touch(&self, id: EntryId) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = inner.entries.get_mut(&id) {
            entry.last_hit_at = Some(current_timestamp_ms());
            entry.hit_count = entry.hit_count.saturating_add(1);
        }
        Ok(())
    }

    fn upsert(&self, entry: &NewCacheEntry) -> Result<EntryId> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = inner.by_hash.get(&entry.image_hash).copied()
            && let Some(existing) = inner.entries.get_mut(&id)
        {
            existing.fingerprint_version.clone_from(&entry.fingerprint_version);
            existing.vector.clone_from(&entry.vector);
            existing.payload.clone_from(&entry.payload);
            existing.created_at = entry.created_at;
            return Ok(id);
        }

        inner.next_id += 1;
        let id = EntryId::new(inner.next_id);
        inner.by_hash.insert(entry.image_hash.clone(), id);
        inner.entries.insert(
            id,
            CacheEntry {
                id,
                image_hash: entry.image_hash.clone(),
                fingerprint_version: entry.fingerprint_version.clone(),
                vector: entry.vector.clone(),
                payload: entry.payload.clone(),
                created_at: entry.created_at,
                last_hit_at: None,
                hit_count: 0,
            },
        );
        Ok(id)
    }

    fn count(&self) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len())
    }

    fn delete_oldest(&self, n: usize) -> Result<usize> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let mut order: Vec<(u64, EntryId)> = inner
            .entries
            .values()
            .map(|e| (e.created_at, e.id))
            .collect();
        order.sort_unstable();

        let mut removed = 0;
        for (_, id) in order.into_iter().take(n) {
            if let Some(entry) = inner.entries.remove(&id) {
                inner.by_hash.remove(&entry.image_hash);
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.by_hash.clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(hash: &str, created_at: u64) -> NewCacheEntry {
        NewCacheEntry::new(hash, "v1", vec![1.0, 0.0], json!({ "hash": hash }))
            .with_created_at(created_at)
    }

    #[test]
    fn test_ids_are_monotonic_and_upsert_keeps_id() {
        let store = InMemoryCacheStore::new();
        let a = store.upsert(&entry("a", 1)).unwrap();
        let b = store.upsert(&entry("b", 2)).unwrap();
        assert!(a < b);

        store.touch(a).unwrap();
        let again = store.upsert(&entry("a", 3)).unwrap();
        assert_eq!(again, a);

        let found = store.get_by_hash("a", "v1").unwrap().unwrap();
        assert_eq!(found.created_at, 3);
        assert_eq!(found.hit_count, 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_version_filtering() {
        let store = InMemoryCacheStore::new();
        store.upsert(&entry("a", 1)).unwrap();
        store
            .upsert(&NewCacheEntry::new("b", "v2", vec![1.0], json!(null)))
            .unwrap();
        assert!(store.get_by_hash("a", "v2").unwrap().is_none());
        assert_eq!(store.list_by_version("v1").unwrap().len(), 1);
        assert_eq!(store.list_by_version("v2").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_oldest_orders_by_created_then_id() {
        let store = InMemoryCacheStore::new();
        store.upsert(&entry("newest", 30)).unwrap();
        store.upsert(&entry("old-1", 10)).unwrap();
        store.upsert(&entry("old-2", 10)).unwrap();

        assert_eq!(store.delete_oldest(2).unwrap(), 2);
        let remaining = store.list_by_version("v1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].image_hash, "newest");
        assert!(store.get_by_hash("old-1", "v1").unwrap().is_none());
    }

    #[test]
    fn test_clear_keeps_id_counter() {
        let store = InMemoryCacheStore::new();
        let first = store.upsert(&entry("a", 1)).unwrap();
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        let second = store.upsert(&entry("a", 2)).unwrap();
        assert!(second > first);
    }
}
