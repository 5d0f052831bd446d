//! Cache entry types and identifiers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Store-assigned insertion identifier for a cache entry.
///
/// Monotonic per store; breaks `created_at` ties during eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    /// Creates a new entry ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw row identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EntryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A durable cache record: one per distinct image hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Insertion identifier.
    pub id: EntryId,
    /// Lowercase hex SHA-256 of the raw image bytes (unique).
    pub image_hash: String,
    /// Embedding generation tag; vectors are only compared within one version.
    pub fingerprint_version: String,
    /// Embedding vector (empty for entries stored in exact mode).
    pub vector: Vec<f32>,
    /// The cached analysis result, returned verbatim on a hit.
    pub payload: Value,
    /// Insertion time (Unix milliseconds).
    pub created_at: u64,
    /// Time of the most recent hit (Unix milliseconds).
    pub last_hit_at: Option<u64>,
    /// Number of hits served by this entry.
    pub hit_count: u64,
}

impl CacheEntry {
    /// Returns the vector dimensionality (0 when no vector was stored).
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// Input to [`CacheStore::upsert`](crate::storage::CacheStore::upsert).
///
/// Upserting an existing `image_hash` replaces version, vector, payload and
/// `created_at`; the entry keeps its id and hit statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCacheEntry {
    /// Lowercase hex SHA-256 of the raw image bytes.
    pub image_hash: String,
    /// Embedding generation tag.
    pub fingerprint_version: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// The analysis result to cache.
    pub payload: Value,
    /// Insertion time (Unix milliseconds).
    pub created_at: u64,
}

impl NewCacheEntry {
    /// Creates a new entry stamped with the current time.
    #[must_use]
    pub fn new(
        image_hash: impl Into<String>,
        fingerprint_version: impl Into<String>,
        vector: Vec<f32>,
        payload: Value,
    ) -> Self {
        Self {
            image_hash: image_hash.into(),
            fingerprint_version: fingerprint_version.into(),
            vector,
            payload,
            created_at: crate::current_timestamp_ms(),
        }
    }

    /// Overrides the creation timestamp.
    #[must_use]
    pub const fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_id_ordering() {
        assert!(EntryId::new(1) < EntryId::new(2));
        assert_eq!(EntryId::from(7).get(), 7);
        assert_eq!(EntryId::new(42).to_string(), "42");
    }

    #[test]
    fn test_new_entry_with_created_at() {
        let entry = NewCacheEntry::new("a".repeat(64), "v1", vec![1.0], json!({"country": "PT"}))
            .with_created_at(5);
        assert_eq!(entry.created_at, 5);
        assert_eq!(entry.fingerprint_version, "v1");
    }

    #[test]
    fn test_new_entry_defaults_to_now() {
        let entry = NewCacheEntry::new("a", "v1", Vec::new(), Value::Null);
        assert!(entry.created_at > 0);
    }
}
