//! Store request and outcome types.

use crate::models::{CacheMode, EntryId, LookupArtifacts};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An analysis result to cache for an image.
///
/// Hash and vector are optional: when a prior lookup already computed them,
/// attach its artifacts with [`StoreRequest::with_artifacts`] to skip the
/// recomputation.
#[derive(Debug, Clone)]
pub struct StoreRequest<'a> {
    /// Encoded image bytes.
    pub image: &'a [u8],
    /// Analysis payload to cache verbatim.
    pub payload: Value,
    /// Precomputed SHA-256 of `image`.
    pub image_hash: Option<String>,
    /// Precomputed embedding of `image`.
    pub vector: Option<Vec<f32>>,
}

impl<'a> StoreRequest<'a> {
    /// Creates a request with no precomputed artifacts.
    #[must_use]
    pub const fn new(image: &'a [u8], payload: Value) -> Self {
        Self {
            image,
            payload,
            image_hash: None,
            vector: None,
        }
    }

    /// Reuses the hash and vector from a lookup.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Option<&LookupArtifacts>) -> Self {
        if let Some(artifacts) = artifacts {
            self.image_hash = Some(artifacts.image_hash.clone());
            self.vector.clone_from(&artifacts.vector);
        }
        self
    }

    /// Sets a precomputed hash.
    #[must_use]
    pub fn with_hash(mut self, image_hash: impl Into<String>) -> Self {
        self.image_hash = Some(image_hash.into());
        self
    }

    /// Sets a precomputed vector.
    #[must_use]
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }
}

/// Result of a store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreOutcome {
    /// The entry was written.
    Stored {
        /// Id of the inserted or replaced entry.
        id: EntryId,
        /// Entries evicted to stay within capacity.
        evicted: usize,
    },
    /// Nothing was written (caching disabled, or the store failed).
    Skipped,
}

impl StoreOutcome {
    /// Returns true if the entry was written.
    #[must_use]
    pub const fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

/// Snapshot of cache size and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// Store backend name.
    pub backend: String,
    /// Number of stored entries.
    pub entries: usize,
    /// Configured capacity.
    pub max_entries: usize,
    /// Active lookup mode.
    pub mode: CacheMode,
    /// Active fingerprint version tag.
    pub fingerprint_version: String,
    /// Semantic hit threshold.
    pub similarity_threshold: f32,
}
