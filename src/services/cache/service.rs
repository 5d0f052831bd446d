//! Cache orchestrator.
//!
//! Resolves lookups under one of three modes:
//! 1. **Exact**: SHA-256 point lookup
//! 2. **Semantic**: embed, then linear scan for the most similar vector
//! 3. **Tiered**: exact first, semantic on miss (excluding the query's own hash)
//!
//! Stores upsert by hash and then evict the oldest entries over capacity.

use crate::config::CacheConfig;
use crate::embedding::{Embedding, ImageEmbedder, SemanticEmbedder};
use crate::models::{
    CacheEntry, CacheMode, EmbedderId, LookupArtifacts, LookupResult, LookupStatus, LookupTiming,
    NewCacheEntry, round_to_decimals,
};
use crate::storage::CacheStore;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

use super::eviction::prune_to_capacity;
use super::hasher::ContentHasher;
use super::matcher::SimilarityMatcher;
use super::types::{CacheStats, StoreOutcome, StoreRequest};

/// Decimal places kept in the reported similarity.
const SIMILARITY_DECIMALS: i32 = 6;

/// Tiered perceptual cache over a [`CacheStore`].
///
/// `lookup` and `store` return errors; the `_or_miss` / `_or_skip` variants
/// log and absorb them so a broken cache never blocks the caller.
///
/// # Example
///
/// ```rust,ignore
/// use ecotag_cache::{CacheConfig, CacheService, InMemoryCacheStore, StoreRequest};
/// use std::sync::Arc;
///
/// let cache = CacheService::new(CacheConfig::default(), Arc::new(InMemoryCacheStore::new()));
///
/// let result = cache.lookup_or_miss(&image);
/// if !result.is_hit() {
///     let payload = analyze(&image)?;
///     cache.store_or_skip(StoreRequest::new(&image, payload).with_artifacts(result.artifacts.as_ref()));
/// }
/// ```
pub struct CacheService {
    config: CacheConfig,
    store: Arc<dyn CacheStore>,
    embedder: Arc<dyn ImageEmbedder>,
    matcher: SimilarityMatcher,
}

/// A resolved entry and, for semantic hits, its similarity.
struct Resolved {
    entry: CacheEntry,
    similarity: Option<f32>,
}

impl CacheService {
    /// Creates a service using a [`SemanticEmbedder`] built from the config.
    #[must_use]
    pub fn new(config: CacheConfig, store: Arc<dyn CacheStore>) -> Self {
        let embedder = Arc::new(SemanticEmbedder::new(config.embedding.clone()));
        Self::with_embedder(config, store, embedder)
    }

    /// Creates a service with a custom embedder.
    #[must_use]
    pub fn with_embedder(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        embedder: Arc<dyn ImageEmbedder>,
    ) -> Self {
        let matcher = SimilarityMatcher::new(config.similarity_threshold);
        Self {
            config,
            store,
            embedder,
            matcher,
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Looks up a cached analysis for encoded image bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails without a fallback, the bytes
    /// cannot be fingerprinted, or the store is unavailable.
    #[instrument(
        skip(self, image),
        fields(operation = "cache_lookup", mode = %self.config.mode, image_len = image.len())
    )]
    pub fn lookup(&self, image: &[u8]) -> Result<LookupResult> {
        if !self.config.enabled {
            return Ok(LookupResult::disabled(self.config.mode));
        }
        let image_hash = ContentHasher::hash(image);
        self.resolve(&image_hash, || self.embedder.embed(image))
    }

    /// Looks up using a hash and vector the caller already computed.
    ///
    /// No embedding is performed. The vector is ignored in exact mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    #[instrument(
        skip(self, vector),
        fields(operation = "cache_lookup_precomputed", mode = %self.config.mode)
    )]
    pub fn lookup_with_artifacts(&self, image_hash: &str, vector: &[f32]) -> Result<LookupResult> {
        if !self.config.enabled {
            return Ok(LookupResult::disabled(self.config.mode));
        }
        self.resolve(image_hash, || {
            Ok(Embedding::new(EmbedderId::Precomputed, vector.to_vec()))
        })
    }

    /// Looks up, converting any error into a MISS.
    #[must_use]
    pub fn lookup_or_miss(&self, image: &[u8]) -> LookupResult {
        match self.lookup(image) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, mode = %self.config.mode, "Cache lookup failed, treating as miss");
                record_lookup_metrics(self.config.mode, LookupStatus::Miss, Duration::ZERO);
                LookupResult::miss(
                    true,
                    self.config.mode,
                    EmbedderId::None,
                    LookupTiming::default(),
                    Some(LookupArtifacts {
                        image_hash: ContentHasher::hash(image),
                        vector: None,
                    }),
                )
            },
        }
    }

    /// Stores an analysis for an image, then enforces capacity.
    ///
    /// A vector is computed only when the request carries none and the mode
    /// uses vectors. Exact mode always stores an empty vector, discarding any
    /// vector the request carries.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails, the vector has non-finite
    /// components, or the store is unavailable.
    #[instrument(
        skip(self, request),
        fields(operation = "cache_store", mode = %self.config.mode, image_len = request.image.len())
    )]
    pub fn store(&self, request: StoreRequest<'_>) -> Result<StoreOutcome> {
        if !self.config.enabled {
            return Ok(StoreOutcome::Skipped);
        }

        let image_hash = request
            .image_hash
            .unwrap_or_else(|| ContentHasher::hash(request.image));
        let vector = match request.vector {
            _ if !self.config.mode.uses_vectors() => Vec::new(),
            Some(vector) => vector,
            None => self.embed_timed(request.image)?.vector,
        };
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidVectorInput(
                "vector has non-finite components".to_string(),
            ));
        }

        let entry = NewCacheEntry::new(
            image_hash,
            self.config.fingerprint_version.as_str(),
            vector,
            request.payload,
        );
        let id = self.store.upsert(&entry)?;
        let evicted = prune_to_capacity(self.store.as_ref(), self.config.max_entries)?;

        tracing::debug!(entry_id = %id, evicted, "Stored cache entry");
        Ok(StoreOutcome::Stored { id, evicted })
    }

    /// Stores, converting any error into [`StoreOutcome::Skipped`].
    pub fn store_or_skip(&self, request: StoreRequest<'_>) -> StoreOutcome {
        self.store(request).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Cache store failed, skipping");
            StoreOutcome::Skipped
        })
    }

    /// Evicts the oldest entries until at most `max_entries` remain.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    #[instrument(skip(self), fields(operation = "cache_prune"))]
    pub fn prune_to(&self, max_entries: usize) -> Result<usize> {
        prune_to_capacity(self.store.as_ref(), max_entries)
    }

    /// Deletes every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    #[instrument(skip(self), fields(operation = "cache_reset"))]
    pub fn reset(&self) -> Result<()> {
        self.store.clear()?;
        tracing::info!(backend = self.store.backend_name(), "Cache cleared");
        Ok(())
    }

    /// Returns the number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }

    /// Returns size and settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    pub fn stats(&self) -> Result<CacheStats> {
        Ok(CacheStats {
            enabled: self.config.enabled,
            backend: self.store.backend_name().to_string(),
            entries: self.store.count()?,
            max_entries: self.config.max_entries,
            mode: self.config.mode,
            fingerprint_version: self.config.fingerprint_version.clone(),
            similarity_threshold: self.matcher.threshold(),
        })
    }

    /// Runs the configured mode for one query.
    ///
    /// `embed` is only called when the semantic tier is reached.
    fn resolve(
        &self,
        image_hash: &str,
        embed: impl FnOnce() -> Result<Embedding>,
    ) -> Result<LookupResult> {
        let mode = self.config.mode;
        let mut lookup_elapsed = Duration::ZERO;

        if matches!(mode, CacheMode::Exact | CacheMode::Tiered) {
            let start = Instant::now();
            let found = self.resolve_exact(image_hash)?;
            lookup_elapsed += start.elapsed();

            if let Some(found) = found {
                return Ok(self.finish(
                    LookupStatus::HitExact,
                    EmbedderId::None,
                    Some(found),
                    Duration::ZERO,
                    lookup_elapsed,
                    LookupArtifacts {
                        image_hash: image_hash.to_string(),
                        vector: None,
                    },
                ));
            }
            if mode == CacheMode::Exact {
                return Ok(self.finish(
                    LookupStatus::Miss,
                    EmbedderId::None,
                    None,
                    Duration::ZERO,
                    lookup_elapsed,
                    LookupArtifacts {
                        image_hash: image_hash.to_string(),
                        vector: None,
                    },
                ));
            }
        }

        let start = Instant::now();
        let embedding = embed()?;
        let embedding_elapsed = start.elapsed();
        metrics::histogram!(
            "cache_embedding_duration_ms",
            "embedder" => embedding.embedder.as_str()
        )
        .record(duration_ms(embedding_elapsed));

        let exclude = (mode == CacheMode::Tiered).then_some(image_hash);
        let start = Instant::now();
        let found = self.resolve_semantic(&embedding.vector, exclude)?;
        lookup_elapsed += start.elapsed();

        let status = if found.is_some() {
            LookupStatus::HitSemantic
        } else {
            LookupStatus::Miss
        };
        Ok(self.finish(
            status,
            embedding.embedder,
            found,
            embedding_elapsed,
            lookup_elapsed,
            LookupArtifacts {
                image_hash: image_hash.to_string(),
                vector: Some(embedding.vector),
            },
        ))
    }

    fn resolve_exact(&self, image_hash: &str) -> Result<Option<Resolved>> {
        let entry = self
            .store
            .get_by_hash(image_hash, &self.config.fingerprint_version)?;
        Ok(entry.map(|entry| {
            self.record_hit(&entry);
            Resolved {
                entry,
                similarity: None,
            }
        }))
    }

    fn resolve_semantic(&self, query: &[f32], exclude: Option<&str>) -> Result<Option<Resolved>> {
        if query.is_empty() {
            return Err(Error::InvalidVectorInput("empty query vector".to_string()));
        }
        let candidates = self.store.list_by_version(&self.config.fingerprint_version)?;
        let Some(matched) = self.matcher.find(query, &candidates, exclude) else {
            return Ok(None);
        };
        tracing::debug!(
            entry_id = %matched.entry.id,
            similarity = matched.similarity,
            candidates = candidates.len(),
            "Semantic match found"
        );
        self.record_hit(matched.entry);
        Ok(Some(Resolved {
            entry: matched.entry.clone(),
            similarity: Some(matched.similarity),
        }))
    }

    /// Bumps hit statistics; a failure here never turns a hit into a miss.
    fn record_hit(&self, entry: &CacheEntry) {
        if let Err(e) = self.store.touch(entry.id) {
            tracing::warn!(entry_id = %entry.id, error = %e, "Failed to record cache hit");
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn finish(
        &self,
        status: LookupStatus,
        embedder: EmbedderId,
        found: Option<Resolved>,
        embedding_elapsed: Duration,
        lookup_elapsed: Duration,
        artifacts: LookupArtifacts,
    ) -> LookupResult {
        let mode = self.config.mode;
        record_lookup_metrics(mode, status, embedding_elapsed + lookup_elapsed);
        tracing::debug!(status = %status, embedder = %embedder, "Cache lookup resolved");

        let timing = LookupTiming::new(duration_ms(embedding_elapsed), duration_ms(lookup_elapsed));
        let mut result = LookupResult::miss(true, mode, embedder, timing, Some(artifacts));
        if let Some(found) = found {
            result.status = status;
            result.payload = Some(found.entry.payload);
            result.similarity = found
                .similarity
                .map(|s| round_to_decimals(f64::from(s), SIMILARITY_DECIMALS) as f32);
        }
        result
    }

    fn embed_timed(&self, image: &[u8]) -> Result<Embedding> {
        let start = Instant::now();
        let embedding = self.embedder.embed(image)?;
        metrics::histogram!(
            "cache_embedding_duration_ms",
            "embedder" => embedding.embedder.as_str()
        )
        .record(duration_ms(start.elapsed()));
        Ok(embedding)
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn record_lookup_metrics(mode: CacheMode, status: LookupStatus, elapsed: Duration) {
    metrics::counter!(
        "cache_lookups_total",
        "mode" => mode.as_str(),
        "status" => status.as_str()
    )
    .increment(1);
    metrics::histogram!("cache_lookup_duration_ms", "mode" => mode.as_str())
        .record(duration_ms(elapsed));
}
