//! # ecotag-cache
//!
//! A tiered perceptual cache for garment-tag image analysis.
//!
//! The cache answers one question cheaply: has this image (or a visually
//! near-identical one) already been analyzed? It sits in front of an expensive,
//! non-deterministic vision model and returns the previously extracted result
//! when it can.
//!
//! ## Features
//!
//! - Exact matching by SHA-256 content hash
//! - Semantic matching by cosine similarity over image embeddings
//! - Perceptual fingerprint embedder (64-dim block-luminance vector)
//! - Optional CLIP embeddings via fastembed, with fingerprint fallback
//! - Three lookup modes: exact, semantic, tiered (exact first)
//! - FIFO capacity eviction over a `SQLite` or in-memory store
//!
//! ## Example
//!
//! ```rust,ignore
//! use ecotag_cache::{CacheConfig, CacheService, StoreRequest};
//! use ecotag_cache::storage::SqliteCacheStore;
//! use std::sync::Arc;
//!
//! let config = CacheConfig::from_env();
//! let store = Arc::new(SqliteCacheStore::new(&config.db_path)?);
//! let cache = CacheService::new(config, store);
//!
//! let result = cache.lookup_or_miss(&image_bytes);
//! if result.is_hit() {
//!     return Ok(result.payload);
//! }
//! let parsed = analyze(&image_bytes)?;
//! cache.store_or_skip(StoreRequest::new(&image_bytes, parsed).with_artifacts(result.artifacts.as_ref()));
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// Duplicates come from fastembed→ort and image transitive deps.
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{CacheConfig, EmbedderChoice, FallbackChoice};
pub use embedding::{Embedding, ImageEmbedder, PerceptualFingerprinter, SemanticEmbedder};
pub use models::{
    CacheEntry, CacheMode, EmbedderId, EntryId, LookupArtifacts, LookupResult, LookupStatus,
    LookupTiming, NewCacheEntry,
};
pub use services::cache::{
    CacheService, CacheStats, ContentHasher, SimilarityMatcher, StoreOutcome, StoreRequest,
    cosine_similarity,
};
pub use storage::{CacheStore, InMemoryCacheStore, SqliteCacheStore};

/// Error type for cache operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `UnsupportedFormat` | Image bytes are not PNG/JPEG or fail to decode |
/// | `InvalidVectorInput` | Cosine similarity over empty or mismatched vectors |
/// | `EmbedderUnavailable` | Visual model failed to load or infer, no fallback |
/// | `StoreUnavailable` | `SQLite` open/query/write failed |
/// | `InvalidInput` | Bad CLI arguments or payload JSON |
/// | `OperationFailed` | I/O and observability initialization failures |
///
/// Every variant except `InvalidVectorInput` is an environmental condition.
/// [`CacheService::lookup_or_miss`] and [`CacheService::store_or_skip`]
/// degrade them to a MISS / skipped store.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Image bytes cannot be decoded for fingerprinting.
    ///
    /// Raised when:
    /// - The byte signature is neither PNG nor JPEG
    /// - The signature matches but the decoder rejects the body
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Similarity comparison over vectors that cannot be compared.
    ///
    /// Signals an internal invariant violation: version and dimensionality
    /// filtering should have removed such pairs before the matcher.
    #[error("invalid vector input: {0}")]
    InvalidVectorInput(String),

    /// The visual-embedding model failed to load or infer.
    ///
    /// Raised when:
    /// - The model backend is not compiled in (`clip-embeddings` feature)
    /// - Model download/initialization fails
    /// - Inference fails or returns an empty / zero-norm vector
    #[error("embedder '{model}' unavailable: {cause}")]
    EmbedderUnavailable {
        /// Model identifier.
        model: String,
        /// The underlying cause.
        cause: String,
    },

    /// The persistent store is unreachable or rejected an operation.
    #[error("cache store operation '{operation}' failed: {cause}")]
    StoreUnavailable {
        /// The store operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Builds a [`Error::StoreUnavailable`] from any displayable cause.
    pub(crate) fn store(operation: &str, cause: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            operation: operation.to_string(),
            cause: cause.to_string(),
        }
    }
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
