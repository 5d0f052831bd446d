//! Lookup outcome types.
//!
//! A [`LookupResult`] is the observable output of one cache lookup: how it
//! resolved, which embedder produced the query vector, how long each phase
//! took, and the raw artifacts a caller can hand back to `store`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Cache resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Content-hash point lookup only.
    Exact,
    /// Embedding similarity scan only.
    Semantic,
    /// Exact first, semantic scan on miss.
    #[default]
    Tiered,
}

impl CacheMode {
    /// Returns the mode as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Semantic => "semantic",
            Self::Tiered => "tiered",
        }
    }

    /// Parses a mode string (case-insensitive, surrounding whitespace ignored).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "exact" => Some(Self::Exact),
            "semantic" => Some(Self::Semantic),
            "tiered" => Some(Self::Tiered),
            _ => None,
        }
    }

    /// Returns true if this mode computes embedding vectors.
    #[must_use]
    pub const fn uses_vectors(&self) -> bool {
        !matches!(self, Self::Exact)
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a lookup resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LookupStatus {
    /// Identical bytes were cached.
    HitExact,
    /// A stored vector was within the similarity threshold.
    HitSemantic,
    /// Nothing usable was cached.
    Miss,
}

impl LookupStatus {
    /// Returns the status as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HitExact => "HIT_EXACT",
            Self::HitSemantic => "HIT_SEMANTIC",
            Self::Miss => "MISS",
        }
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies which embedder produced the query vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderId {
    /// No vector was computed (exact resolution or cache disabled).
    None,
    /// External visual-embedding model.
    Clip,
    /// Perceptual fingerprint, selected by configuration.
    Fingerprint,
    /// Perceptual fingerprint substituted after a model failure.
    Fallback,
    /// Vector supplied by the caller.
    Precomputed,
}

impl EmbedderId {
    /// Returns the embedder identifier as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Clip => "clip",
            Self::Fingerprint => "fingerprint",
            Self::Fallback => "fallback",
            Self::Precomputed => "precomputed",
        }
    }
}

impl fmt::Display for EmbedderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase durations in milliseconds, rounded to two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LookupTiming {
    /// Time spent computing the query embedding.
    pub embedding_ms: f64,
    /// Time spent querying the store and matching.
    pub lookup_ms: f64,
}

impl LookupTiming {
    /// Creates a timing record, rounding both values.
    #[must_use]
    pub fn new(embedding_ms: f64, lookup_ms: f64) -> Self {
        Self {
            embedding_ms: round_to_decimals(embedding_ms, 2),
            lookup_ms: round_to_decimals(lookup_ms, 2),
        }
    }
}

/// Raw artifacts computed during a lookup.
///
/// Passing these to `store` avoids hashing and embedding the image twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupArtifacts {
    /// SHA-256 of the image bytes.
    pub image_hash: String,
    /// Query vector, when one was computed.
    pub vector: Option<Vec<f32>>,
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupResult {
    /// Whether caching was enabled for this call.
    pub cache_enabled: bool,
    /// Configured resolution mode.
    pub mode: CacheMode,
    /// Embedder that produced the query vector.
    pub embedder: EmbedderId,
    /// Resolution status.
    pub status: LookupStatus,
    /// Cached payload on a hit.
    pub payload: Option<Value>,
    /// Similarity of the matched entry (semantic hits only, 6 decimals).
    pub similarity: Option<f32>,
    /// Phase durations.
    pub timing: LookupTiming,
    /// Hash and vector for reuse by `store` (absent when caching is disabled).
    pub artifacts: Option<LookupArtifacts>,
}

impl LookupResult {
    /// Creates a MISS result.
    #[must_use]
    pub const fn miss(
        cache_enabled: bool,
        mode: CacheMode,
        embedder: EmbedderId,
        timing: LookupTiming,
        artifacts: Option<LookupArtifacts>,
    ) -> Self {
        Self {
            cache_enabled,
            mode,
            embedder,
            status: LookupStatus::Miss,
            payload: None,
            similarity: None,
            timing,
            artifacts,
        }
    }

    /// Creates the result returned when caching is disabled.
    #[must_use]
    pub fn disabled(mode: CacheMode) -> Self {
        Self::miss(false, mode, EmbedderId::None, LookupTiming::default(), None)
    }

    /// Returns true for either hit status.
    #[must_use]
    pub const fn is_hit(&self) -> bool {
        !matches!(self.status, LookupStatus::Miss)
    }
}

/// Rounds a value to a fixed number of decimal places.
#[must_use]
pub fn round_to_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
