//! Cosine similarity and best-candidate selection.

use crate::models::CacheEntry;
use crate::{Error, Result};

/// Computes the cosine similarity of two vectors.
///
/// Accumulates in `f64` and clamps the result to `[-1, 1]`. A zero-norm
/// operand yields `0.0`.
///
/// # Errors
///
/// Returns [`Error::InvalidVectorInput`] if either vector is empty or the
/// lengths differ.
#[allow(clippy::cast_possible_truncation)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.is_empty() || b.is_empty() {
        return Err(Error::InvalidVectorInput("empty vector".to_string()));
    }
    if a.len() != b.len() {
        return Err(Error::InvalidVectorInput(format!(
            "dimension mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32)
}

/// A candidate selected by [`SimilarityMatcher::best_match`].
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatch<'a> {
    /// The matched entry.
    pub entry: &'a CacheEntry,
    /// Unrounded cosine similarity to the query.
    pub similarity: f32,
}

/// Linear-scan nearest neighbour with a hit threshold.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    threshold: f32,
}

impl SimilarityMatcher {
    /// Creates a matcher accepting similarities `>= threshold`.
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Returns the hit threshold.
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Finds the most similar candidate regardless of threshold.
    ///
    /// Candidates of a different dimensionality, with an empty vector, or
    /// producing a non-finite similarity are skipped, as is any candidate
    /// whose hash equals `exclude_hash`. The first candidate wins ties.
    #[must_use]
    pub fn best_match<'a>(
        &self,
        query: &[f32],
        candidates: &'a [CacheEntry],
        exclude_hash: Option<&str>,
    ) -> Option<SimilarityMatch<'a>> {
        let mut best: Option<SimilarityMatch<'a>> = None;
        for entry in candidates {
            if exclude_hash.is_some_and(|h| h == entry.image_hash) {
                continue;
            }
            if entry.vector.len() != query.len() {
                continue;
            }
            let Ok(similarity) = cosine_similarity(query, &entry.vector) else {
                continue;
            };
            if !similarity.is_finite() {
                continue;
            }
            if best.is_none_or(|b| similarity > b.similarity) {
                best = Some(SimilarityMatch { entry, similarity });
            }
        }
        best
    }

    /// Returns the best candidate if it clears the threshold.
    #[must_use]
    pub fn find<'a>(
        &self,
        query: &[f32],
        candidates: &'a [CacheEntry],
        exclude_hash: Option<&str>,
    ) -> Option<SimilarityMatch<'a>> {
        self.best_match(query, candidates, exclude_hash)
            .filter(|m| m.similarity >= self.threshold)
    }
}
