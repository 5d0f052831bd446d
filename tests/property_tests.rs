//! Property-based tests for cache primitives.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Content hashing is deterministic and well-formed
//! - Cosine similarity stays within [-1, 1] and is symmetric
//! - Normalized vectors have unit length
//! - Mean pooling preserves single-token output and averages tokens
//! - Mode strings roundtrip through parse
//! - Nearest-neighbour selection returns the maximum

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::cast_precision_loss)]

use ecotag_cache::embedding::{mean_pool, normalize_rounded};
use ecotag_cache::{
    CacheEntry, CacheMode, ContentHasher, EntryId, SimilarityMatcher, cosine_similarity,
};
use proptest::prelude::*;
use serde_json::json;

fn vector(len: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-100.0f32..100.0, len)
}

fn nonzero_vector(len: usize) -> impl Strategy<Value = Vec<f32>> {
    vector(len).prop_filter("non-zero norm", |v| v.iter().any(|x| x.abs() > 1e-3))
}

fn entry(id: i64, vector: Vec<f32>) -> CacheEntry {
    CacheEntry {
        id: EntryId::new(id),
        image_hash: format!("hash-{id}"),
        fingerprint_version: "v1".to_string(),
        vector,
        payload: json!(id),
        created_at: 0,
        last_hit_at: None,
        hit_count: 0,
    }
}

// ============================================================================
// Hashing
// ============================================================================

proptest! {
    /// Property: hashing the same bytes twice yields the same digest.
    #[test]
    fn prop_hash_is_deterministic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        prop_assert_eq!(ContentHasher::hash(&bytes), ContentHasher::hash(&bytes));
    }

    /// Property: digests are 64 lowercase hex characters.
    #[test]
    fn prop_hash_is_lowercase_hex(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let hash = ContentHasher::hash(&bytes);
        prop_assert_eq!(hash.len(), 64);
        prop_assert!(hash.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    /// Property: appending a byte changes the digest.
    #[test]
    fn prop_hash_distinguishes_extension(
        bytes in prop::collection::vec(any::<u8>(), 0..256),
        extra in any::<u8>(),
    ) {
        let mut extended = bytes.clone();
        extended.push(extra);
        prop_assert_ne!(ContentHasher::hash(&bytes), ContentHasher::hash(&extended));
    }
}

// ============================================================================
// Similarity
// ============================================================================

proptest! {
    /// Property: cosine similarity is bounded.
    #[test]
    fn prop_cosine_is_bounded((a, b) in (1usize..64).prop_flat_map(|n| (vector(n), vector(n)))) {
        let similarity = cosine_similarity(&a, &b).unwrap();
        prop_assert!((-1.0..=1.0).contains(&similarity));
    }

    /// Property: cosine similarity is symmetric.
    #[test]
    fn prop_cosine_is_symmetric((a, b) in (1usize..64).prop_flat_map(|n| (vector(n), vector(n)))) {
        prop_assert_eq!(
            cosine_similarity(&a, &b).unwrap(),
            cosine_similarity(&b, &a).unwrap()
        );
    }

    /// Property: a non-zero vector is maximally similar to itself.
    #[test]
    fn prop_cosine_self_is_one(a in (1usize..64).prop_flat_map(nonzero_vector)) {
        let similarity = cosine_similarity(&a, &a).unwrap();
        prop_assert!((similarity - 1.0).abs() < 1e-5, "self similarity {}", similarity);
    }

    /// Property: positive scaling does not change similarity.
    #[test]
    fn prop_cosine_is_scale_invariant(
        (a, b) in (1usize..32).prop_flat_map(|n| (nonzero_vector(n), nonzero_vector(n))),
        scale in 0.1f32..10.0,
    ) {
        let scaled: Vec<f32> = a.iter().map(|x| x * scale).collect();
        let base = cosine_similarity(&a, &b).unwrap();
        let moved = cosine_similarity(&scaled, &b).unwrap();
        prop_assert!((base - moved).abs() < 1e-4);
    }

    /// Property: vectors of different lengths are rejected.
    #[test]
    fn prop_cosine_rejects_mismatched_lengths(a in vector(3), b in vector(4)) {
        prop_assert!(cosine_similarity(&a, &b).is_err());
    }

    /// Property: the matcher picks a candidate with the highest similarity.
    #[test]
    fn prop_best_match_is_maximal(
        (query, candidates) in (2usize..16).prop_flat_map(|n| {
            (nonzero_vector(n), prop::collection::vec(nonzero_vector(n), 1..12))
        }),
    ) {
        let entries: Vec<CacheEntry> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, v)| entry(i as i64, v))
            .collect();
        let matcher = SimilarityMatcher::new(-1.0);
        let best = matcher.best_match(&query, &entries, None).unwrap();

        for candidate in &entries {
            let similarity = cosine_similarity(&query, &candidate.vector).unwrap();
            prop_assert!(similarity <= best.similarity);
        }
        prop_assert!(matcher.find(&query, &entries, None).is_some());
    }

    /// Property: an excluded hash is never returned.
    #[test]
    fn prop_excluded_hash_never_matches(
        (query, candidates) in (2usize..8).prop_flat_map(|n| {
            (nonzero_vector(n), prop::collection::vec(nonzero_vector(n), 1..6))
        }),
    ) {
        let entries: Vec<CacheEntry> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, v)| entry(i as i64, v))
            .collect();
        let matcher = SimilarityMatcher::new(-1.0);
        let found = matcher.best_match(&query, &entries, Some("hash-0"));
        prop_assert!(found.is_none_or(|m| m.entry.image_hash != "hash-0"));
    }
}

// ============================================================================
// Vector post-processing
// ============================================================================

proptest! {
    /// Property: normalized vectors have unit L2 norm.
    #[test]
    fn prop_normalize_has_unit_norm(v in (1usize..128).prop_flat_map(nonzero_vector)) {
        let normalized = normalize_rounded(&v).unwrap();
        let norm: f64 = normalized
            .iter()
            .map(|x| f64::from(*x) * f64::from(*x))
            .sum::<f64>()
            .sqrt();
        prop_assert!((norm - 1.0).abs() < 1e-5, "norm {}", norm);
        prop_assert_eq!(normalized.len(), v.len());
    }

    /// Property: an all-zero vector cannot be normalized.
    #[test]
    fn prop_normalize_rejects_zero(len in 1usize..64) {
        prop_assert!(normalize_rounded(&vec![0.0f32; len]).is_none());
    }

    /// Property: single-token output passes through pooling unchanged.
    #[test]
    fn prop_mean_pool_single_token_passthrough(v in (1usize..64).prop_flat_map(vector)) {
        let dims = [1, v.len()];
        prop_assert_eq!(mean_pool(v.clone(), &dims), v);
    }

    /// Property: identical tokens pool to that token.
    #[test]
    fn prop_mean_pool_identical_tokens(
        token in (1usize..32).prop_flat_map(vector),
        tokens in 2usize..8,
    ) {
        let data: Vec<f32> = std::iter::repeat_n(token.clone(), tokens).flatten().collect();
        let pooled = mean_pool(data, &[1, tokens, token.len()]);
        prop_assert_eq!(pooled.len(), token.len());
        for (p, t) in pooled.iter().zip(&token) {
            prop_assert!((p - t).abs() < 1e-3);
        }
    }
}

// ============================================================================
// Configuration values
// ============================================================================

proptest! {
    /// Property: `CacheMode` parsing roundtrips and ignores case and padding.
    #[test]
    fn prop_cache_mode_roundtrips(
        mode in prop_oneof![
            Just(CacheMode::Exact),
            Just(CacheMode::Semantic),
            Just(CacheMode::Tiered),
        ],
        upper in any::<bool>(),
        pad in 0usize..3,
    ) {
        let mut text = mode.as_str().to_string();
        if upper {
            text = text.to_uppercase();
        }
        let padded = format!("{}{text}{}", " ".repeat(pad), " ".repeat(pad));
        prop_assert_eq!(CacheMode::parse(&padded), Some(mode));
    }

    /// Property: unknown mode strings are rejected.
    #[test]
    fn prop_cache_mode_rejects_unknown(s in "[a-z]{1,12}") {
        prop_assume!(!matches!(s.as_str(), "exact" | "semantic" | "tiered"));
        prop_assert!(CacheMode::parse(&s).is_none());
    }
}
