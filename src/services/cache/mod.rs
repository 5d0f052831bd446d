//! Tiered perceptual image cache.
//!
//! ```text
//! image bytes ──► ContentHasher ──► exact tier (get_by_hash)
//!                     │                  │ miss
//!                     ▼                  ▼
//!              ImageEmbedder ──► semantic tier (list_by_version + SimilarityMatcher)
//!                                        │
//!                                        ▼
//!                         HIT_EXACT / HIT_SEMANTIC / MISS
//! ```

mod eviction;
mod hasher;
mod matcher;
mod service;
mod types;

pub use eviction::prune_to_capacity;
pub use hasher::ContentHasher;
pub use matcher::{SimilarityMatch, SimilarityMatcher, cosine_similarity};
pub use service::CacheService;
pub use types::{CacheStats, StoreOutcome, StoreRequest};
