//! Data models for the image cache.
//!
//! This module contains the cache record and the lookup outcome types that
//! flow between the store, the orchestrator, and the calling layer.

mod entry;
mod lookup;

pub use entry::{CacheEntry, EntryId, NewCacheEntry};
pub use lookup::{
    CacheMode, EmbedderId, LookupArtifacts, LookupResult, LookupStatus, LookupTiming,
    round_to_decimals,
};
