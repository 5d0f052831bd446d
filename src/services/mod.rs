//! Business logic services.
//!
//! Services orchestrate the embedders and the store and provide the
//! high-level cache operations.

pub mod cache;

pub use cache::{CacheService, CacheStats, StoreOutcome, StoreRequest};
