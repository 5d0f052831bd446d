//! Storage layer for cache entries.
//!
//! Two implementations of [`CacheStore`]:
//! - [`SqliteCacheStore`]: durable, file-backed (or in-memory) `SQLite`
//! - [`InMemoryCacheStore`]: volatile ordered map, for tests and ephemeral caches

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]

mod memory;
pub mod sqlite;
mod traits;

pub use memory::InMemoryCacheStore;
pub use sqlite::SqliteCacheStore;
pub use traits::CacheStore;
