//! `SQLite` cache store and its connection and metrics helpers.
//!
//! - [`connection`]: lock acquisition with poison recovery, pragma setup, file opening
//! - [`metrics`]: per-operation counters and latency histograms
//! - [`store`]: the [`SqliteCacheStore`] itself

mod connection;
mod metrics;
mod store;

pub use connection::{acquire_lock, configure_connection};
pub use metrics::record_store_metrics;
pub use store::SqliteCacheStore;
