#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! TTL cache backends for resolved market data.
//!
//! Every backend stores whole payloads under a [`fusion_core::CacheKey`] and
//! reads an entry as absent once its TTL has elapsed:
//!
//! - [`SqliteCache`] - Survives restarts (requires the `sqlite` feature)
//! - [`InMemoryCache`] - Process-local map with an injectable clock
//! - [`NoopCache`] - Stores nothing

/// In-memory cache implementation.
pub mod memory;
/// No-op cache implementation.
pub mod noop;

/// SQLite-based cache implementation.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use fusion_core::DataCache;

// Re-export implementations
pub use memory::InMemoryCache;
pub use noop::NoopCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCache;

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Returns true once `ttl` has elapsed since `created_at`.
///
/// An entry is still fresh at exactly `created_at + ttl`.
pub(crate) fn is_expired(created_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(created_at);
    age > TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}
