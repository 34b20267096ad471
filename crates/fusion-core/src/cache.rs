//! Cache trait for storing resolved payloads.
//!
//! This module defines the [`DataCache`] trait that provides a unified interface
//! for caching resolved payloads under normalized [`CacheKey`]s with a
//! per-entry time to live.

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::{error::Result, payload::Payload, request::CacheKey};

/// Trait for caching resolved payloads.
///
/// Implementations can store data in various backends (SQLite, in-memory, etc.)
/// to avoid repeated provider calls. An entry older than its TTL must read as
/// absent; readers observe either a complete entry or nothing.
#[async_trait]
pub trait DataCache: Send + Sync + Debug {
    /// Retrieves an unexpired payload.
    ///
    /// Returns `Ok(Some(payload))` on a hit, `Ok(None)` when absent or expired.
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>>;

    /// Stores a payload, replacing any previous entry for the key.
    async fn put(&self, key: &CacheKey, payload: &Payload, ttl: Duration) -> Result<()>;

    /// Removes expired entries.
    ///
    /// Returns the number of entries invalidated.
    async fn invalidate_stale(&self) -> Result<usize>;

    /// Clears all cached data.
    async fn clear(&self) -> Result<()>;
}
