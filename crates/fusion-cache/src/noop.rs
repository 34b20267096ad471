//! No-op cache implementation.

use async_trait::async_trait;
use fusion_core::{CacheKey, DataCache, Payload, Result};
use std::time::Duration;
use tracing::trace;

/// A no-op cache that doesn't store anything.
///
/// `get` always returns `Ok(None)` and `put` always returns `Ok(())`.
/// Useful for disabling caching or testing code paths without cache hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl NoopCache {
    /// Create a new no-op cache.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataCache for NoopCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        trace!(%key, "NoopCache: get called, returning None");
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, _payload: &Payload, _ttl: Duration) -> Result<()> {
        trace!(%key, "NoopCache: put called, doing nothing");
        Ok(())
    }

    async fn invalidate_stale(&self) -> Result<usize> {
        Ok(0)
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}
