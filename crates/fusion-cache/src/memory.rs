//! In-memory cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fusion_core::{CacheKey, DataCache, Payload, Result, SharedClock, system_clock};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::is_expired;

/// Cache entry with timestamp for TTL-based invalidation.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Payload,
    created_at: DateTime<Utc>,
    ttl: Duration,
}

impl CacheEntry {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.created_at, self.ttl, now)
    }
}

/// In-process cache.
///
/// Entries live in a `RwLock`-protected `HashMap` and are lost when the cache
/// is dropped. Writers replace whole entries, so readers never see a partial
/// value.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    clock: SharedClock,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    /// Create a new empty in-memory cache on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create a cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, including ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DataCache for InMemoryCache {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        let now = self.clock.now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_stale(now) => {
                    debug!("Cache hit");
                    return Ok(Some(entry.payload.clone()));
                }
                Some(_) => {}
                None => {
                    debug!("Cache miss");
                    return Ok(None);
                }
            }
        }

        // Expired: drop it unless a writer replaced it in the meantime.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_stale(now)) {
            entries.remove(key);
        }
        debug!("Cache entry expired");
        Ok(None)
    }

    #[instrument(skip(self, payload), fields(key = %key))]
    async fn put(&self, key: &CacheKey, payload: &Payload, ttl: Duration) -> Result<()> {
        let entry = CacheEntry {
            payload: payload.clone(),
            created_at: self.clock.now(),
            ttl,
        };
        self.entries.write().await.insert(key.clone(), entry);
        debug!(shape = %payload.shape(), ttl_secs = ttl.as_secs(), "Cached payload");
        Ok(())
    }

    async fn invalidate_stale(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(now));
        let removed = before - entries.len();
        debug!(removed, "Invalidated stale entries");
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        debug!("Cleared in-memory cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use fusion_core::{ManualClock, Quote, Request, Symbol};
    use std::sync::Arc;

    fn price(symbol: &str, value: f64) -> Payload {
        let as_of = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
        Payload::Price(Quote::new(Symbol::new(symbol), value, as_of))
    }

    fn cache_at_start() -> (InMemoryCache, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap());
        (InMemoryCache::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_round_trip_within_ttl() {
        let (cache, clock) = cache_at_start();
        let key = Request::current_price("ABC").cache_key();
        let payload = price("ABC", 100.0);

        cache.put(&key, &payload, Duration::from_secs(300)).await.unwrap();
        clock.advance(Duration::from_secs(120));

        assert_eq!(cache.get(&key).await.unwrap(), Some(payload));
    }

    #[tokio::test]
    async fn test_absent_after_ttl_and_removed() {
        let (cache, clock) = cache_at_start();
        let key = Request::current_price("ABC").cache_key();

        cache
            .put(&key, &price("ABC", 100.0), Duration::from_secs(300))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(300));
        assert!(cache.get(&key).await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get(&key).await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_put_replaces_entry() {
        let (cache, _clock) = cache_at_start();
        let key = Request::current_price("ABC").cache_key();

        cache
            .put(&key, &price("ABC", 100.0), Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put(&key, &price("ABC", 105.0), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get(&key).await.unwrap(), Some(price("ABC", 105.0)));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_stale_and_clear() {
        let (cache, clock) = cache_at_start();
        let short = Request::current_price("ABC").cache_key();
        let long = Request::fundamentals("ABC").cache_key();

        cache
            .put(&short, &price("ABC", 1.0), Duration::from_secs(10))
            .await
            .unwrap();
        cache
            .put(&long, &price("ABC", 1.0), Duration::from_secs(1000))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(11));

        assert_eq!(cache.invalidate_stale().await.unwrap(), 1);
        assert_eq!(cache.len().await, 1);

        cache.clear().await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_entries() {
        let (cache, _clock) = cache_at_start();
        let cache = Arc::new(cache);
        let key = Request::current_price("ABC").cache_key();

        let mut handles = Vec::new();
        for i in 0..8 {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .put(&key, &price("ABC", f64::from(i)), Duration::from_secs(60))
                    .await
                    .unwrap();
                cache.get(&key).await.unwrap()
            }));
        }

        for handle in handles {
            let seen = handle.await.unwrap().unwrap();
            let quote = seen.into_quote().unwrap();
            assert_eq!(quote.symbol, Symbol::new("ABC"));
            assert!((0.0..8.0).contains(&quote.price));
        }
    }
}
