//! Per-provider token buckets.
//!
//! Each provider that declares a [`RateLimit`] gets a bucket holding up to
//! `max_calls` tokens that refills continuously at `max_calls / window`.
//! Providers without a declared limit are never throttled.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use fusion_core::RateLimit;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
    /// Tokens per second.
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    fn new(limit: RateLimit) -> Self {
        let capacity = f64::from(limit.max_calls.max(1));
        Self {
            tokens: capacity,
            last_update: Instant::now(),
            rate: limit.per_second(),
            capacity,
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        self.last_update = now;
    }

    fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if self.rate <= 0.0 {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64((1.0 - self.tokens) / self.rate).unwrap_or(Duration::MAX)
    }
}

/// Token bucket rate limiter keyed by provider name.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Creates a limiter with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_buckets(&self) -> MutexGuard<'_, HashMap<String, TokenBucket>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Installs a full bucket for `provider`, replacing any existing one.
    pub fn register(&self, provider: &str, limit: RateLimit) {
        debug!(
            provider,
            max_calls = limit.max_calls,
            window = ?limit.window,
            "Configured rate limit"
        );
        self.lock_buckets()
            .insert(provider.to_string(), TokenBucket::new(limit));
    }

    /// Returns true if `provider` has a bucket.
    #[must_use]
    pub fn is_limited(&self, provider: &str) -> bool {
        self.lock_buckets().contains_key(provider)
    }

    /// Takes a token without waiting.
    ///
    /// Returns false when the bucket is empty. Unlimited providers always
    /// succeed.
    pub fn try_acquire(&self, provider: &str) -> bool {
        self.lock_buckets()
            .get_mut(provider)
            .is_none_or(TokenBucket::try_acquire)
    }

    /// Time until `provider` has a token available.
    pub fn time_until_available(&self, provider: &str) -> Duration {
        self.lock_buckets()
            .get_mut(provider)
            .map_or(Duration::ZERO, TokenBucket::time_until_available)
    }

    /// Whole tokens left for `provider`, or `None` if it is unlimited.
    pub fn remaining(&self, provider: &str) -> Option<u32> {
        self.lock_buckets().get_mut(provider).map(|bucket| {
            bucket.refill();
            // Bounded by capacity, which came from a u32.
            bucket.tokens.floor() as u32
        })
    }

    /// Waits until a token is available for `provider`, then takes it.
    pub async fn acquire(&self, provider: &str) {
        loop {
            let wait = {
                let mut buckets = self.lock_buckets();
                let Some(bucket) = buckets.get_mut(provider) else {
                    return;
                };
                if bucket.try_acquire() {
                    return;
                }
                bucket.time_until_available()
            };

            debug!(provider, wait = ?wait, "Waiting for rate limit token");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bucket_exhausts_and_refills() {
        let limiter = RateLimiter::new();
        limiter.register("fmp", RateLimit::per_minute(2));

        assert!(limiter.try_acquire("fmp"));
        assert!(limiter.try_acquire("fmp"));
        assert!(!limiter.try_acquire("fmp"));
        assert_eq!(limiter.remaining("fmp"), Some(0));

        let wait = limiter.time_until_available("fmp");
        assert!(wait > Duration::from_secs(29) && wait <= Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.try_acquire("fmp"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_refill() {
        let limiter = RateLimiter::new();
        limiter.register("yahoo", RateLimit::new(1, Duration::from_secs(10)));
        assert!(limiter.try_acquire("yahoo"));

        let start = Instant::now();
        limiter.acquire("yahoo").await;
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[test]
    fn test_unlimited_provider() {
        let limiter = RateLimiter::new();
        assert!(!limiter.is_limited("synthetic"));
        for _ in 0..1000 {
            assert!(limiter.try_acquire("synthetic"));
        }
        assert_eq!(limiter.remaining("synthetic"), None);
        assert_eq!(limiter.time_until_available("synthetic"), Duration::ZERO);
    }
}
