//! Capability resolution with cache, fallback and backoff.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fusion_cache::InMemoryCache;
use fusion_core::{
    Attempt, CacheKey, Capability, DataCache, DataError, DataProvider, Payload, Request, Result,
    SharedClock, system_clock,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::config::{CacheTtls, ResolverSettings};
use crate::health::{HealthTable, ProviderState};
use crate::rate_limit::RateLimiter;

/// Where a resolved payload came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// An unexpired cache entry.
    Cache,
    /// A provider call, by provider name.
    Provider(String),
    /// The last value resolved for the key, after every provider failed.
    LastKnown,
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => f.write_str("cache"),
            Self::Provider(name) => f.write_str(name),
            Self::LastKnown => f.write_str("last known"),
        }
    }
}

/// A payload and its origin.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolved {
    /// The resolved value.
    pub payload: Payload,
    /// Where it came from.
    pub source: ResolutionSource,
}

/// Health snapshot of one provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderReport {
    /// Provider name.
    pub name: String,
    /// Priority rank.
    pub priority: u8,
    /// Declared capabilities.
    pub capabilities: Vec<Capability>,
    /// Result of the live availability check.
    pub available: bool,
    /// Coarse state.
    pub state: ProviderState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time of the most recent failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Time left in the backoff window.
    pub backoff_remaining: Option<Duration>,
    /// Call tokens left, `None` when the provider has no declared limit.
    pub remaining_tokens: Option<u32>,
}

/// Builder for [`FallbackResolver`].
#[derive(Debug, Default)]
pub struct ResolverBuilder {
    providers: Vec<Arc<dyn DataProvider>>,
    cache: Option<Arc<dyn DataCache>>,
    settings: ResolverSettings,
    clock: Option<SharedClock>,
}

impl ResolverBuilder {
    /// Creates a builder with default settings and no providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider. Registration order breaks priority ties.
    #[must_use]
    pub fn with_provider(self, provider: impl DataProvider + 'static) -> Self {
        self.with_shared_provider(Arc::new(provider))
    }

    /// Registers an already shared provider.
    #[must_use]
    pub fn with_shared_provider(mut self, provider: Arc<dyn DataProvider>) -> Self {
        debug!(
            provider = provider.name(),
            priority = provider.priority(),
            "Registering provider"
        );
        self.providers.push(provider);
        self
    }

    /// Uses `cache` instead of a fresh in-memory cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn DataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Overrides timeouts, backoff and TTLs.
    #[must_use]
    pub const fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Reads time from `clock` for backoff windows and the default cache.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the resolver, creating one token bucket per limited provider.
    #[must_use]
    pub fn build(self) -> FallbackResolver {
        let clock = self.clock.unwrap_or_else(system_clock);
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(InMemoryCache::with_clock(clock.clone())));

        let limiter = RateLimiter::new();
        let mut seen = BTreeSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name().to_string()) {
                warn!(
                    provider = provider.name(),
                    "Duplicate provider name, health and rate limits will be shared"
                );
            }
            if let Some(limit) = provider.rate_limit() {
                limiter.register(provider.name(), limit);
            }
        }

        FallbackResolver {
            providers: self.providers,
            cache,
            health: HealthTable::with_clock(self.settings.backoff, clock),
            limiter,
            ttls: self.settings.ttls,
            call_timeout: self.settings.call_timeout,
            max_rate_limit_wait: self.settings.max_rate_limit_wait,
            last_known: RwLock::new(HashMap::new()),
        }
    }
}

/// Resolves requests against prioritized providers.
///
/// Results come from the cache when fresh, otherwise from the first provider
/// in priority order that answers. Failing providers back off exponentially;
/// providers out of call budget are retried once their bucket refills.
///
/// # Example
///
/// ```rust,ignore
/// use fusion::{ResolverBuilder, Request, SyntheticProvider, YahooProvider};
///
/// let resolver = ResolverBuilder::new()
///     .with_provider(YahooProvider::new())
///     .with_provider(SyntheticProvider::new(42))
///     .build();
///
/// let resolved = resolver.resolve(&Request::current_price("TCS.NS")).await?;
/// println!("{} from {}", resolved.payload.into_quote()?.price, resolved.source);
/// ```
#[derive(Debug)]
pub struct FallbackResolver {
    providers: Vec<Arc<dyn DataProvider>>,
    cache: Arc<dyn DataCache>,
    health: HealthTable,
    limiter: RateLimiter,
    ttls: CacheTtls,
    call_timeout: Duration,
    max_rate_limit_wait: Duration,
    last_known: RwLock<HashMap<CacheKey, Payload>>,
}

impl FallbackResolver {
    /// Shortcut for [`ResolverBuilder::new`].
    #[must_use]
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Registered providers in registration order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn DataProvider>] {
        &self.providers
    }

    /// The cache in front of the providers.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn DataCache> {
        &self.cache
    }

    /// The provider health table.
    #[must_use]
    pub const fn health(&self) -> &HealthTable {
        &self.health
    }

    /// Returns true if some provider declares `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.providers.iter().any(|p| p.supports(capability))
    }

    fn read_last_known(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, Payload>> {
        self.last_known.read().unwrap_or_else(|poisoned| {
            warn!("Last-known map was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_last_known(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, Payload>> {
        self.last_known.write().unwrap_or_else(|poisoned| {
            warn!("Last-known map was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Last payload successfully resolved for `request`, expired or not.
    #[must_use]
    pub fn last_known(&self, request: &Request) -> Option<Payload> {
        self.read_last_known().get(&request.cache_key()).cloned()
    }

    /// Resolves `request`.
    ///
    /// # Errors
    ///
    /// [`DataError::ProviderNotConfigured`] when no provider declares the
    /// capability, [`DataError::AllProvidersExhausted`] when every candidate
    /// failed or was skipped.
    #[instrument(skip_all, fields(request = %request))]
    pub async fn resolve(&self, request: &Request) -> Result<Resolved> {
        let capability = request.capability();
        let candidates: Vec<_> = self
            .providers
            .iter()
            .filter(|p| p.supports(capability))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(DataError::ProviderNotConfigured(format!(
                "no provider supports {capability}"
            )));
        }

        let key = request.cache_key();
        let ttl = self.ttls.get(capability);
        if !ttl.is_zero() {
            match self.cache.get(&key).await {
                Ok(Some(payload)) if payload.capability() == capability => {
                    debug!(key = %key, "Cache hit");
                    return Ok(Resolved {
                        payload,
                        source: ResolutionSource::Cache,
                    });
                }
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "Cache read failed"),
            }
        }

        let mut attempts = Vec::new();
        let mut deferred = Vec::new();

        for provider in self.health.order(candidates) {
            let name = provider.name();
            if let Some(remaining) = self.health.backoff_remaining(name) {
                attempts.push(Attempt::new(name, format!("backing off for {remaining:?}")));
                continue;
            }
            if !provider.is_available().await {
                debug!(provider = name, "Provider unavailable");
                attempts.push(Attempt::new(name, "unavailable"));
                continue;
            }
            if !self.limiter.try_acquire(name) {
                debug!(provider = name, "Call budget exhausted, deferring");
                deferred.push(provider);
                continue;
            }
            match self.attempt(provider.as_ref(), request, &key, ttl).await {
                Ok(resolved) => return Ok(resolved),
                Err(attempt) => attempts.push(attempt),
            }
        }

        // Budget-limited providers get one more chance once a token frees up.
        for provider in deferred {
            let name = provider.name();
            let wait = self.limiter.time_until_available(name);
            if wait > self.max_rate_limit_wait {
                attempts.push(Attempt::new(
                    name,
                    format!("call budget exhausted, next token in {wait:?}"),
                ));
                continue;
            }
            // Other waiters queue on the same bucket, so the sampled wait is
            // only a lower bound.
            if tokio::time::timeout(self.max_rate_limit_wait, self.limiter.acquire(name))
                .await
                .is_err()
            {
                debug!(provider = name, "Gave up waiting for a call token");
                attempts.push(Attempt::new(
                    name,
                    format!("no call token within {:?}", self.max_rate_limit_wait),
                ));
                continue;
            }
            match self.attempt(provider.as_ref(), request, &key, ttl).await {
                Ok(resolved) => return Ok(resolved),
                Err(attempt) => attempts.push(attempt),
            }
        }

        warn!(attempts = attempts.len(), "All providers exhausted");
        Err(DataError::AllProvidersExhausted {
            capability,
            attempts,
        })
    }

    /// Resolves `request`, falling back to the last known value when every
    /// provider fails.
    ///
    /// # Errors
    ///
    /// As [`resolve`](Self::resolve), when there is no last known value.
    pub async fn resolve_or_last_known(&self, request: &Request) -> Result<Resolved> {
        match self.resolve(request).await {
            Err(err @ DataError::AllProvidersExhausted { .. }) => match self.last_known(request) {
                Some(payload) => {
                    warn!(request = %request, "Using last known value");
                    Ok(Resolved {
                        payload,
                        source: ResolutionSource::LastKnown,
                    })
                }
                None => Err(err),
            },
            other => other,
        }
    }

    async fn attempt(
        &self,
        provider: &dyn DataProvider,
        request: &Request,
        key: &CacheKey,
        ttl: Duration,
    ) -> std::result::Result<Resolved, Attempt> {
        let name = provider.name();
        debug!(provider = name, "Calling provider");

        let outcome = match tokio::time::timeout(self.call_timeout, provider.fetch(request)).await {
            Ok(Ok(payload)) => payload
                .expect_capability(request.capability(), name)
                .map(|()| payload),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DataError::Timeout {
                provider: name.to_string(),
                elapsed: self.call_timeout,
            }),
        };

        match outcome {
            Ok(payload) => {
                self.health.record_success(name);
                self.remember(key, &payload, ttl).await;
                debug!(provider = name, "Resolved");
                Ok(Resolved {
                    payload,
                    source: ResolutionSource::Provider(name.to_string()),
                })
            }
            Err(e) if !e.is_hard_failure() => {
                self.health.record_rate_limited(name);
                info!(provider = name, error = %e, "Provider rate limited, trying next");
                Err(Attempt::new(name, e.to_string()))
            }
            Err(e) if e.is_request_specific() => {
                debug!(provider = name, error = %e, "Provider cannot answer, trying next");
                Err(Attempt::new(name, e.to_string()))
            }
            Err(e) => {
                let backoff = self.health.record_failure(name);
                warn!(
                    provider = name,
                    error = %e,
                    backoff = ?backoff,
                    "Provider failed, trying next"
                );
                Err(Attempt::new(name, e.to_string()))
            }
        }
    }

    /// Caches `payload` and keeps it as the last known value. Completions
    /// are keyed by prompt and never kept.
    async fn remember(&self, key: &CacheKey, payload: &Payload, ttl: Duration) {
        if !ttl.is_zero() {
            if let Err(e) = self.cache.put(key, payload, ttl).await {
                warn!(key = %key, error = %e, "Failed to cache payload");
            }
        }
        if payload.capability() != Capability::GenerateAnalysis {
            self.write_last_known().insert(key.clone(), payload.clone());
        }
    }

    /// Per-provider health snapshot.
    pub async fn health_report(&self) -> Vec<ProviderReport> {
        let mut report = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let name = provider.name();
            let entry = self.health.entry(name);
            let remaining_tokens = self.limiter.remaining(name);
            let state = match (self.health.state(name), remaining_tokens) {
                (ProviderState::BackingOff, _) => ProviderState::BackingOff,
                (_, Some(0)) => ProviderState::RateLimited,
                (state, _) => state,
            };
            report.push(ProviderReport {
                name: name.to_string(),
                priority: provider.priority(),
                capabilities: provider.capabilities().to_vec(),
                available: provider.is_available().await,
                state,
                consecutive_failures: entry.consecutive_failures,
                last_failure: entry.last_failure,
                backoff_remaining: self.health.backoff_remaining(name),
                remaining_tokens,
            });
        }
        report
    }
}
