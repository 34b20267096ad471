//! Provider health table and exponential backoff.
//!
//! A failing provider is skipped for `base * 2^(n-1)` after its `n`-th
//! consecutive failure, capped at `max`. Once the window passes it is tried
//! again; a single success clears its record. Providers are never disabled
//! for good.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use fusion_core::{DataProvider, SharedClock, system_clock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::secs;

/// Backoff window parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Window after the first failure.
    #[serde(with = "secs")]
    pub base: Duration,
    /// Longest window.
    #[serde(with = "secs")]
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            max: Duration::from_secs(10 * 60),
        }
    }
}

impl BackoffPolicy {
    /// Window after `failures` consecutive failures.
    #[must_use]
    pub fn window(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Coarse state of a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderState {
    /// No failure since the last success.
    Healthy,
    /// Failed recently but the backoff window has passed.
    Degraded,
    /// Inside a backoff window; skipped by the resolver.
    BackingOff,
    /// Out of call budget, locally or at the vendor.
    RateLimited,
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::BackingOff => "backing off",
            Self::RateLimited => "rate limited",
        })
    }
}

/// What the table knows about one provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEntry {
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time of the most recent failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// End of the current backoff window.
    pub unhealthy_until: Option<DateTime<Utc>>,
    /// Time of the most recent success.
    pub last_success: Option<DateTime<Utc>>,
    /// Set when the vendor rate limited us after the last success.
    pub rate_limited: bool,
}

/// Failure history of every provider the resolver has called.
#[derive(Debug)]
pub struct HealthTable {
    policy: BackoffPolicy,
    clock: SharedClock,
    entries: Mutex<HashMap<String, HealthEntry>>,
}

impl Default for HealthTable {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl HealthTable {
    /// Creates an empty table using the system clock.
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_clock(policy, system_clock())
    }

    /// Creates an empty table reading time from `clock`.
    #[must_use]
    pub fn with_clock(policy: BackoffPolicy, clock: SharedClock) -> Self {
        Self {
            policy,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The backoff policy.
    #[must_use]
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, HealthEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Health table mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Clears the failure record of `provider`.
    pub fn record_success(&self, provider: &str) {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let entry = entries.entry(provider.to_string()).or_default();
        if entry.consecutive_failures > 0 {
            info!(
                provider,
                failures = entry.consecutive_failures,
                "Provider recovered"
            );
        }
        entry.consecutive_failures = 0;
        entry.unhealthy_until = None;
        entry.rate_limited = false;
        entry.last_success = Some(now);
    }

    /// Counts a failure and opens a backoff window.
    ///
    /// Returns the window length.
    pub fn record_failure(&self, provider: &str) -> Duration {
        let now = self.clock.now();
        let mut entries = self.lock_entries();
        let entry = entries.entry(provider.to_string()).or_default();
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_failure = Some(now);

        let window = self.policy.window(entry.consecutive_failures);
        let until = TimeDelta::from_std(window)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        entry.unhealthy_until = Some(until);
        window
    }

    /// Notes that the vendor refused a call for rate reasons.
    ///
    /// Not a failure: no backoff window is opened.
    pub fn record_rate_limited(&self, provider: &str) {
        self.lock_entries()
            .entry(provider.to_string())
            .or_default()
            .rate_limited = true;
    }

    /// Time left in the backoff window of `provider`, if inside one.
    #[must_use]
    pub fn backoff_remaining(&self, provider: &str) -> Option<Duration> {
        let now = self.clock.now();
        let until = self.lock_entries().get(provider)?.unhealthy_until?;
        (until > now).then(|| (until - now).to_std().unwrap_or(Duration::MAX))
    }

    /// Returns true while `provider` is inside its backoff window.
    #[must_use]
    pub fn is_backing_off(&self, provider: &str) -> bool {
        self.backoff_remaining(provider).is_some()
    }

    /// Snapshot of the entry for `provider`.
    #[must_use]
    pub fn entry(&self, provider: &str) -> HealthEntry {
        self.lock_entries().get(provider).cloned().unwrap_or_default()
    }

    /// Coarse state of `provider`.
    #[must_use]
    pub fn state(&self, provider: &str) -> ProviderState {
        let entry = self.entry(provider);
        if self.is_backing_off(provider) {
            ProviderState::BackingOff
        } else if entry.rate_limited {
            ProviderState::RateLimited
        } else if entry.consecutive_failures > 0 {
            ProviderState::Degraded
        } else {
            ProviderState::Healthy
        }
    }

    /// Orders `providers` for a resolution attempt.
    ///
    /// Sorted by priority. Within a priority, configuration order is kept
    /// except that providers whose last outcome was a failure go after the
    /// rest, the most recently failed last.
    #[must_use]
    pub fn order(&self, mut providers: Vec<Arc<dyn DataProvider>>) -> Vec<Arc<dyn DataProvider>> {
        let entries = self.lock_entries();
        providers.sort_by_cached_key(|provider| {
            let failed_at = entries
                .get(provider.name())
                .filter(|e| e.consecutive_failures > 0)
                .and_then(|e| e.last_failure);
            (provider.priority(), failed_at.is_some(), failed_at)
        });
        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use fusion_core::{Capability, ManualClock, Payload, Request, Result};

    #[derive(Debug)]
    struct Named(&'static str, u8);

    #[async_trait]
    impl DataProvider for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test provider"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::CurrentPrice]
        }

        fn priority(&self) -> u8 {
            self.1
        }

        async fn fetch(&self, _request: &Request) -> Result<Payload> {
            unreachable!("never fetched")
        }
    }

    fn table() -> (HealthTable, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        let policy = BackoffPolicy {
            base: Duration::from_secs(5),
            max: Duration::from_secs(60),
        };
        (HealthTable::with_clock(policy, Arc::new(clock.clone())), clock)
    }

    fn names(providers: &[Arc<dyn DataProvider>]) -> Vec<&str> {
        providers.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(5),
            max: Duration::from_secs(60),
        };
        assert_eq!(policy.window(0), Duration::ZERO);
        assert_eq!(policy.window(1), Duration::from_secs(5));
        assert_eq!(policy.window(2), Duration::from_secs(10));
        assert_eq!(policy.window(4), Duration::from_secs(40));
        assert_eq!(policy.window(5), Duration::from_secs(60));
        assert_eq!(policy.window(200), Duration::from_secs(60));
    }

    #[test]
    fn test_window_expires_and_success_resets() {
        let (table, clock) = table();

        assert_eq!(table.record_failure("yahoo"), Duration::from_secs(5));
        assert!(table.is_backing_off("yahoo"));
        assert_eq!(table.state("yahoo"), ProviderState::BackingOff);

        clock.advance(Duration::from_secs(6));
        assert!(!table.is_backing_off("yahoo"));
        assert_eq!(table.state("yahoo"), ProviderState::Degraded);

        assert_eq!(table.record_failure("yahoo"), Duration::from_secs(10));
        table.record_success("yahoo");
        assert!(!table.is_backing_off("yahoo"));
        assert_eq!(table.state("yahoo"), ProviderState::Healthy);
        assert_eq!(table.entry("yahoo").consecutive_failures, 0);
    }

    #[test]
    fn test_rate_limited_is_not_a_failure() {
        let (table, _clock) = table();
        table.record_rate_limited("fmp");
        assert!(!table.is_backing_off("fmp"));
        assert_eq!(table.entry("fmp").consecutive_failures, 0);
        assert_eq!(table.state("fmp"), ProviderState::RateLimited);
    }

    #[test]
    fn test_order_biases_failed_providers() {
        let (table, clock) = table();
        let providers: Vec<Arc<dyn DataProvider>> = vec![
            Arc::new(Named("a", 1)),
            Arc::new(Named("b", 1)),
            Arc::new(Named("c", 1)),
            Arc::new(Named("low", 9)),
            Arc::new(Named("top", 0)),
        ];
        assert_eq!(
            names(&table.order(providers.clone())),
            ["top", "a", "b", "c", "low"]
        );

        table.record_failure("b");
        clock.advance(Duration::from_secs(1));
        table.record_failure("a");
        assert_eq!(
            names(&table.order(providers.clone())),
            ["top", "c", "b", "a", "low"]
        );

        table.record_success("a");
        assert_eq!(names(&table.order(providers)), ["top", "a", "c", "b", "low"]);
    }
}
