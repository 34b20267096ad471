//! Provider traits for fetching market data and model completions.
//!
//! - [`DataProvider`] - Uniform interface over every fallible data source
//! - [`CompletionProvider`] - Generative model vendor
//! - [`RateLimit`] - Per-provider call budget enforced by the resolver

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

use crate::{
    capability::Capability,
    error::Result,
    payload::Payload,
    request::Request,
};

/// Maximum number of calls a provider accepts per window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Calls allowed per window.
    pub max_calls: u32,
    /// Window length.
    #[serde(with = "duration_secs")]
    pub window: Duration,
}

impl RateLimit {
    /// `max_calls` per `window`.
    #[must_use]
    pub const fn new(max_calls: u32, window: Duration) -> Self {
        Self { max_calls, window }
    }

    /// `max_calls` per minute.
    #[must_use]
    pub const fn per_minute(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(60))
    }

    /// Refill rate in calls per second.
    #[must_use]
    pub fn per_second(&self) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs <= 0.0 {
            f64::from(self.max_calls)
        } else {
            f64::from(self.max_calls) / secs
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// A fallible external data source.
///
/// Providers are constructed once from configuration and hold no per-call
/// state. Rate-limit counters and failure history belong to the resolver.
#[async_trait]
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "yahoo").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;

    /// Capabilities this provider can answer.
    fn capabilities(&self) -> &[Capability];

    /// Priority rank. Lower values are tried first.
    fn priority(&self) -> u8 {
        10
    }

    /// Call budget, if the vendor enforces one.
    fn rate_limit(&self) -> Option<RateLimit> {
        None
    }

    /// Returns true if this provider supports `capability`.
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Live availability check, evaluated on every resolution.
    async fn is_available(&self) -> bool {
        true
    }

    /// Fetches the payload for `request`.
    async fn fetch(&self, request: &Request) -> Result<Payload>;
}

/// A generative model vendor.
#[async_trait]
pub trait CompletionProvider: Send + Sync + Debug {
    /// Vendor name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Model identifier used for requests.
    fn model(&self) -> &str;

    /// Returns true if the vendor can be called (credentials present).
    async fn is_available(&self) -> bool {
        true
    }

    /// Sends `prompt` and returns the raw text answer.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;

    #[derive(Debug)]
    struct PriceOnly;

    #[async_trait]
    impl DataProvider for PriceOnly {
        fn name(&self) -> &str {
            "price-only"
        }

        fn description(&self) -> &str {
            "answers nothing"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::CurrentPrice]
        }

        async fn fetch(&self, _request: &Request) -> Result<Payload> {
            Err(DataError::ProviderUnavailable("price-only".into()))
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let provider = PriceOnly;
        assert_eq!(provider.priority(), 10);
        assert!(provider.rate_limit().is_none());
        assert!(provider.supports(Capability::CurrentPrice));
        assert!(!provider.supports(Capability::NewsItems));
        assert!(provider.is_available().await);
    }

    #[test]
    fn test_rate_limit_rate() {
        let limit = RateLimit::per_minute(30);
        assert!((limit.per_second() - 0.5).abs() < 1e-12);

        let parsed: RateLimit = serde_json::from_str(r#"{"max_calls":5,"window":1.5}"#).unwrap();
        assert_eq!(parsed.window, Duration::from_millis(1500));
    }
}
