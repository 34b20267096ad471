#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Deterministic local fallback data provider.
//!
//! [`SyntheticProvider`] implements [`DataProvider`] for every market-data
//! capability. It never fails for a well-formed request and is always
//! available, which makes it a safe last entry in a fallback chain.

/// Sector profiles shaping synthetic values.
pub mod profile;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use fusion_core::{
    Capability, DataError, DataProvider, FinancialMetrics, HistoryRange, OhlcvBar, Payload,
    PriceHistory, Quote, Request, Result, SharedClock, Symbol, system_clock,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

pub use profile::{SectorProfile, Spread};

/// Default priority: after every real vendor.
pub const DEFAULT_PRIORITY: u8 = 250;

const CAPABILITIES: &[Capability] = &[
    Capability::CurrentPrice,
    Capability::HistoricalSeries,
    Capability::Fundamentals,
    Capability::NewsItems,
];

/// Deterministic placeholder data provider.
#[derive(Debug, Clone)]
pub struct SyntheticProvider {
    seed: u64,
    priority: u8,
    clock: SharedClock,
}

impl SyntheticProvider {
    /// Create a provider with `seed` on the system clock.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            priority: DEFAULT_PRIORITY,
            clock: system_clock(),
        }
    }

    /// Overrides the priority rank.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Uses `clock` to date quotes and bars.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Seeded generator for one symbol, stream and day.
    fn rng(&self, symbol: &Symbol, stream: u64, day: i64) -> StdRng {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in symbol.as_str().bytes() {
            hash = (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3);
        }
        let day = day as u64;
        StdRng::seed_from_u64(
            hash ^ self.seed.rotate_left(17) ^ stream.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ day,
        )
    }

    fn today(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
            .single()
            .unwrap_or(now)
    }

    /// Daily bars ending today, one per calendar day.
    fn history(&self, symbol: &Symbol, range: HistoryRange) -> PriceHistory {
        let profile = SectorProfile::for_symbol(symbol);
        let today = self.today();
        let days = i64::from(range.days());
        let mut rng = self.rng(symbol, 1, today.num_days_from_ce().into());

        // Start away from the base so the walk ends near it.
        let mut close = profile.base_price * rng.gen_range(0.9..1.1);
        let bars = (0..days)
            .map(|i| {
                let open = close;
                let change = rng.gen_range(-profile.daily_volatility..profile.daily_volatility);
                close = (open * (1.0 + change)).max(0.01);
                let high = open.max(close) * (1.0 + rng.gen_range(0.0..profile.daily_volatility));
                let low = open.min(close) * (1.0 - rng.gen_range(0.0..profile.daily_volatility));
                let volume = rng.gen_range(1_000_000.0..5_000_000.0_f64).round();
                let timestamp = today - ChronoDuration::days(days - 1 - i);
                OhlcvBar::new(timestamp, open, high, low, close, volume)
            })
            .collect();

        PriceHistory::new(symbol.clone(), bars)
    }

    fn quote(&self, symbol: &Symbol) -> Result<Quote> {
        let history = self.history(symbol, HistoryRange::OneMonth);
        let (Some(last), Some(prev)) = (
            history.bars.last(),
            history.bars.len().checked_sub(2).and_then(|i| history.bars.get(i)),
        ) else {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        };
        Ok(Quote::new(symbol.clone(), last.close, self.clock.now())
            .with_previous_close(prev.close)
            .with_volume(last.volume)
            .with_currency("INR"))
    }

    fn fundamentals(&self, symbol: &Symbol) -> FinancialMetrics {
        let profile = SectorProfile::for_symbol(symbol);
        // Fundamentals do not move day to day.
        let mut rng = self.rng(symbol, 2, 0);
        let mut draw = |s: Spread| s.center + rng.gen_range(-s.half_width..=s.half_width);

        let mut metrics = FinancialMetrics::new(symbol.clone())
            .with_market_cap(Some(draw(profile.market_cap)))
            .with_dividend_yield(Some(draw(profile.dividend_yield)));
        if !profile.is_generic() {
            metrics = metrics.with_sector(profile.sector);
        }
        for (ratio, spread) in profile.ratios {
            metrics.set(*ratio, Some(draw(*spread)));
        }
        metrics
    }
}

impl Default for SyntheticProvider {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn description(&self) -> &str {
        "Deterministic placeholder data, used when every vendor fails"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    async fn fetch(&self, request: &Request) -> Result<Payload> {
        let payload = match request {
            Request::CurrentPrice { symbol } => Payload::Price(self.quote(symbol)?),
            Request::HistoricalSeries { symbol, range } => {
                Payload::History(self.history(symbol, *range))
            }
            Request::Fundamentals { symbol } => Payload::Fundamentals(self.fundamentals(symbol)),
            Request::NewsItems { .. } => Payload::News(Vec::new()),
            Request::GenerateAnalysis { .. } => {
                return Err(DataError::NotSupported(
                    "synthetic provider does not generate analysis".to_string(),
                ));
            }
        };
        debug!(request = %request, shape = %payload.shape(), "Generated synthetic payload");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_core::{ManualClock, Ratio};
    use std::sync::Arc;

    fn provider(seed: u64) -> SyntheticProvider {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 10, 30, 0).unwrap());
        SyntheticProvider::new(seed).with_clock(Arc::new(clock))
    }

    #[tokio::test]
    async fn test_deterministic_for_seed_and_symbol() {
        let a = provider(7).fetch(&Request::current_price("TCS.NS")).await.unwrap();
        let b = provider(7).fetch(&Request::current_price("tcs.ns")).await.unwrap();
        let c = provider(8).fetch(&Request::current_price("TCS.NS")).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_quote_matches_history() {
        let p = provider(1);
        let quote = p
            .fetch(&Request::current_price("INFY.NS"))
            .await
            .unwrap()
            .into_quote()
            .unwrap();
        let history = p
            .fetch(&Request::history("INFY.NS", HistoryRange::OneMonth))
            .await
            .unwrap()
            .into_history()
            .unwrap();

        assert_eq!(history.len(), 30);
        assert_eq!(Some(quote.price), history.last().map(|b| b.close));
        assert!(quote.price > 1000.0 && quote.price < 2200.0);
        for bar in &history.bars {
            assert!(bar.low <= bar.open.min(bar.close));
            assert!(bar.high >= bar.open.max(bar.close));
        }
    }

    #[tokio::test]
    async fn test_fundamentals_follow_profile() {
        let metrics = provider(3)
            .fetch(&Request::fundamentals("TCS.NS"))
            .await
            .unwrap()
            .into_fundamentals()
            .unwrap();
        assert_eq!(metrics.sector.as_deref(), Some("IT Services"));
        let pe = metrics.get(Ratio::PriceToEarnings).unwrap();
        assert!((24.0..=30.0).contains(&pe));

        let unknown = provider(3)
            .fetch(&Request::fundamentals("ZZZ"))
            .await
            .unwrap()
            .into_fundamentals()
            .unwrap();
        assert!(unknown.sector.is_none());
        assert_eq!(unknown.available(), Ratio::ALL.len());
    }

    #[tokio::test]
    async fn test_news_is_empty_and_generation_unsupported() {
        let p = provider(0);
        assert_eq!(
            p.fetch(&Request::news("TCS.NS", 24)).await.unwrap(),
            Payload::News(Vec::new())
        );
        assert!(matches!(
            p.fetch(&Request::generate("hello")).await,
            Err(DataError::NotSupported(_))
        ));
        assert!(p.is_available().await);
        assert_eq!(p.priority(), DEFAULT_PRIORITY);
    }
}
