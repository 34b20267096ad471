//! Capability tags declared by providers and carried by requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DataError;

/// A kind of data a provider can supply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Latest traded price.
    CurrentPrice,
    /// Daily OHLCV history over a range.
    HistoricalSeries,
    /// Financial ratios and company figures.
    Fundamentals,
    /// Recent news items for a symbol.
    NewsItems,
    /// Free-text analysis from a generative model.
    GenerateAnalysis,
}

impl Capability {
    /// All capabilities, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::CurrentPrice,
        Self::HistoricalSeries,
        Self::Fundamentals,
        Self::NewsItems,
        Self::GenerateAnalysis,
    ];

    /// Capabilities an analysis run cannot do without.
    pub const REQUIRED: [Self; 2] = [Self::CurrentPrice, Self::Fundamentals];

    /// Returns the stable snake_case name used in cache keys and config.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CurrentPrice => "current_price",
            Self::HistoricalSeries => "historical_series",
            Self::Fundamentals => "fundamentals",
            Self::NewsItems => "news_items",
            Self::GenerateAnalysis => "generate_analysis",
        }
    }

    /// Default lifetime of a cached result for this capability.
    ///
    /// A zero duration means results are never cached.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        match self {
            Self::CurrentPrice => Duration::from_secs(5 * 60),
            Self::HistoricalSeries => Duration::from_secs(60 * 60),
            Self::Fundamentals => Duration::from_secs(24 * 60 * 60),
            Self::NewsItems => Duration::from_secs(30 * 60),
            Self::GenerateAnalysis => Duration::ZERO,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DataError::InvalidParameter(format!("unknown capability: {s}")))
    }
}
