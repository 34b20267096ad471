//! Capability requests and the cache keys they normalize into.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capability::Capability;
use crate::types::{HistoryRange, Symbol};

/// A request for one capability with its parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum Request {
    /// Latest price for a symbol.
    CurrentPrice {
        /// Symbol to quote.
        symbol: Symbol,
    },
    /// Daily history for a symbol.
    HistoricalSeries {
        /// Symbol of the series.
        symbol: Symbol,
        /// Look-back range.
        range: HistoryRange,
    },
    /// Ratios and company figures.
    Fundamentals {
        /// Symbol to describe.
        symbol: Symbol,
    },
    /// News for a symbol over a look-back window.
    NewsItems {
        /// Symbol the news must mention.
        symbol: Symbol,
        /// Look-back window in hours.
        lookback_hours: u32,
    },
    /// Generative analysis of a prompt.
    GenerateAnalysis {
        /// Full prompt text.
        prompt: String,
    },
}

impl Request {
    /// Latest price request.
    #[must_use]
    pub fn current_price(symbol: impl Into<Symbol>) -> Self {
        Self::CurrentPrice {
            symbol: symbol.into(),
        }
    }

    /// Historical series request.
    #[must_use]
    pub fn history(symbol: impl Into<Symbol>, range: HistoryRange) -> Self {
        Self::HistoricalSeries {
            symbol: symbol.into(),
            range,
        }
    }

    /// Fundamentals request.
    #[must_use]
    pub fn fundamentals(symbol: impl Into<Symbol>) -> Self {
        Self::Fundamentals {
            symbol: symbol.into(),
        }
    }

    /// News request.
    #[must_use]
    pub fn news(symbol: impl Into<Symbol>, lookback_hours: u32) -> Self {
        Self::NewsItems {
            symbol: symbol.into(),
            lookback_hours,
        }
    }

    /// Generative analysis request.
    #[must_use]
    pub fn generate(prompt: impl Into<String>) -> Self {
        Self::GenerateAnalysis {
            prompt: prompt.into(),
        }
    }

    /// Capability this request asks for.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::CurrentPrice { .. } => Capability::CurrentPrice,
            Self::HistoricalSeries { .. } => Capability::HistoricalSeries,
            Self::Fundamentals { .. } => Capability::Fundamentals,
            Self::NewsItems { .. } => Capability::NewsItems,
            Self::GenerateAnalysis { .. } => Capability::GenerateAnalysis,
        }
    }

    /// Symbol the request concerns, if any.
    #[must_use]
    pub const fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::CurrentPrice { symbol }
            | Self::HistoricalSeries { symbol, .. }
            | Self::Fundamentals { symbol }
            | Self::NewsItems { symbol, .. } => Some(symbol),
            Self::GenerateAnalysis { .. } => None,
        }
    }

    /// Normalized cache key.
    ///
    /// Completions are never cached, so a prompt is keyed by its length only
    /// and its text never reaches a cache backend.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        let params = match self {
            Self::CurrentPrice { symbol } | Self::Fundamentals { symbol } => symbol.to_string(),
            Self::HistoricalSeries { symbol, range } => format!("{symbol}:{range}"),
            Self::NewsItems {
                symbol,
                lookback_hours,
            } => format!("{symbol}:{lookback_hours}h"),
            Self::GenerateAnalysis { prompt } => prompt.len().to_string(),
        };
        CacheKey {
            capability: self.capability(),
            params,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerateAnalysis { prompt } => {
                write!(f, "generate_analysis({} chars)", prompt.len())
            }
            other => write!(f, "{}", other.cache_key()),
        }
    }
}

/// Cache key: capability plus normalized parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Capability of the cached value.
    pub capability: Capability,
    /// Normalized parameter string.
    pub params: String,
}

impl CacheKey {
    /// Builds a key from raw parts.
    #[must_use]
    pub fn new(capability: Capability, params: impl Into<String>) -> Self {
        Self {
            capability,
            params: params.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.capability, self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_normalize_symbol() {
        assert_eq!(
            Request::current_price("tcs.ns").cache_key(),
            Request::current_price("TCS.NS").cache_key()
        );
        assert_eq!(
            Request::current_price("abc").cache_key().to_string(),
            "current_price:ABC"
        );
        assert_eq!(
            Request::history("abc", HistoryRange::ThreeMonths)
                .cache_key()
                .to_string(),
            "historical_series:ABC:3mo"
        );
        assert_eq!(
            Request::news("abc", 48).cache_key().to_string(),
            "news_items:ABC:48h"
        );
    }

    #[test]
    fn test_keys_distinguish_capabilities() {
        assert_ne!(
            Request::current_price("ABC").cache_key(),
            Request::fundamentals("ABC").cache_key()
        );
    }

    #[test]
    fn test_prompt_key_omits_text() {
        let key = Request::generate("analyze ABC").cache_key();
        assert_eq!(key.to_string(), "generate_analysis:11");
        assert!(!key.params.contains("ABC"));
    }

    #[test]
    fn test_display_hides_prompt() {
        let req = Request::generate("secret portfolio details");
        assert_eq!(req.to_string(), "generate_analysis(24 chars)");
        assert!(req.symbol().is_none());
    }
}
