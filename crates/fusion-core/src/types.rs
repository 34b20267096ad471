//! Core data types for market data.
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`Quote`] - Latest price for a symbol
//! - [`OhlcvBar`] - OHLCV price bar
//! - [`PriceHistory`] - Ordered bars for one symbol
//! - [`HistoryRange`] - Look-back range for a history request
//! - [`NewsItem`] - Textual news item with metadata

use chrono::{DateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DataError, Result};

/// A trading symbol/ticker.
///
/// Symbols are trimmed and uppercased on creation, so `tcs.ns` and `TCS.NS`
/// compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the ticker without an exchange suffix (`TCS.NS` -> `TCS`).
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<Symbol> for String {
    fn from(s: Symbol) -> Self {
        s.0
    }
}

/// Latest price for a symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol quoted.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: f64,
    /// Previous session close, when known.
    pub previous_close: Option<f64>,
    /// Session volume, when known.
    pub volume: Option<f64>,
    /// Quote currency, when known.
    pub currency: Option<String>,
    /// Time the price was observed.
    pub as_of: DateTime<Utc>,
}

impl Quote {
    /// Creates a quote with only the required fields.
    #[must_use]
    pub const fn new(symbol: Symbol, price: f64, as_of: DateTime<Utc>) -> Self {
        Self {
            symbol,
            price,
            previous_close: None,
            volume: None,
            currency: None,
            as_of,
        }
    }

    /// Sets the previous close.
    #[must_use]
    pub const fn with_previous_close(mut self, previous_close: f64) -> Self {
        self.previous_close = Some(previous_close);
        self
    }

    /// Sets the session volume.
    #[must_use]
    pub const fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Sets the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Percentage change against the previous close.
    #[must_use]
    pub fn change_percent(&self) -> Option<f64> {
        self.previous_close
            .filter(|prev| *prev != 0.0 && prev.is_finite())
            .map(|prev| (self.price - prev) / prev * 100.0)
    }
}

/// OHLCV (Open, High, Low, Close, Volume) bar data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Timestamp of the bar.
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Trading volume.
    pub volume: f64,
}

impl OhlcvBar {
    /// Creates a new OHLCV bar.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Look-back range for a historical series request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryRange {
    /// Roughly one month of daily bars.
    #[default]
    #[serde(rename = "1mo")]
    OneMonth,
    /// Roughly three months of daily bars.
    #[serde(rename = "3mo")]
    ThreeMonths,
    /// Roughly six months of daily bars.
    #[serde(rename = "6mo")]
    SixMonths,
    /// Roughly one year of daily bars.
    #[serde(rename = "1y")]
    OneYear,
}

impl HistoryRange {
    /// Canonical range string, also accepted by the Yahoo chart API.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
        }
    }

    /// Number of calendar days covered.
    #[must_use]
    pub const fn days(&self) -> u32 {
        match self {
            Self::OneMonth => 30,
            Self::ThreeMonths => 91,
            Self::SixMonths => 182,
            Self::OneYear => 365,
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRange {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1mo" | "1m" | "30d" => Ok(Self::OneMonth),
            "3mo" | "3m" | "90d" => Ok(Self::ThreeMonths),
            "6mo" | "6m" => Ok(Self::SixMonths),
            "1y" | "12mo" | "365d" => Ok(Self::OneYear),
            other => Err(DataError::InvalidParameter(format!("unknown range: {other}"))),
        }
    }
}

/// Ordered daily bars for one symbol, oldest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    /// Symbol of the series.
    pub symbol: Symbol,
    /// Bars sorted by timestamp ascending.
    pub bars: Vec<OhlcvBar>,
}

impl PriceHistory {
    /// Creates a history, sorting the bars by timestamp.
    #[must_use]
    pub fn new(symbol: Symbol, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self { symbol, bars }
    }

    /// Returns the number of bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Returns true if there are no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Most recent bar.
    #[must_use]
    pub fn last(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }

    /// Converts the history into a DataFrame.
    ///
    /// Columns: symbol, timestamp (milliseconds since epoch), open, high, low,
    /// close, volume.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let n = self.bars.len();
        let timestamps: Vec<i64> = self
            .bars
            .iter()
            .map(|b| b.timestamp.timestamp_millis())
            .collect();

        DataFrame::new(vec![
            Column::new("symbol".into(), vec![self.symbol.as_str(); n]),
            Column::new("timestamp".into(), timestamps),
            Column::new(
                "open".into(),
                self.bars.iter().map(|b| b.open).collect::<Vec<_>>(),
            ),
            Column::new(
                "high".into(),
                self.bars.iter().map(|b| b.high).collect::<Vec<_>>(),
            ),
            Column::new(
                "low".into(),
                self.bars.iter().map(|b| b.low).collect::<Vec<_>>(),
            ),
            Column::new(
                "close".into(),
                self.bars.iter().map(|b| b.close).collect::<Vec<_>>(),
            ),
            Column::new(
                "volume".into(),
                self.bars.iter().map(|b| b.volume).collect::<Vec<_>>(),
            ),
        ])
        .map_err(|e| DataError::Parse(e.to_string()))
    }
}

/// A textual news item with its metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    /// Symbols the item mentions. Empty for market-wide news.
    pub symbols: Vec<Symbol>,
    /// Headline.
    pub headline: String,
    /// Body or summary text.
    pub body: String,
    /// Publication time.
    pub published_at: DateTime<Utc>,
    /// Link to the source article.
    pub source_url: Option<String>,
}

impl NewsItem {
    /// Creates a news item without a source URL.
    #[must_use]
    pub fn new(
        symbols: Vec<Symbol>,
        headline: impl Into<String>,
        body: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbols,
            headline: headline.into(),
            body: body.into(),
            published_at,
            source_url: None,
        }
    }

    /// Sets the source URL.
    #[must_use]
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Returns true if the item mentions `symbol`.
    #[must_use]
    pub fn mentions(&self, symbol: &Symbol) -> bool {
        self.symbols.iter().any(|s| s == symbol || s.base() == symbol.base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_symbol_creation() {
        let sym = Symbol::new(" tcs.ns ");
        assert_eq!(sym.as_str(), "TCS.NS");
        assert_eq!(sym.base(), "TCS");
        assert_eq!(Symbol::from("infy"), Symbol::new("INFY"));
    }

    #[test]
    fn test_symbol_serde_normalizes() {
        let sym: Symbol = serde_json::from_str("\"reliance.ns\"").unwrap();
        assert_eq!(sym.as_str(), "RELIANCE.NS");
    }

    #[test]
    fn test_quote_change_percent() {
        let as_of = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let quote = Quote::new(Symbol::new("ABC"), 110.0, as_of).with_previous_close(100.0);
        assert!((quote.change_percent().unwrap() - 10.0).abs() < 1e-9);

        let bare = Quote::new(Symbol::new("ABC"), 110.0, as_of);
        assert!(bare.change_percent().is_none());
    }

    #[test]
    fn test_history_range_parse() {
        assert_eq!("1MO".parse::<HistoryRange>().unwrap(), HistoryRange::OneMonth);
        assert_eq!("365d".parse::<HistoryRange>().unwrap(), HistoryRange::OneYear);
        assert!("5y".parse::<HistoryRange>().is_err());
    }

    #[test]
    fn test_history_sorted_and_framed() {
        let day = |d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap();
        let history = PriceHistory::new(
            Symbol::new("ABC"),
            vec![
                OhlcvBar::new(day(3), 11.0, 12.0, 10.0, 11.5, 100.0),
                OhlcvBar::new(day(2), 10.0, 11.0, 9.0, 10.5, 200.0),
            ],
        );
        assert_eq!(history.bars[0].timestamp, day(2));

        let df = history.to_frame().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 7);
        let closes = df.column("close").unwrap().f64().unwrap();
        assert_eq!(closes.get(1), Some(11.5));
    }

    #[test]
    fn test_news_mentions() {
        let item = NewsItem::new(vec![Symbol::new("TCS.NS")], "TCS wins deal", "", Utc::now());
        assert!(item.mentions(&Symbol::new("TCS.NS")));
        assert!(item.mentions(&Symbol::new("TCS")));
        assert!(!item.mentions(&Symbol::new("INFY.NS")));
    }
}
