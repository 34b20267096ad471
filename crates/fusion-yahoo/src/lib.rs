#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance data provider.
//!
//! This crate provides a Yahoo Finance provider that implements the
//! [`DataProvider`] trait from `fusion-core`.
//!
//! # Features
//!
//! - Current price and daily bars from the chart API
//! - Fundamentals from the quote summary API
//! - HTTP 429 mapped to [`DataError::RateLimited`] so the resolver moves on
//!   without marking the provider unhealthy

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fusion_core::{
    Capability, DataError, DataProvider, FinancialMetrics, HistoryRange, OhlcvBar, Payload,
    PriceHistory, Quote, RateLimit, Ratio, Request, Result, Symbol,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance quote summary API base URL.
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Quote summary modules holding the ratios we score.
const SUMMARY_MODULES: &str = "financialData,defaultKeyStatistics,summaryDetail,assetProfile";

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Provider name used in errors and logs.
const NAME: &str = "yahoo";

const CAPABILITIES: &[Capability] = &[
    Capability::CurrentPrice,
    Capability::HistoricalSeries,
    Capability::Fundamentals,
];

/// Yahoo Finance data provider.
#[derive(Debug, Clone)]
pub struct YahooProvider {
    client: reqwest::Client,
    priority: u8,
    rate_limit: RateLimit,
}

impl YahooProvider {
    /// Create a new Yahoo Finance provider with default settings.
    ///
    /// Declares a budget of 60 calls per minute.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client)
    }

    /// Create a new Yahoo Finance provider with a custom HTTP client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            priority: 10,
            rate_limit: RateLimit::per_minute(60),
        }
    }

    /// Overrides the priority rank.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the declared call budget.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Build the chart API URL for a symbol and range.
    fn chart_url(symbol: &Symbol, range: &str) -> String {
        format!("{CHART_API_URL}/{}?range={range}&interval=1d", symbol.as_str())
    }

    /// Build the quote summary URL for a symbol.
    fn summary_url(symbol: &Symbol) -> String {
        format!("{QUOTE_SUMMARY_URL}/{}?modules={SUMMARY_MODULES}", symbol.as_str())
    }

    /// GET `url` and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, symbol: &Symbol) -> Result<T> {
        debug!(url = %url, "Fetching");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                provider: NAME.to_string(),
                retry_after: retry_after(&response).or(Some(Duration::from_secs(60))),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationFailed(NAME.to_string()));
        }
        if !status.is_success() {
            return Err(DataError::Network(format!("HTTP {status} for {symbol}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DataError::Network(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| DataError::malformed_body(NAME, &body, e))
    }

    async fn chart(&self, symbol: &Symbol, range: &str) -> Result<ChartData> {
        let response: ChartResponse = self.get_json(&Self::chart_url(symbol, range), symbol).await?;
        response.into_data(symbol)
    }

    async fn summary(&self, symbol: &Symbol) -> Result<QuoteSummaryData> {
        let response: QuoteSummaryResponse =
            self.get_json(&Self::summary_url(symbol), symbol).await?;
        response
            .quote_summary
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Yahoo Finance quotes, daily history and fundamentals"
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        Some(self.rate_limit)
    }

    #[instrument(skip(self), fields(provider = NAME))]
    async fn fetch(&self, request: &Request) -> Result<Payload> {
        match request {
            Request::CurrentPrice { symbol } => {
                let data = self.chart(symbol, "5d").await?;
                parse_quote(symbol, &data, Utc::now()).map(Payload::Price)
            }
            Request::HistoricalSeries { symbol, range } => {
                let data = self.chart(symbol, range.as_str()).await?;
                parse_history(symbol, data, *range).map(Payload::History)
            }
            Request::Fundamentals { symbol } => {
                let data = self.summary(symbol).await?;
                Ok(Payload::Fundamentals(parse_fundamentals(symbol, data)))
            }
            other => Err(DataError::NotSupported(format!(
                "{NAME} does not provide {}",
                other.capability()
            ))),
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Latest price from chart metadata.
fn parse_quote(symbol: &Symbol, data: &ChartData, fetched_at: DateTime<Utc>) -> Result<Quote> {
    let meta = &data.meta;
    let price = meta
        .regular_market_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| DataError::MalformedResponse {
            provider: NAME.to_string(),
            shape: "chart meta without regularMarketPrice".to_string(),
        })?;
    let as_of = meta
        .regular_market_time
        .and_then(timestamp)
        .unwrap_or(fetched_at);

    let mut quote = Quote::new(symbol.clone(), price, as_of);
    if let Some(prev) = meta.chart_previous_close.or(meta.previous_close) {
        quote = quote.with_previous_close(prev);
    }
    if let Some(volume) = meta.regular_market_volume {
        quote = quote.with_volume(volume);
    }
    if let Some(currency) = &meta.currency {
        quote = quote.with_currency(currency.as_str());
    }
    Ok(quote)
}

/// Daily bars; points with any missing OHLC value are skipped.
fn parse_history(symbol: &Symbol, data: ChartData, range: HistoryRange) -> Result<PriceHistory> {
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| DataError::MalformedResponse {
            provider: NAME.to_string(),
            shape: format!("{} timestamps, no quote indicators", timestamps.len()),
        })?;

    let bars: Vec<OhlcvBar> = timestamps
        .iter()
        .enumerate()
        .filter_map(|(i, &ts)| {
            let at = |v: &[Option<f64>]| v.get(i).copied().flatten();
            Some(OhlcvBar::new(
                timestamp(ts)?,
                at(&quote.open)?,
                at(&quote.high)?,
                at(&quote.low)?,
                at(&quote.close)?,
                at(&quote.volume).unwrap_or(0.0),
            ))
        })
        .collect();

    if bars.is_empty() {
        return Err(DataError::SymbolNotFound(format!("{symbol} has no {range} history")));
    }
    debug!(symbol = %symbol, bars = bars.len(), "Parsed chart history");
    Ok(PriceHistory::new(symbol.clone(), bars))
}

/// Ratios from the quote summary modules.
///
/// Yahoo reports returns, margins, growth and dividend yield as fractions and
/// debt-to-equity as a percentage; all are converted to the units the scorer
/// expects.
fn parse_fundamentals(symbol: &Symbol, data: QuoteSummaryData) -> FinancialMetrics {
    let fin = data.financial_data.unwrap_or_default();
    let stats = data.default_key_statistics.unwrap_or_default();
    let detail = data.summary_detail.unwrap_or_default();
    let pct = |v: Option<f64>| v.map(|x| x * 100.0);

    let mut metrics = FinancialMetrics::new(symbol.clone())
        .with_market_cap(detail.market_cap.raw())
        .with_dividend_yield(pct(detail.dividend_yield.raw()))
        .with_ratio(Ratio::PriceToEarnings, detail.trailing_pe.raw())
        .with_ratio(Ratio::PriceToBook, stats.price_to_book.raw())
        .with_ratio(Ratio::PriceToSales, detail.price_to_sales_trailing12_months.raw())
        .with_ratio(Ratio::EvToEbitda, stats.enterprise_to_ebitda.raw())
        .with_ratio(Ratio::Peg, stats.peg_ratio.raw())
        .with_ratio(Ratio::ReturnOnEquity, pct(fin.return_on_equity.raw()))
        .with_ratio(Ratio::ReturnOnAssets, pct(fin.return_on_assets.raw()))
        .with_ratio(Ratio::NetMargin, pct(fin.profit_margins.raw()))
        .with_ratio(Ratio::OperatingMargin, pct(fin.operating_margins.raw()))
        .with_ratio(Ratio::DebtToEquity, fin.debt_to_equity.raw().map(|x| x / 100.0))
        .with_ratio(Ratio::CurrentRatio, fin.current_ratio.raw())
        .with_ratio(Ratio::QuickRatio, fin.quick_ratio.raw())
        .with_ratio(Ratio::RevenueGrowth, pct(fin.revenue_growth.raw()))
        .with_ratio(Ratio::EarningsGrowth, pct(fin.earnings_growth.raw()));

    if let Some(sector) = data.asset_profile.and_then(|p| p.sector) {
        metrics = metrics.with_sector(sector);
    }
    debug!(symbol = %symbol, ratios = metrics.available(), "Parsed quote summary");
    metrics
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

impl ChartResponse {
    fn into_data(self, symbol: &Symbol) -> Result<ChartData> {
        if let Some(error) = self.chart.error {
            if error.code == "Not Found" {
                return Err(DataError::SymbolNotFound(symbol.to_string()));
            }
            return Err(DataError::ProviderUnavailable(format!(
                "{NAME}: {}: {}",
                error.code, error.description
            )));
        }
        self.chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    currency: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
    regular_market_volume: Option<f64>,
    chart_previous_close: Option<f64>,
    previous_close: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Quote Summary API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Option<Vec<QuoteSummaryData>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryData {
    financial_data: Option<FinancialData>,
    default_key_statistics: Option<KeyStatistics>,
    summary_detail: Option<SummaryDetail>,
    asset_profile: Option<AssetProfile>,
}

/// A `{ "raw": 1.23, "fmt": "1.23" }` value; Yahoo sends `{}` when absent.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

trait RawExt {
    fn raw(&self) -> Option<f64>;
}

impl RawExt for Option<RawValue> {
    fn raw(&self) -> Option<f64> {
        self.as_ref().and_then(|v| v.raw)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FinancialData {
    current_ratio: Option<RawValue>,
    quick_ratio: Option<RawValue>,
    debt_to_equity: Option<RawValue>,
    return_on_equity: Option<RawValue>,
    return_on_assets: Option<RawValue>,
    profit_margins: Option<RawValue>,
    operating_margins: Option<RawValue>,
    revenue_growth: Option<RawValue>,
    earnings_growth: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct KeyStatistics {
    price_to_book: Option<RawValue>,
    enterprise_to_ebitda: Option<RawValue>,
    peg_ratio: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SummaryDetail {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    price_to_sales_trailing12_months: Option<RawValue>,
    market_cap: Option<RawValue>,
    dividend_yield: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    sector: Option<String>,
}
