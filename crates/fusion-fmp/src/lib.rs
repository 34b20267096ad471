#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Financial Modeling Prep (FMP) data provider.
//!
//! This crate implements [`DataProvider`] for the
//! [Financial Modeling Prep](https://financialmodelingprep.com/) API.
//!
//! Ratios FMP reports as fractions (returns, margins, growth, dividend yield)
//! are converted to percentages. Fields FMP omits or sends as `null` stay
//! missing; they are never zero-filled.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use fusion_core::{
    Capability, DataError, DataProvider, FinancialMetrics, HistoryRange, NewsItem, OhlcvBar,
    Payload, PriceHistory, Quote, RateLimit, Ratio, Request, Result, Symbol,
};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

/// Base URL for the FMP stable API.
const FMP_BASE_URL: &str = "https://financialmodelingprep.com/stable";

/// Provider name used in errors and logs.
const NAME: &str = "fmp";

/// Maximum news items requested per call.
const NEWS_LIMIT: usize = 20;

const CAPABILITIES: &[Capability] = &[
    Capability::CurrentPrice,
    Capability::HistoricalSeries,
    Capability::Fundamentals,
    Capability::NewsItems,
];

/// Financial Modeling Prep data provider.
#[derive(Clone)]
pub struct FmpProvider {
    client: Client,
    api_key: String,
    priority: u8,
    rate_limit: RateLimit,
}

impl fmt::Debug for FmpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FmpProvider")
            .field("api_key", &"[REDACTED]")
            .field("priority", &self.priority)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl FmpProvider {
    /// Create a new FMP provider with the given API key.
    ///
    /// An empty key yields a provider that reports itself unavailable.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_client(Client::new(), api_key)
    }

    /// Create a new FMP provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into().trim().to_string(),
            priority: 20,
            // Free tier allowance.
            rate_limit: RateLimit::new(250, Duration::from_secs(24 * 60 * 60)),
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

    /// Returns true if an API key is configured.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Build a URL with the API key appended.
    fn url(&self, endpoint: &str) -> String {
        if endpoint.contains('?') {
            format!("{FMP_BASE_URL}/{endpoint}&apikey={}", self.api_key)
        } else {
            format!("{FMP_BASE_URL}/{endpoint}?apikey={}", self.api_key)
        }
    }

    /// Make a GET request and parse the JSON response.
    async fn get<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        if !self.has_api_key() {
            return Err(DataError::ProviderUnavailable(format!("{NAME}: no API key")));
        }
        debug!(endpoint = %endpoint, "FMP request");

        let response = self
            .client
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|e| DataError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                provider: NAME.to_string(),
                retry_after: None,
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationFailed(NAME.to_string()));
        }
        if !status.is_success() {
            return Err(DataError::Network(format!("HTTP {status} from {endpoint}")));
        }

        let text = response
            .text()
            .await
            .map_err(|e| DataError::Network(e.without_url().to_string()))?;
        check_error_body(&text)?;
        serde_json::from_str(&text).map_err(|e| DataError::malformed_body(NAME, &text, e))
    }

    async fn quote(&self, symbol: &Symbol) -> Result<Quote> {
        let quotes: Vec<FmpQuote> = self.get(&format!("quote?symbol={}", symbol.as_str())).await?;
        parse_quote(symbol, quotes, Utc::now())
    }

    async fn history(&self, symbol: &Symbol, range: HistoryRange) -> Result<PriceHistory> {
        let from = (Utc::now() - ChronoDuration::days(range.days().into())).date_naive();
        let endpoint = format!(
            "historical-price-eod/full?symbol={}&from={from}",
            symbol.as_str()
        );
        let prices: Vec<FmpHistoricalPrice> = self.get(&endpoint).await?;
        parse_history(symbol, prices)
    }

    async fn fundamentals(&self, symbol: &Symbol) -> Result<FinancialMetrics> {
        let sym = symbol.as_str();
        let ratios_endpoint = format!("ratios-ttm?symbol={sym}");
        let metrics_endpoint = format!("key-metrics-ttm?symbol={sym}");
        let growth_endpoint = format!("financial-growth?symbol={sym}&limit=1");
        let profile_endpoint = format!("profile?symbol={sym}");

        let (ratios, key_metrics, growth, profile) = tokio::join!(
            self.get::<Vec<FmpRatiosTtm>>(&ratios_endpoint),
            self.get::<Vec<FmpKeyMetricsTtm>>(&metrics_endpoint),
            self.get::<Vec<FmpGrowth>>(&growth_endpoint),
            self.get::<Vec<FmpProfile>>(&profile_endpoint),
        );

        // Ratios are required; the rest only enrich.
        let ratios = ratios?
            .into_iter()
            .next()
            .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))?;
        let key_metrics = first_or_warn(symbol, "key-metrics-ttm", key_metrics);
        let growth = first_or_warn(symbol, "financial-growth", growth);
        let profile = first_or_warn(symbol, "profile", profile);

        Ok(build_metrics(
            symbol,
            &ratios,
            key_metrics.as_ref(),
            growth.as_ref(),
            profile.as_ref(),
        ))
    }

    async fn news(&self, symbol: &Symbol, lookback_hours: u32) -> Result<Vec<NewsItem>> {
        let endpoint = format!(
            "news/stock?symbols={}&limit={NEWS_LIMIT}",
            symbol.as_str()
        );
        let articles: Vec<FmpArticle> = self.get(&endpoint).await?;
        let since = Utc::now() - ChronoDuration::hours(lookback_hours.into());
        Ok(parse_news(symbol, articles, since))
    }
}

#[async_trait]
impl DataProvider for FmpProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Financial Modeling Prep quotes, TTM fundamentals and stock news"
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

    async fn is_available(&self) -> bool {
        self.has_api_key()
    }

    #[instrument(skip(self), fields(provider = NAME))]
    async fn fetch(&self, request: &Request) -> Result<Payload> {
        match request {
            Request::CurrentPrice { symbol } => self.quote(symbol).await.map(Payload::Price),
            Request::HistoricalSeries { symbol, range } => {
                self.history(symbol, *range).await.map(Payload::History)
            }
            Request::Fundamentals { symbol } => {
                self.fundamentals(symbol).await.map(Payload::Fundamentals)
            }
            Request::NewsItems {
                symbol,
                lookback_hours,
            } => self.news(symbol, *lookback_hours).await.map(Payload::News),
            Request::GenerateAnalysis { .. } => Err(DataError::NotSupported(format!(
                "{NAME} does not generate analysis"
            ))),
        }
    }
}

/// First row of an enriching endpoint; failures are logged and ignored.
fn first_or_warn<T>(symbol: &Symbol, endpoint: &str, result: Result<Vec<T>>) -> Option<T> {
    match result {
        Ok(rows) => rows.into_iter().next(),
        Err(e) => {
            warn!(symbol = %symbol, endpoint, error = %e, "Partial FMP fundamentals");
            None
        }
    }
}

/// FMP answers some failures with HTTP 200 and an `Error Message` body.
fn check_error_body(text: &str) -> Result<()> {
    if !text.contains("\"Error Message\"") {
        return Ok(());
    }
    let lower = text.to_ascii_lowercase();
    if lower.contains("limit reach") {
        Err(DataError::RateLimited {
            provider: NAME.to_string(),
            retry_after: None,
        })
    } else if lower.contains("api key") {
        Err(DataError::AuthenticationFailed(NAME.to_string()))
    } else {
        Err(DataError::malformed_body(NAME, text, "error message body"))
    }
}

fn parse_quote(symbol: &Symbol, quotes: Vec<FmpQuote>, fetched_at: DateTime<Utc>) -> Result<Quote> {
    let q = quotes
        .into_iter()
        .next()
        .ok_or_else(|| DataError::SymbolNotFound(symbol.to_string()))?;
    let price = q
        .price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| DataError::MalformedResponse {
            provider: NAME.to_string(),
            shape: "quote without price".to_string(),
        })?;
    let as_of = q
        .timestamp
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or(fetched_at);

    let mut quote = Quote::new(symbol.clone(), price, as_of);
    if let Some(prev) = q.previous_close {
        quote = quote.with_previous_close(prev);
    }
    if let Some(volume) = q.volume {
        quote = quote.with_volume(volume);
    }
    Ok(quote)
}

fn parse_history(symbol: &Symbol, prices: Vec<FmpHistoricalPrice>) -> Result<PriceHistory> {
    let bars: Vec<OhlcvBar> = prices
        .into_iter()
        .filter_map(|p| {
            let date = NaiveDate::parse_from_str(&p.date, "%Y-%m-%d").ok()?;
            let at = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
            Some(OhlcvBar::new(
                at,
                p.open?,
                p.high?,
                p.low?,
                p.close?,
                p.volume.unwrap_or(0.0),
            ))
        })
        .collect();

    if bars.is_empty() {
        return Err(DataError::SymbolNotFound(symbol.to_string()));
    }
    Ok(PriceHistory::new(symbol.clone(), bars))
}

fn build_metrics(
    symbol: &Symbol,
    ratios: &FmpRatiosTtm,
    key_metrics: Option<&FmpKeyMetricsTtm>,
    growth: Option<&FmpGrowth>,
    profile: Option<&FmpProfile>,
) -> FinancialMetrics {
    let pct = |v: Option<f64>| v.map(|x| x * 100.0);

    let mut metrics = FinancialMetrics::new(symbol.clone())
        .with_dividend_yield(pct(ratios.dividend_yield_ttm))
        .with_ratio(Ratio::PriceToEarnings, ratios.price_to_earnings_ratio_ttm)
        .with_ratio(Ratio::PriceToBook, ratios.price_to_book_ratio_ttm)
        .with_ratio(Ratio::PriceToSales, ratios.price_to_sales_ratio_ttm)
        .with_ratio(Ratio::EvToEbitda, ratios.enterprise_value_multiple_ttm)
        .with_ratio(Ratio::Peg, ratios.price_to_earnings_growth_ratio_ttm)
        .with_ratio(Ratio::NetMargin, pct(ratios.net_profit_margin_ttm))
        .with_ratio(Ratio::OperatingMargin, pct(ratios.operating_profit_margin_ttm))
        .with_ratio(Ratio::DebtToEquity, ratios.debt_to_equity_ratio_ttm)
        .with_ratio(Ratio::CurrentRatio, ratios.current_ratio_ttm)
        .with_ratio(Ratio::QuickRatio, ratios.quick_ratio_ttm)
        .with_ratio(Ratio::InterestCoverage, ratios.interest_coverage_ratio_ttm);

    if let Some(km) = key_metrics {
        metrics = metrics
            .with_market_cap(km.market_cap)
            .with_ratio(Ratio::ReturnOnEquity, pct(km.return_on_equity_ttm))
            .with_ratio(Ratio::ReturnOnAssets, pct(km.return_on_assets_ttm))
            .with_ratio(
                Ratio::ReturnOnInvestedCapital,
                pct(km.return_on_invested_capital_ttm),
            );
    }
    if let Some(g) = growth {
        metrics = metrics
            .with_ratio(Ratio::RevenueGrowth, pct(g.revenue_growth))
            .with_ratio(Ratio::EarningsGrowth, pct(g.epsgrowth.or(g.net_income_growth)))
            .with_ratio(Ratio::BookValueGrowth, pct(g.book_valueper_share_growth));
    }
    if let Some(profile) = profile {
        if let Some(sector) = profile.sector.as_deref().filter(|s| !s.is_empty()) {
            metrics = metrics.with_sector(sector);
        }
        if metrics.market_cap.is_none() {
            metrics = metrics.with_market_cap(profile.market_cap);
        }
    }
    metrics
}

/// Articles published at or after `since`, newest first.
fn parse_news(symbol: &Symbol, articles: Vec<FmpArticle>, since: DateTime<Utc>) -> Vec<NewsItem> {
    let mut items: Vec<NewsItem> = articles
        .into_iter()
        .filter_map(|a| {
            // FMP omits the zone; timestamps are treated as UTC.
            let published = NaiveDateTime::parse_from_str(&a.published_date, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| Utc.from_utc_datetime(&dt))?;
            if published < since {
                return None;
            }
            let symbols = a
                .symbol
                .map_or_else(|| vec![symbol.clone()], |s| vec![Symbol::new(s)]);
            let mut item = NewsItem::new(symbols, a.title, a.text.unwrap_or_default(), published);
            if let Some(url) = a.url {
                item = item.with_source_url(url);
            }
            Some(item)
        })
        .collect();
    items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    items
}

// ============================================================================
// FMP API Response Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpQuote {
    price: Option<f64>,
    previous_close: Option<f64>,
    volume: Option<f64>,
    timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct FmpHistoricalPrice {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FmpRatiosTtm {
    #[serde(rename = "priceToEarningsRatioTTM")]
    price_to_earnings_ratio_ttm: Option<f64>,
    #[serde(rename = "priceToBookRatioTTM")]
    price_to_book_ratio_ttm: Option<f64>,
    #[serde(rename = "priceToSalesRatioTTM")]
    price_to_sales_ratio_ttm: Option<f64>,
    #[serde(rename = "enterpriseValueMultipleTTM")]
    enterprise_value_multiple_ttm: Option<f64>,
    #[serde(rename = "priceToEarningsGrowthRatioTTM")]
    price_to_earnings_growth_ratio_ttm: Option<f64>,
    #[serde(rename = "netProfitMarginTTM")]
    net_profit_margin_ttm: Option<f64>,
    #[serde(rename = "operatingProfitMarginTTM")]
    operating_profit_margin_ttm: Option<f64>,
    #[serde(rename = "debtToEquityRatioTTM")]
    debt_to_equity_ratio_ttm: Option<f64>,
    #[serde(rename = "currentRatioTTM")]
    current_ratio_ttm: Option<f64>,
    #[serde(rename = "quickRatioTTM")]
    quick_ratio_ttm: Option<f64>,
    #[serde(rename = "interestCoverageRatioTTM")]
    interest_coverage_ratio_ttm: Option<f64>,
    #[serde(rename = "dividendYieldTTM")]
    dividend_yield_ttm: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FmpKeyMetricsTtm {
    market_cap: Option<f64>,
    #[serde(rename = "returnOnEquityTTM")]
    return_on_equity_ttm: Option<f64>,
    #[serde(rename = "returnOnAssetsTTM")]
    return_on_assets_ttm: Option<f64>,
    #[serde(rename = "returnOnInvestedCapitalTTM")]
    return_on_invested_capital_ttm: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FmpGrowth {
    revenue_growth: Option<f64>,
    epsgrowth: Option<f64>,
    net_income_growth: Option<f64>,
    book_valueper_share_growth: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FmpProfile {
    sector: Option<String>,
    market_cap: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FmpArticle {
    symbol: Option<String>,
    published_date: String,
    title: String,
    text: Option<String>,
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let provider = FmpProvider::new("test_key");
        assert_eq!(
            provider.url("quote?symbol=AAPL"),
            "https://financialmodelingprep.com/stable/quote?symbol=AAPL&apikey=test_key"
        );
        assert_eq!(
            provider.url("profile"),
            "https://financialmodelingprep.com/stable/profile?apikey=test_key"
        );
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let provider = FmpProvider::new("secret_key_12345");
        let debug_str = format!("{provider:?}");
        assert!(!debug_str.contains("secret_key_12345"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_unavailable_without_key() {
        let provider = FmpProvider::new("  ");
        assert!(!provider.is_available().await);
        let err = provider.fetch(&Request::current_price("AAPL")).await.unwrap_err();
        assert!(matches!(err, DataError::ProviderUnavailable(_)));

        assert!(FmpProvider::new("k").is_available().await);
    }

    #[test]
    fn test_error_bodies() {
        let limit = r#"{"Error Message": "Limit Reach . Please upgrade your plan"}"#;
        let auth = r#"{"Error Message": "Invalid API KEY. Feel free to create a Free API Key"}"#;
        assert!(matches!(check_error_body(limit), Err(DataError::RateLimited { .. })));
        assert!(matches!(check_error_body(auth), Err(DataError::AuthenticationFailed(_))));
        assert!(check_error_body("[]").is_ok());
    }

    #[test]
    fn test_parse_quote() {
        let body = r#"[{"symbol":"AAPL","name":"Apple Inc.","price":196.5,"changePercentage":1.2,
            "volume":51234000,"previousClose":194.17,"timestamp":1717444800}]"#;
        let quotes: Vec<FmpQuote> = serde_json::from_str(body).unwrap();
        let quote = parse_quote(&Symbol::new("AAPL"), quotes, Utc::now()).unwrap();

        assert_eq!(quote.price, 196.5);
        assert_eq!(quote.previous_close, Some(194.17));
        assert_eq!(quote.as_of.timestamp(), 1_717_444_800);

        let err = parse_quote(&Symbol::new("ZZZ"), Vec::new(), Utc::now()).unwrap_err();
        assert_eq!(err, DataError::SymbolNotFound("ZZZ".to_string()));
    }

    #[test]
    fn test_parse_history_sorts_bars() {
        let body = r#"[
            {"symbol":"AAPL","date":"2024-06-04","open":195.0,"high":197.0,"low":194.0,"close":196.0,"volume":100},
            {"symbol":"AAPL","date":"2024-06-03","open":192.0,"high":195.0,"low":191.0,"close":194.0,"volume":90},
            {"symbol":"AAPL","date":"bad","open":1.0,"high":1.0,"low":1.0,"close":1.0}
        ]"#;
        let prices: Vec<FmpHistoricalPrice> = serde_json::from_str(body).unwrap();
        let history = parse_history(&Symbol::new("AAPL"), prices).unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().close, 196.0);
    }

    #[test]
    fn test_build_metrics_keeps_missing_fields_missing() {
        let ratios: FmpRatiosTtm = serde_json::from_str(
            r#"{"priceToEarningsRatioTTM": 31.5, "netProfitMarginTTM": 0.24,
                "debtToEquityRatioTTM": 1.45, "currentRatioTTM": null, "dividendYieldTTM": 0.005}"#,
        )
        .unwrap();
        let growth: FmpGrowth =
            serde_json::from_str(r#"{"revenueGrowth": 0.02, "netIncomeGrowth": -0.03}"#).unwrap();
        let profile: FmpProfile =
            serde_json::from_str(r#"{"sector": "Technology", "marketCap": 3.0e12}"#).unwrap();

        let metrics = build_metrics(&Symbol::new("AAPL"), &ratios, None, Some(&growth), Some(&profile));

        assert_eq!(metrics.get(Ratio::PriceToEarnings), Some(31.5));
        assert!((metrics.get(Ratio::NetMargin).unwrap() - 24.0).abs() < 1e-9);
        assert!((metrics.get(Ratio::EarningsGrowth).unwrap() + 3.0).abs() < 1e-9);
        assert_eq!(metrics.get(Ratio::CurrentRatio), None);
        assert_eq!(metrics.get(Ratio::ReturnOnEquity), None);
        assert_eq!(metrics.sector.as_deref(), Some("Technology"));
        assert_eq!(metrics.market_cap, Some(3.0e12));
    }

    #[test]
    fn test_parse_news_filters_lookback() {
        let body = r#"[
            {"symbol":"AAPL","publishedDate":"2024-06-03 14:00:00","title":"Apple unveils new chips","text":"Details","url":"https://example.com/a"},
            {"symbol":"AAPL","publishedDate":"2024-06-01 09:00:00","title":"Old story","text":null,"url":null},
            {"symbol":"AAPL","publishedDate":"2024-06-03 16:30:00","title":"Apple shares rise","text":"More","url":null}
        ]"#;
        let articles: Vec<FmpArticle> = serde_json::from_str(body).unwrap();
        let since = Utc.with_ymd_and_hms(2024, 6, 2, 16, 0, 0).unwrap();
        let items = parse_news(&Symbol::new("AAPL"), articles, since);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].headline, "Apple shares rise");
        assert_eq!(items[1].source_url.as_deref(), Some("https://example.com/a"));
        assert!(items[0].mentions(&Symbol::new("aapl")));
    }
}
