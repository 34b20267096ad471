//! Documents built from resolved data.
//!
//! Snapshot documents (quote, fundamentals, portfolio) have one id per symbol,
//! so indexing a newer snapshot replaces the previous one.

use chrono::{DateTime, Utc};
use fusion_core::{
    Component, FinancialMetrics, NewsItem, PortfolioValuation, Quote, TechnicalSnapshot,
};
use fusion_health::HealthScore;
use std::fmt::Write as _;

use crate::document::{Document, DocumentType};
use crate::sentiment::NewsSentiment;

/// Id of the portfolio snapshot document.
pub const PORTFOLIO_ID: &str = "portfolio_snapshot";

fn opt(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.decimals$}"))
}

/// Price snapshot with optional technical indicators.
#[must_use]
pub fn quote_document(
    quote: &Quote,
    technical: Option<&TechnicalSnapshot>,
    source: &str,
) -> Document {
    let mut content = format!("Stock symbol: {} Current price: {:.2}", quote.symbol, quote.price);
    if let Some(currency) = &quote.currency {
        let _ = write!(content, " {currency}");
    }
    if let Some(change) = quote.change_percent() {
        let _ = write!(content, " Change: {change:+.2}%");
    }
    if let Some(t) = technical {
        let _ = write!(
            content,
            " SMA 5: {} SMA 20: {} RSI: {} Period high: {:.2} Period low: {:.2} Trend: {:+.2}%",
            opt(t.sma_5, 2),
            opt(t.sma_20, 2),
            opt(t.rsi_14, 1),
            t.period_high,
            t.period_low,
            t.trend_percent,
        );
    }

    Document::new(
        format!("quote:{}", quote.symbol),
        content,
        DocumentType::MarketQuote,
        quote.as_of,
    )
    .with_symbol(quote.symbol.clone())
    .with_metadata("source", source)
}

/// Ratios and health score of a symbol.
#[must_use]
pub fn fundamentals_document(
    metrics: &FinancialMetrics,
    score: &HealthScore,
    source: &str,
    created_at: DateTime<Utc>,
) -> Document {
    let mut content = format!(
        "Stock symbol: {} Sector: {}",
        metrics.symbol,
        metrics.sector.as_deref().unwrap_or("Unknown")
    );
    if let Some(cap) = metrics.market_cap {
        let _ = write!(content, " Market cap: {cap:.0}");
    }
    for (ratio, value) in metrics.iter() {
        let _ = write!(content, " {ratio}: {value:.2}");
    }
    if let Some(yield_pct) = metrics.dividend_yield {
        let _ = write!(content, " Dividend yield: {yield_pct:.2}%");
    }
    match (score.overall, score.rating) {
        (Some(overall), Some(rating)) => {
            let _ = write!(content, " Financial health score: {overall:.1}/10 Rating: {rating}");
        }
        _ => content.push_str(" Financial health score: unavailable"),
    }
    for component in Component::ALL {
        let _ = write!(
            content,
            " {} score: {}",
            component.label(),
            opt(score.component(component), 1)
        );
    }

    let mut document = Document::new(
        format!("fundamentals:{}", metrics.symbol),
        content,
        DocumentType::Fundamentals,
        created_at,
    )
    .with_symbol(metrics.symbol.clone())
    .with_metadata("source", source);
    if let Some(sector) = &metrics.sector {
        document = document.with_metadata("sector", sector.as_str());
    }
    document
}

/// A news item.
///
/// Items mentioning exactly one symbol are scoped to it; market-wide or
/// multi-symbol items stay unscoped.
#[must_use]
pub fn news_document(item: &NewsItem) -> Document {
    let slug: String = item
        .headline
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(48)
        .collect::<String>()
        .to_lowercase();
    let id = format!("news:{}:{slug}", item.published_at.timestamp());
    let content = if item.body.is_empty() {
        item.headline.clone()
    } else {
        format!("{} {}", item.headline, item.body)
    };

    let mut document = Document::new(id, content, DocumentType::News, item.published_at);
    if let [symbol] = item.symbols.as_slice() {
        document = document.with_symbol(symbol.clone());
    }
    if let Some(url) = &item.source_url {
        document = document.with_metadata("source_url", url.as_str());
    }
    document
}

/// News tone of a symbol, replacing the previous run's.
#[must_use]
pub fn sentiment_document(sentiment: &NewsSentiment, created_at: DateTime<Utc>) -> Document {
    let content = format!(
        "Stock symbol: {} News sentiment: {} Sentiment score: {:.3} Article count: {} \
         Positive articles: {} Negative articles: {} Neutral articles: {}",
        sentiment.symbol,
        sentiment.label,
        sentiment.score,
        sentiment.article_count,
        sentiment.positive,
        sentiment.negative,
        sentiment.neutral,
    );
    Document::new(
        format!("sentiment:{}", sentiment.symbol),
        content,
        DocumentType::Sentiment,
        created_at,
    )
    .with_symbol(sentiment.symbol.clone())
    .with_metadata("label", sentiment.label.as_str())
}

/// Holdings and P&L of the whole portfolio.
#[must_use]
pub fn portfolio_document(valuation: &PortfolioValuation, created_at: DateTime<Utc>) -> Document {
    let mut content = format!(
        "Portfolio holdings: {} Total investment: {:.2} Current value: {:.2} Total P&L: {:.2} ({:+.2}%)",
        valuation.holdings.len(),
        valuation.total_investment,
        valuation.total_current_value,
        valuation.total_pnl,
        valuation.total_pnl_percent,
    );
    for h in &valuation.holdings {
        let _ = write!(
            content,
            " {sym} holding: {qty} shares at {buy:.2} current price: {price} P&L: {pnl} ({pct}%)",
            sym = h.symbol,
            qty = h.quantity,
            buy = h.buy_price,
            price = opt(h.current_price, 2),
            pnl = opt(h.pnl, 2),
            pct = opt(h.pnl_percent, 2),
        );
    }

    Document::new(PORTFOLIO_ID, content, DocumentType::PortfolioSnapshot, created_at)
}
