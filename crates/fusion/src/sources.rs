//! Collaborators around an analysis run: where holdings and news come from,
//! and where the report goes.

use std::fmt::Debug;

use async_trait::async_trait;
use fusion_core::{Holding, NewsItem, Result, Symbol};
use tracing::info;

use crate::pipeline::AnalysisReport;

/// Supplies the holdings to analyse.
#[async_trait]
pub trait PortfolioSource: Send + Sync + Debug {
    /// Current holdings.
    async fn holdings(&self) -> Result<Vec<Holding>>;
}

/// Supplies news gathered outside the provider chain (feeds, scrapers).
#[async_trait]
pub trait NewsSource: Send + Sync + Debug {
    /// Items relevant to `symbols`, including market-wide items.
    async fn items(&self, symbols: &[Symbol]) -> Result<Vec<NewsItem>>;
}

/// Receives the finished report.
#[async_trait]
pub trait DeliveryChannel: Send + Sync + Debug {
    /// Delivers `report`.
    async fn deliver(&self, report: &AnalysisReport) -> Result<()>;
}

/// Fixed list of holdings.
#[derive(Clone, Debug, Default)]
pub struct StaticPortfolio {
    holdings: Vec<Holding>,
}

impl StaticPortfolio {
    /// Wraps `holdings`.
    #[must_use]
    pub const fn new(holdings: Vec<Holding>) -> Self {
        Self { holdings }
    }
}

#[async_trait]
impl PortfolioSource for StaticPortfolio {
    async fn holdings(&self) -> Result<Vec<Holding>> {
        Ok(self.holdings.clone())
    }
}

/// Fixed list of news items.
#[derive(Clone, Debug, Default)]
pub struct StaticNews {
    items: Vec<NewsItem>,
}

impl StaticNews {
    /// Wraps `items`.
    #[must_use]
    pub const fn new(items: Vec<NewsItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl NewsSource for StaticNews {
    async fn items(&self, symbols: &[Symbol]) -> Result<Vec<NewsItem>> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.symbols.is_empty() || symbols.iter().any(|s| item.mentions(s)))
            .cloned()
            .collect())
    }
}

/// Writes a summary of the report through `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl DeliveryChannel for LogDelivery {
    async fn deliver(&self, report: &AnalysisReport) -> Result<()> {
        let valuation = &report.valuation;
        info!(
            symbols = report.symbols.len(),
            total_investment = valuation.total_investment,
            current_value = valuation.total_current_value,
            pnl_percent = valuation.total_pnl_percent,
            market_sentiment = ?report.market_sentiment(),
            "Portfolio analysis"
        );
        for entry in &report.symbols {
            info!(
                symbol = %entry.symbol,
                action = %entry.recommendation.action,
                confidence = entry.recommendation.confidence,
                health = %entry.health,
                sentiment = %entry.sentiment.label,
                incomplete = ?entry.incomplete,
                "{}",
                entry.recommendation.rationale
            );
        }
        Ok(())
    }
}
