//! Financial ratios grouped into scoring components.
//!
//! [`FinancialMetrics`] holds whatever ratios a provider could supply for a
//! symbol. A ratio that is missing is absent from the map; it is never
//! zero-filled. Non-finite values are dropped on insertion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Symbol;

/// Whether larger values of a ratio indicate a healthier company.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Larger is better (margins, returns, coverage).
    HigherIsBetter,
    /// Smaller is better (multiples, leverage).
    LowerIsBetter,
}

/// The four scored groups of ratios.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// How expensive the stock is.
    Valuation,
    /// How much the company earns on its capital and sales.
    Profitability,
    /// Leverage and liquidity.
    FinancialHealth,
    /// Top and bottom line growth.
    Growth,
}

impl Component {
    /// All components, in scoring order.
    pub const ALL: [Self; 4] = [
        Self::Valuation,
        Self::Profitability,
        Self::FinancialHealth,
        Self::Growth,
    ];

    /// Human readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Valuation => "valuation",
            Self::Profitability => "profitability",
            Self::FinancialHealth => "financial health",
            Self::Growth => "growth",
        }
    }

    /// Ratios belonging to this component.
    #[must_use]
    pub fn ratios(&self) -> impl Iterator<Item = Ratio> + '_ {
        Ratio::ALL.into_iter().filter(move |r| r.component() == *self)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A named financial ratio.
///
/// Margins, returns and growth rates are expressed in percent (18.0 means 18%).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ratio {
    /// Price to earnings.
    PriceToEarnings,
    /// Price to book.
    PriceToBook,
    /// Price to sales.
    PriceToSales,
    /// Enterprise value to EBITDA.
    EvToEbitda,
    /// Price/earnings to growth.
    Peg,
    /// Return on equity, percent.
    ReturnOnEquity,
    /// Return on assets, percent.
    ReturnOnAssets,
    /// Return on invested capital, percent.
    ReturnOnInvestedCapital,
    /// Net profit margin, percent.
    NetMargin,
    /// Operating margin, percent.
    OperatingMargin,
    /// Total debt to shareholder equity.
    DebtToEquity,
    /// Current assets over current liabilities.
    CurrentRatio,
    /// Liquid assets over current liabilities.
    QuickRatio,
    /// EBIT over interest expense.
    InterestCoverage,
    /// Year-over-year revenue growth, percent.
    RevenueGrowth,
    /// Year-over-year earnings growth, percent.
    EarningsGrowth,
    /// Year-over-year book value growth, percent.
    BookValueGrowth,
}

impl Ratio {
    /// Every ratio, grouped by component.
    pub const ALL: [Self; 17] = [
        Self::PriceToEarnings,
        Self::PriceToBook,
        Self::PriceToSales,
        Self::EvToEbitda,
        Self::Peg,
        Self::ReturnOnEquity,
        Self::ReturnOnAssets,
        Self::ReturnOnInvestedCapital,
        Self::NetMargin,
        Self::OperatingMargin,
        Self::DebtToEquity,
        Self::CurrentRatio,
        Self::QuickRatio,
        Self::InterestCoverage,
        Self::RevenueGrowth,
        Self::EarningsGrowth,
        Self::BookValueGrowth,
    ];

    /// Component this ratio is scored under.
    #[must_use]
    pub const fn component(&self) -> Component {
        match self {
            Self::PriceToEarnings
            | Self::PriceToBook
            | Self::PriceToSales
            | Self::EvToEbitda
            | Self::Peg => Component::Valuation,
            Self::ReturnOnEquity
            | Self::ReturnOnAssets
            | Self::ReturnOnInvestedCapital
            | Self::NetMargin
            | Self::OperatingMargin => Component::Profitability,
            Self::DebtToEquity
            | Self::CurrentRatio
            | Self::QuickRatio
            | Self::InterestCoverage => Component::FinancialHealth,
            Self::RevenueGrowth | Self::EarningsGrowth | Self::BookValueGrowth => {
                Component::Growth
            }
        }
    }

    /// Direction in which the ratio improves.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self.component() {
            Component::Valuation => Direction::LowerIsBetter,
            Component::FinancialHealth if matches!(self, Self::DebtToEquity) => {
                Direction::LowerIsBetter
            }
            _ => Direction::HigherIsBetter,
        }
    }

    /// Short display label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::PriceToEarnings => "P/E",
            Self::PriceToBook => "P/B",
            Self::PriceToSales => "P/S",
            Self::EvToEbitda => "EV/EBITDA",
            Self::Peg => "PEG",
            Self::ReturnOnEquity => "ROE %",
            Self::ReturnOnAssets => "ROA %",
            Self::ReturnOnInvestedCapital => "ROIC %",
            Self::NetMargin => "Net margin %",
            Self::OperatingMargin => "Operating margin %",
            Self::DebtToEquity => "Debt/Equity",
            Self::CurrentRatio => "Current ratio",
            Self::QuickRatio => "Quick ratio",
            Self::InterestCoverage => "Interest coverage",
            Self::RevenueGrowth => "Revenue growth %",
            Self::EarningsGrowth => "Earnings growth %",
            Self::BookValueGrowth => "Book value growth %",
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Ratios and company figures for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    /// Symbol described.
    pub symbol: Symbol,
    /// Sector name used to pick benchmarks.
    pub sector: Option<String>,
    /// Market capitalization (informational, not scored).
    pub market_cap: Option<f64>,
    /// Dividend yield in percent (informational, not scored).
    pub dividend_yield: Option<f64>,
    ratios: BTreeMap<Ratio, f64>,
}

impl FinancialMetrics {
    /// Creates empty metrics for a symbol.
    #[must_use]
    pub const fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            sector: None,
            market_cap: None,
            dividend_yield: None,
            ratios: BTreeMap::new(),
        }
    }

    /// Sets the sector.
    #[must_use]
    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Sets the market capitalization, ignoring non-finite values.
    #[must_use]
    pub fn with_market_cap(mut self, market_cap: Option<f64>) -> Self {
        self.market_cap = market_cap.filter(|v| v.is_finite());
        self
    }

    /// Sets the dividend yield, ignoring non-finite values.
    #[must_use]
    pub fn with_dividend_yield(mut self, dividend_yield: Option<f64>) -> Self {
        self.dividend_yield = dividend_yield.filter(|v| v.is_finite());
        self
    }

    /// Adds a ratio. `None` and non-finite values leave it absent.
    #[must_use]
    pub fn with_ratio(mut self, ratio: Ratio, value: Option<f64>) -> Self {
        self.set(ratio, value);
        self
    }

    /// Sets or clears a ratio. Returns true if the value was kept.
    pub fn set(&mut self, ratio: Ratio, value: Option<f64>) -> bool {
        match value.filter(|v| v.is_finite()) {
            Some(v) => {
                self.ratios.insert(ratio, v);
                true
            }
            None => {
                self.ratios.remove(&ratio);
                false
            }
        }
    }

    /// Value of a ratio, if available.
    #[must_use]
    pub fn get(&self, ratio: Ratio) -> Option<f64> {
        self.ratios.get(&ratio).copied()
    }

    /// Iterates available ratios in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = (Ratio, f64)> + '_ {
        self.ratios.iter().map(|(r, v)| (*r, *v))
    }

    /// Number of available ratios.
    #[must_use]
    pub fn available(&self) -> usize {
        self.ratios.len()
    }

    /// Fills ratios missing here from `other`, keeping existing values.
    pub fn merge_missing(&mut self, other: &Self) {
        for (ratio, value) in other.iter() {
            self.ratios.entry(ratio).or_insert(value);
        }
        if self.sector.is_none() {
            self.sector.clone_from(&other.sector);
        }
        self.market_cap = self.market_cap.or(other.market_cap);
        self.dividend_yield = self.dividend_yield.or(other.dividend_yield);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_component_has_ratios() {
        for component in Component::ALL {
            assert!(component.ratios().count() >= 3, "{component}");
        }
        assert_eq!(
            Component::ALL.iter().map(|c| c.ratios().count()).sum::<usize>(),
            Ratio::ALL.len()
        );
    }

    #[test]
    fn test_directions() {
        assert_eq!(Ratio::PriceToEarnings.direction(), Direction::LowerIsBetter);
        assert_eq!(Ratio::DebtToEquity.direction(), Direction::LowerIsBetter);
        assert_eq!(Ratio::CurrentRatio.direction(), Direction::HigherIsBetter);
        assert_eq!(Ratio::ReturnOnEquity.direction(), Direction::HigherIsBetter);
    }

    #[test]
    fn test_non_finite_is_absent() {
        let metrics = FinancialMetrics::new(Symbol::new("ABC"))
            .with_ratio(Ratio::PriceToEarnings, Some(f64::NAN))
            .with_ratio(Ratio::ReturnOnEquity, Some(f64::INFINITY))
            .with_ratio(Ratio::CurrentRatio, Some(1.4))
            .with_ratio(Ratio::QuickRatio, None);
        assert_eq!(metrics.get(Ratio::PriceToEarnings), None);
        assert_eq!(metrics.get(Ratio::ReturnOnEquity), None);
        assert_eq!(metrics.get(Ratio::CurrentRatio), Some(1.4));
        assert_eq!(metrics.available(), 1);
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut primary = FinancialMetrics::new(Symbol::new("ABC"))
            .with_ratio(Ratio::PriceToEarnings, Some(20.0));
        let secondary = FinancialMetrics::new(Symbol::new("ABC"))
            .with_sector("Banking")
            .with_ratio(Ratio::PriceToEarnings, Some(99.0))
            .with_ratio(Ratio::ReturnOnEquity, Some(15.0));
        primary.merge_missing(&secondary);
        assert_eq!(primary.get(Ratio::PriceToEarnings), Some(20.0));
        assert_eq!(primary.get(Ratio::ReturnOnEquity), Some(15.0));
        assert_eq!(primary.sector.as_deref(), Some("Banking"));
    }
}
