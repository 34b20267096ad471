//! Portfolio holdings and their valuation against resolved prices.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{DataError, Result};
use crate::types::Symbol;

/// One position supplied by the portfolio collaborator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Symbol held.
    pub symbol: Symbol,
    /// Number of shares.
    pub quantity: f64,
    /// Average purchase price per share.
    pub buy_price: f64,
    /// Date of purchase, when known.
    pub purchase_date: Option<NaiveDate>,
}

impl Holding {
    /// Creates a holding, rejecting non-positive or non-finite figures.
    pub fn new(symbol: impl Into<Symbol>, quantity: f64, buy_price: f64) -> Result<Self> {
        let symbol = symbol.into();
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(DataError::InvalidParameter(format!(
                "{symbol}: quantity must be positive"
            )));
        }
        if !(buy_price.is_finite() && buy_price > 0.0) {
            return Err(DataError::InvalidParameter(format!(
                "{symbol}: buy price must be positive"
            )));
        }
        Ok(Self {
            symbol,
            quantity,
            buy_price,
            purchase_date: None,
        })
    }

    /// Sets the purchase date.
    #[must_use]
    pub const fn with_purchase_date(mut self, date: NaiveDate) -> Self {
        self.purchase_date = Some(date);
        self
    }

    /// Amount invested.
    #[must_use]
    pub fn investment(&self) -> f64 {
        self.quantity * self.buy_price
    }
}

/// Valuation of a single holding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    /// Symbol valued.
    pub symbol: Symbol,
    /// Shares held.
    pub quantity: f64,
    /// Purchase price.
    pub buy_price: f64,
    /// Amount invested.
    pub investment: f64,
    /// Resolved price, absent when every price source failed.
    pub current_price: Option<f64>,
    /// Market value at the resolved price.
    pub current_value: Option<f64>,
    /// Profit or loss.
    pub pnl: Option<f64>,
    /// Profit or loss in percent of the investment.
    pub pnl_percent: Option<f64>,
}

/// Valuation of a whole portfolio.
///
/// Totals only include holdings that could be priced, so a missing price
/// never shows up as a total loss.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    /// Per-holding figures in input order.
    pub holdings: Vec<HoldingValuation>,
    /// Investment in priced holdings.
    pub total_investment: f64,
    /// Market value of priced holdings.
    pub total_current_value: f64,
    /// Total profit or loss of priced holdings.
    pub total_pnl: f64,
    /// Total profit or loss in percent.
    pub total_pnl_percent: f64,
    /// Symbols that could not be priced.
    pub unpriced: Vec<Symbol>,
}

impl PortfolioValuation {
    /// Values `holdings` against `prices`.
    #[must_use]
    pub fn compute(holdings: &[Holding], prices: &HashMap<Symbol, f64>) -> Self {
        let mut valuation = Self::default();

        for holding in holdings {
            let investment = holding.investment();
            let price = prices
                .get(&holding.symbol)
                .copied()
                .filter(|p| p.is_finite() && *p > 0.0);

            let (current_value, pnl, pnl_percent) = match price {
                Some(price) => {
                    let value = holding.quantity * price;
                    let pnl = value - investment;
                    valuation.total_investment += investment;
                    valuation.total_current_value += value;
                    (Some(value), Some(pnl), Some(pnl / investment * 100.0))
                }
                None => {
                    valuation.unpriced.push(holding.symbol.clone());
                    (None, None, None)
                }
            };

            valuation.holdings.push(HoldingValuation {
                symbol: holding.symbol.clone(),
                quantity: holding.quantity,
                buy_price: holding.buy_price,
                investment,
                current_price: price,
                current_value,
                pnl,
                pnl_percent,
            });
        }

        valuation.total_pnl = valuation.total_current_value - valuation.total_investment;
        valuation.total_pnl_percent = if valuation.total_investment > 0.0 {
            valuation.total_pnl / valuation.total_investment * 100.0
        } else {
            0.0
        };
        valuation
    }

    /// Valuation of one symbol.
    #[must_use]
    pub fn holding(&self, symbol: &Symbol) -> Option<&HoldingValuation> {
        self.holdings.iter().find(|h| &h.symbol == symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holding_validation() {
        assert!(Holding::new("ABC", 0.0, 10.0).is_err());
        assert!(Holding::new("ABC", 5.0, f64::NAN).is_err());
        assert!(Holding::new("ABC", 5.0, 10.0).is_ok());
    }

    #[test]
    fn test_valuation_totals() {
        let holdings = vec![
            Holding::new("ABC", 10.0, 100.0).unwrap(),
            Holding::new("XYZ", 4.0, 50.0).unwrap(),
        ];
        let prices = HashMap::from([(Symbol::new("ABC"), 110.0), (Symbol::new("XYZ"), 40.0)]);

        let valuation = PortfolioValuation::compute(&holdings, &prices);
        assert!((valuation.total_investment - 1200.0).abs() < 1e-9);
        assert!((valuation.total_current_value - 1260.0).abs() < 1e-9);
        assert!((valuation.total_pnl - 60.0).abs() < 1e-9);
        assert!((valuation.total_pnl_percent - 5.0).abs() < 1e-9);

        let xyz = valuation.holding(&Symbol::new("XYZ")).unwrap();
        assert!((xyz.pnl_percent.unwrap() + 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_unpriced_excluded_from_totals() {
        let holdings = vec![
            Holding::new("ABC", 10.0, 100.0).unwrap(),
            Holding::new("GONE", 1.0, 500.0).unwrap(),
        ];
        let prices = HashMap::from([(Symbol::new("ABC"), 100.0)]);

        let valuation = PortfolioValuation::compute(&holdings, &prices);
        assert_eq!(valuation.unpriced, vec![Symbol::new("GONE")]);
        assert!((valuation.total_investment - 1000.0).abs() < 1e-9);
        assert!(valuation.total_pnl.abs() < 1e-9);
        assert!(valuation.holding(&Symbol::new("GONE")).unwrap().pnl.is_none());
    }
}
