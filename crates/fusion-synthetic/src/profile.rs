//! Sector profiles shaping synthetic values.

use fusion_core::{Ratio, Symbol};

/// Center and half-width of a synthetic ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spread {
    /// Typical value.
    pub center: f64,
    /// Maximum deviation from the center.
    pub half_width: f64,
}

const fn spread(center: f64, half_width: f64) -> Spread {
    Spread { center, half_width }
}

/// Typical figures for companies in one sector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectorProfile {
    /// Sector name, matching the scorer's benchmark names.
    pub sector: &'static str,
    /// Price level around which quotes are generated.
    pub base_price: f64,
    /// Daily volatility of the price walk, as a fraction.
    pub daily_volatility: f64,
    /// Market capitalization.
    pub market_cap: Spread,
    /// Dividend yield, percent.
    pub dividend_yield: Spread,
    /// Ratio ranges.
    pub ratios: &'static [(Ratio, Spread)],
}

const IT_SERVICES: &[(Ratio, Spread)] = &[
    (Ratio::PriceToEarnings, spread(27.0, 3.0)),
    (Ratio::PriceToBook, spread(10.0, 2.0)),
    (Ratio::PriceToSales, spread(6.0, 1.0)),
    (Ratio::EvToEbitda, spread(17.5, 2.0)),
    (Ratio::Peg, spread(1.65, 0.3)),
    (Ratio::ReturnOnEquity, spread(32.0, 4.0)),
    (Ratio::ReturnOnAssets, spread(26.5, 3.0)),
    (Ratio::ReturnOnInvestedCapital, spread(40.0, 5.0)),
    (Ratio::NetMargin, spread(20.5, 2.0)),
    (Ratio::OperatingMargin, spread(24.0, 2.5)),
    (Ratio::DebtToEquity, spread(0.08, 0.04)),
    (Ratio::CurrentRatio, spread(2.6, 0.5)),
    (Ratio::QuickRatio, spread(2.4, 0.4)),
    (Ratio::InterestCoverage, spread(48.0, 8.0)),
    (Ratio::RevenueGrowth, spread(13.5, 4.0)),
    (Ratio::EarningsGrowth, spread(17.0, 5.0)),
    (Ratio::BookValueGrowth, spread(17.5, 3.5)),
];

const OIL_AND_GAS: &[(Ratio, Spread)] = &[
    (Ratio::PriceToEarnings, spread(15.2, 2.0)),
    (Ratio::PriceToBook, spread(1.8, 0.3)),
    (Ratio::PriceToSales, spread(1.2, 0.25)),
    (Ratio::EvToEbitda, spread(8.5, 1.25)),
    (Ratio::Peg, spread(1.1, 0.25)),
    (Ratio::ReturnOnEquity, spread(12.5, 2.5)),
    (Ratio::ReturnOnAssets, spread(6.8, 1.25)),
    (Ratio::ReturnOnInvestedCapital, spread(9.2, 1.75)),
    (Ratio::NetMargin, spread(8.2, 1.5)),
    (Ratio::OperatingMargin, spread(12.8, 2.5)),
    (Ratio::DebtToEquity, spread(0.47, 0.07)),
    (Ratio::CurrentRatio, spread(1.25, 0.15)),
    (Ratio::QuickRatio, spread(0.97, 0.12)),
    (Ratio::InterestCoverage, spread(4.45, 0.75)),
    (Ratio::RevenueGrowth, spread(9.5, 4.0)),
    (Ratio::EarningsGrowth, spread(14.1, 6.0)),
    (Ratio::BookValueGrowth, spread(7.8, 3.0)),
];

const BANKING: &[(Ratio, Spread)] = &[
    (Ratio::PriceToEarnings, spread(18.0, 3.0)),
    (Ratio::PriceToBook, spread(2.6, 0.5)),
    (Ratio::PriceToSales, spread(4.0, 0.8)),
    (Ratio::Peg, spread(1.3, 0.3)),
    (Ratio::ReturnOnEquity, spread(15.0, 2.5)),
    (Ratio::ReturnOnAssets, spread(1.6, 0.3)),
    (Ratio::NetMargin, spread(20.0, 3.0)),
    (Ratio::OperatingMargin, spread(26.0, 4.0)),
    (Ratio::DebtToEquity, spread(7.0, 1.0)),
    (Ratio::RevenueGrowth, spread(14.0, 4.0)),
    (Ratio::EarningsGrowth, spread(18.0, 6.0)),
    (Ratio::BookValueGrowth, spread(13.0, 3.0)),
];

const GENERIC: &[(Ratio, Spread)] = &[
    (Ratio::PriceToEarnings, spread(21.5, 6.5)),
    (Ratio::PriceToBook, spread(4.0, 1.5)),
    (Ratio::PriceToSales, spread(3.05, 0.75)),
    (Ratio::EvToEbitda, spread(13.0, 3.0)),
    (Ratio::Peg, spread(1.65, 0.65)),
    (Ratio::ReturnOnEquity, spread(19.5, 6.5)),
    (Ratio::ReturnOnAssets, spread(13.0, 4.0)),
    (Ratio::ReturnOnInvestedCapital, spread(16.0, 5.0)),
    (Ratio::NetMargin, spread(13.0, 3.0)),
    (Ratio::OperatingMargin, spread(16.0, 4.0)),
    (Ratio::DebtToEquity, spread(0.7, 0.3)),
    (Ratio::CurrentRatio, spread(1.6, 0.4)),
    (Ratio::QuickRatio, spread(1.25, 0.25)),
    (Ratio::InterestCoverage, spread(9.0, 3.0)),
    (Ratio::RevenueGrowth, spread(12.5, 7.5)),
    (Ratio::EarningsGrowth, spread(15.0, 9.0)),
    (Ratio::BookValueGrowth, spread(9.5, 4.5)),
];

impl SectorProfile {
    /// IT services profile around a base price.
    #[must_use]
    pub const fn it_services(base_price: f64) -> Self {
        Self {
            sector: "IT Services",
            base_price,
            daily_volatility: 0.012,
            market_cap: spread(9.5e12, 3.0e12),
            dividend_yield: spread(3.0, 0.4),
            ratios: IT_SERVICES,
        }
    }

    /// Oil & gas profile around a base price.
    #[must_use]
    pub const fn oil_and_gas(base_price: f64) -> Self {
        Self {
            sector: "Oil & Gas",
            base_price,
            daily_volatility: 0.015,
            market_cap: spread(1.9e13, 7.5e11),
            dividend_yield: spread(0.55, 0.15),
            ratios: OIL_AND_GAS,
        }
    }

    /// Banking profile around a base price.
    #[must_use]
    pub const fn banking(base_price: f64) -> Self {
        Self {
            sector: "Banking",
            base_price,
            daily_volatility: 0.013,
            market_cap: spread(8.0e12, 3.0e12),
            dividend_yield: spread(1.1, 0.3),
            ratios: BANKING,
        }
    }

    /// Profile for symbols with no known sector.
    #[must_use]
    pub const fn generic() -> Self {
        Self {
            sector: "Unknown",
            base_price: 1000.0,
            daily_volatility: 0.018,
            market_cap: spread(5.5e11, 1.5e11),
            dividend_yield: spread(2.25, 0.75),
            ratios: GENERIC,
        }
    }

    /// Profile for `symbol`.
    #[must_use]
    pub fn for_symbol(symbol: &Symbol) -> Self {
        match symbol.base() {
            "TCS" => Self::it_services(3700.0),
            "INFY" => Self::it_services(1550.0),
            "WIPRO" | "HCLTECH" | "TECHM" => Self::it_services(1200.0),
            "RELIANCE" => Self::oil_and_gas(2500.0),
            "ONGC" | "BPCL" | "IOC" => Self::oil_and_gas(250.0),
            "HDFCBANK" => Self::banking(1600.0),
            "ICICIBANK" | "KOTAKBANK" | "AXISBANK" | "SBIN" => Self::banking(900.0),
            _ => Self::generic(),
        }
    }

    /// Whether this is the fallback profile.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.sector == "Unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup_ignores_exchange_suffix() {
        assert_eq!(SectorProfile::for_symbol(&Symbol::new("tcs.ns")).sector, "IT Services");
        assert_eq!(SectorProfile::for_symbol(&Symbol::new("RELIANCE.BO")).sector, "Oil & Gas");
        assert!(SectorProfile::for_symbol(&Symbol::new("ZZZ")).is_generic());
    }

    #[test]
    fn test_spreads_are_positive() {
        for profile in [
            SectorProfile::it_services(1.0),
            SectorProfile::oil_and_gas(1.0),
            SectorProfile::banking(1.0),
            SectorProfile::generic(),
        ] {
            for (ratio, s) in profile.ratios {
                assert!(s.half_width > 0.0, "{ratio}");
                assert!(s.center - s.half_width >= 0.0, "{ratio}");
            }
        }
    }
}
