//! Sector benchmark tables.
//!
//! A [`BenchmarkTable`] maps sector names to [`SectorBenchmark`]s and falls
//! back to a generic benchmark for unknown sectors or for ratios a sector
//! table leaves out.

use fusion_core::{Ratio, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::band::RatioBand;

/// Bands for the ratios of one sector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SectorBenchmark {
    bands: BTreeMap<Ratio, RatioBand>,
}

impl SectorBenchmark {
    /// Creates an empty benchmark.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bands: BTreeMap::new(),
        }
    }

    /// Adds or replaces the band for `ratio`.
    #[must_use]
    pub fn with_band(mut self, ratio: Ratio, poor: f64, fair: f64, strong: f64) -> Self {
        self.bands.insert(ratio, RatioBand::new(poor, fair, strong));
        self
    }

    /// Band for `ratio`, if defined.
    #[must_use]
    pub fn band(&self, ratio: Ratio) -> Option<&RatioBand> {
        self.bands.get(&ratio)
    }

    /// Checks every band against its ratio's direction.
    pub fn validate(&self) -> Result<()> {
        self.bands
            .iter()
            .try_for_each(|(ratio, band)| band.validate(ratio.direction()))
    }

    /// Broad-market bands used when no sector matches.
    #[must_use]
    pub fn generic() -> Self {
        Self::new()
            .with_band(Ratio::PriceToEarnings, 40.0, 20.0, 12.0)
            .with_band(Ratio::PriceToBook, 8.0, 3.0, 1.5)
            .with_band(Ratio::PriceToSales, 8.0, 3.0, 1.0)
            .with_band(Ratio::EvToEbitda, 25.0, 12.0, 7.0)
            .with_band(Ratio::Peg, 3.0, 1.5, 0.8)
            .with_band(Ratio::ReturnOnEquity, 5.0, 15.0, 25.0)
            .with_band(Ratio::ReturnOnAssets, 2.0, 8.0, 15.0)
            .with_band(Ratio::ReturnOnInvestedCapital, 5.0, 12.0, 20.0)
            .with_band(Ratio::NetMargin, 2.0, 10.0, 20.0)
            .with_band(Ratio::OperatingMargin, 5.0, 15.0, 25.0)
            .with_band(Ratio::DebtToEquity, 2.0, 0.8, 0.3)
            .with_band(Ratio::CurrentRatio, 0.8, 1.5, 2.5)
            .with_band(Ratio::QuickRatio, 0.5, 1.0, 1.8)
            .with_band(Ratio::InterestCoverage, 1.5, 5.0, 15.0)
            .with_band(Ratio::RevenueGrowth, 0.0, 8.0, 20.0)
            .with_band(Ratio::EarningsGrowth, 0.0, 10.0, 25.0)
            .with_band(Ratio::BookValueGrowth, 0.0, 7.0, 15.0)
    }

    /// IT services: rich multiples, high returns, almost no debt.
    #[must_use]
    pub fn it_services() -> Self {
        Self::new()
            .with_band(Ratio::PriceToEarnings, 45.0, 28.0, 18.0)
            .with_band(Ratio::PriceToBook, 15.0, 8.0, 4.0)
            .with_band(Ratio::PriceToSales, 10.0, 5.0, 3.0)
            .with_band(Ratio::EvToEbitda, 30.0, 18.0, 12.0)
            .with_band(Ratio::Peg, 3.0, 1.8, 1.0)
            .with_band(Ratio::ReturnOnEquity, 10.0, 25.0, 40.0)
            .with_band(Ratio::ReturnOnAssets, 5.0, 15.0, 25.0)
            .with_band(Ratio::ReturnOnInvestedCapital, 10.0, 25.0, 40.0)
            .with_band(Ratio::NetMargin, 8.0, 16.0, 24.0)
            .with_band(Ratio::OperatingMargin, 12.0, 20.0, 28.0)
            .with_band(Ratio::DebtToEquity, 1.0, 0.3, 0.05)
            .with_band(Ratio::CurrentRatio, 1.0, 2.0, 3.0)
            .with_band(Ratio::QuickRatio, 0.8, 1.6, 2.5)
            .with_band(Ratio::InterestCoverage, 5.0, 20.0, 50.0)
            .with_band(Ratio::RevenueGrowth, 2.0, 10.0, 18.0)
            .with_band(Ratio::EarningsGrowth, 2.0, 12.0, 22.0)
            .with_band(Ratio::BookValueGrowth, 2.0, 10.0, 18.0)
    }

    /// Oil & gas: cheap multiples, moderate leverage, thin liquidity.
    #[must_use]
    pub fn oil_and_gas() -> Self {
        Self::new()
            .with_band(Ratio::PriceToEarnings, 30.0, 15.0, 8.0)
            .with_band(Ratio::PriceToBook, 4.0, 1.8, 1.0)
            .with_band(Ratio::PriceToSales, 3.0, 1.2, 0.6)
            .with_band(Ratio::EvToEbitda, 15.0, 8.0, 5.0)
            .with_band(Ratio::Peg, 2.5, 1.2, 0.7)
            .with_band(Ratio::ReturnOnEquity, 4.0, 12.0, 20.0)
            .with_band(Ratio::ReturnOnAssets, 2.0, 6.0, 12.0)
            .with_band(Ratio::ReturnOnInvestedCapital, 4.0, 9.0, 15.0)
            .with_band(Ratio::NetMargin, 2.0, 8.0, 14.0)
            .with_band(Ratio::OperatingMargin, 5.0, 12.0, 20.0)
            .with_band(Ratio::DebtToEquity, 1.5, 0.6, 0.25)
            .with_band(Ratio::CurrentRatio, 0.8, 1.2, 1.8)
            .with_band(Ratio::QuickRatio, 0.5, 0.9, 1.4)
            .with_band(Ratio::InterestCoverage, 2.0, 5.0, 12.0)
            .with_band(Ratio::RevenueGrowth, 0.0, 7.0, 15.0)
            .with_band(Ratio::EarningsGrowth, 0.0, 10.0, 20.0)
            .with_band(Ratio::BookValueGrowth, 0.0, 6.0, 12.0)
    }

    /// Banking: leverage is the business, so debt bands are much wider.
    #[must_use]
    pub fn banking() -> Self {
        Self::new()
            .with_band(Ratio::PriceToEarnings, 30.0, 15.0, 8.0)
            .with_band(Ratio::PriceToBook, 4.0, 2.0, 1.0)
            .with_band(Ratio::PriceToSales, 6.0, 3.0, 1.5)
            .with_band(Ratio::EvToEbitda, 25.0, 12.0, 7.0)
            .with_band(Ratio::Peg, 2.5, 1.3, 0.8)
            .with_band(Ratio::ReturnOnEquity, 6.0, 13.0, 18.0)
            .with_band(Ratio::ReturnOnAssets, 0.4, 1.0, 1.8)
            .with_band(Ratio::ReturnOnInvestedCapital, 4.0, 9.0, 14.0)
            .with_band(Ratio::NetMargin, 8.0, 15.0, 25.0)
            .with_band(Ratio::OperatingMargin, 10.0, 20.0, 30.0)
            .with_band(Ratio::DebtToEquity, 12.0, 7.0, 4.0)
            .with_band(Ratio::CurrentRatio, 0.8, 1.0, 1.3)
            .with_band(Ratio::QuickRatio, 0.6, 0.9, 1.2)
            .with_band(Ratio::InterestCoverage, 1.1, 1.5, 2.5)
            .with_band(Ratio::RevenueGrowth, 0.0, 10.0, 20.0)
            .with_band(Ratio::EarningsGrowth, 0.0, 12.0, 25.0)
            .with_band(Ratio::BookValueGrowth, 0.0, 10.0, 18.0)
    }
}

/// Benchmarks by sector with a generic fallback.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkTable {
    /// Used for unknown sectors and ratios a sector leaves out.
    pub generic: SectorBenchmark,
    /// Sector name to benchmark. Lookups ignore case.
    #[serde(default)]
    pub sectors: BTreeMap<String, SectorBenchmark>,
}

impl Default for BenchmarkTable {
    fn default() -> Self {
        Self {
            generic: SectorBenchmark::generic(),
            sectors: BTreeMap::from([
                ("IT Services".to_string(), SectorBenchmark::it_services()),
                ("Oil & Gas".to_string(), SectorBenchmark::oil_and_gas()),
                ("Banking".to_string(), SectorBenchmark::banking()),
            ]),
        }
    }
}

impl BenchmarkTable {
    /// Adds or replaces a sector benchmark.
    #[must_use]
    pub fn with_sector(mut self, name: impl Into<String>, benchmark: SectorBenchmark) -> Self {
        self.sectors.insert(name.into(), benchmark);
        self
    }

    /// Name of the sector table that applies, or `None` for the generic one.
    #[must_use]
    pub fn resolve_sector(&self, sector: Option<&str>) -> Option<&str> {
        let sector = sector?.trim();
        self.sectors
            .keys()
            .find(|name| name.eq_ignore_ascii_case(sector))
            .map(String::as_str)
    }

    /// Band for `ratio` in `sector`, falling back to the generic table.
    #[must_use]
    pub fn band(&self, sector: Option<&str>, ratio: Ratio) -> Option<&RatioBand> {
        self.resolve_sector(sector)
            .and_then(|name| self.sectors.get(name))
            .and_then(|benchmark| benchmark.band(ratio))
            .or_else(|| self.generic.band(ratio))
    }

    /// Validates every table.
    pub fn validate(&self) -> Result<()> {
        self.generic.validate()?;
        self.sectors.values().try_for_each(SectorBenchmark::validate)
    }
}
