//! Component aggregation and the scorer.

use fusion_core::{Component, DataError, FinancialMetrics, Ratio, Result, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::benchmark::{BenchmarkTable, SectorBenchmark};

/// Weights of the four components in the overall score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Valuation weight.
    pub valuation: f64,
    /// Profitability weight.
    pub profitability: f64,
    /// Financial health weight.
    pub financial_health: f64,
    /// Growth weight.
    pub growth: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            valuation: 0.25,
            profitability: 0.35,
            financial_health: 0.25,
            growth: 0.15,
        }
    }
}

impl ScoringWeights {
    /// Weight of `component`.
    #[must_use]
    pub const fn weight(&self, component: Component) -> f64 {
        match component {
            Component::Valuation => self.valuation,
            Component::Profitability => self.profitability,
            Component::FinancialHealth => self.financial_health,
            Component::Growth => self.growth,
        }
    }

    /// Rejects negative, non-finite or all-zero weights.
    pub fn validate(&self) -> Result<()> {
        let weights = Component::ALL.map(|c| self.weight(c));
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DataError::Configuration(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if weights.iter().sum::<f64>() <= 0.0 {
            return Err(DataError::Configuration(
                "scoring weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Rating band of an overall score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    /// Below 3.
    VeryPoor,
    /// 3 to 5.
    Poor,
    /// 5 to 6.5.
    Fair,
    /// 6.5 to 8.
    Good,
    /// 8 and above.
    Excellent,
}

impl Rating {
    /// Band containing `score`.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 8.0 {
            Self::Excellent
        } else if score >= 6.5 {
            Self::Good
        } else if score >= 5.0 {
            Self::Fair
        } else if score >= 3.0 {
            Self::Poor
        } else {
            Self::VeryPoor
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::VeryPoor => "Very poor",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Health score of one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    /// Symbol scored.
    pub symbol: Symbol,
    /// Sector table used, `None` for the generic table.
    pub benchmark: Option<String>,
    /// Sub-score of every scored ratio.
    pub ratio_scores: BTreeMap<Ratio, f64>,
    /// Component scores; `None` when a component had no data.
    pub components: BTreeMap<Component, Option<f64>>,
    /// Weighted overall score; `None` when no component had data.
    pub overall: Option<f64>,
    /// Rating of the overall score.
    pub rating: Option<Rating>,
    /// Fraction of known ratios that could be scored.
    pub coverage: f64,
}

impl HealthScore {
    /// Score of `component`, if available.
    #[must_use]
    pub fn component(&self, component: Component) -> Option<f64> {
        self.components.get(&component).copied().flatten()
    }

    /// Components without data.
    pub fn missing_components(&self) -> impl Iterator<Item = Component> + '_ {
        self.components
            .iter()
            .filter(|(_, score)| score.is_none())
            .map(|(component, _)| *component)
    }
}

impl fmt::Display for HealthScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.overall, self.rating) {
            (Some(overall), Some(rating)) => write!(f, "{overall:.1}/10 ({rating})")?,
            _ => f.write_str("unavailable")?,
        }
        for component in Component::ALL {
            match self.component(component) {
                Some(score) => write!(f, ", {component} {score:.1}")?,
                None => write!(f, ", {component} n/a")?,
            }
        }
        write!(f, ", coverage {:.0}%", self.coverage * 100.0)
    }
}

/// Scores metrics against configured benchmarks and weights.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthScorer {
    /// Component weights.
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Sector benchmarks.
    #[serde(default)]
    pub benchmarks: BenchmarkTable,
}

impl HealthScorer {
    /// Creates a scorer, validating weights and benchmarks.
    pub fn new(weights: ScoringWeights, benchmarks: BenchmarkTable) -> Result<Self> {
        weights.validate()?;
        benchmarks.validate()?;
        Ok(Self {
            weights,
            benchmarks,
        })
    }

    /// Scores `metrics` using the benchmark for its sector.
    #[must_use]
    pub fn score(&self, metrics: &FinancialMetrics) -> HealthScore {
        let sector = self.benchmarks.resolve_sector(metrics.sector.as_deref());
        let score = self.aggregate(metrics, sector.map(str::to_string), |ratio| {
            self.benchmarks.band(sector, ratio).copied()
        });
        debug!(
            symbol = %metrics.symbol,
            overall = ?score.overall,
            coverage = score.coverage,
            "Scored financial health"
        );
        score
    }

    /// Scores `metrics` against an explicit benchmark.
    #[must_use]
    pub fn score_with(&self, metrics: &FinancialMetrics, benchmark: &SectorBenchmark) -> HealthScore {
        self.aggregate(metrics, None, |ratio| benchmark.band(ratio).copied())
    }

    fn aggregate(
        &self,
        metrics: &FinancialMetrics,
        benchmark: Option<String>,
        band_for: impl Fn(Ratio) -> Option<crate::RatioBand>,
    ) -> HealthScore {
        let ratio_scores: BTreeMap<Ratio, f64> = metrics
            .iter()
            .filter_map(|(ratio, value)| {
                band_for(ratio).map(|band| (ratio, band.score(value, ratio.direction())))
            })
            .collect();

        let components: BTreeMap<Component, Option<f64>> = Component::ALL
            .into_iter()
            .map(|component| {
                let scores: Vec<f64> = ratio_scores
                    .iter()
                    .filter(|(ratio, _)| ratio.component() == component)
                    .map(|(_, score)| *score)
                    .collect();
                let mean = (!scores.is_empty())
                    .then(|| scores.iter().sum::<f64>() / scores.len() as f64);
                (component, mean)
            })
            .collect();

        let (weighted, total_weight) = components
            .iter()
            .filter_map(|(component, score)| score.map(|s| (s, self.weights.weight(*component))))
            .fold((0.0, 0.0), |(sum, total), (score, weight)| {
                (sum + score * weight, total + weight)
            });
        let overall = (total_weight > 0.0).then(|| weighted / total_weight);

        HealthScore {
            symbol: metrics.symbol.clone(),
            benchmark,
            coverage: ratio_scores.len() as f64 / Ratio::ALL.len() as f64,
            ratio_scores,
            components,
            overall,
            rating: overall.map(Rating::from_score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_metrics() -> FinancialMetrics {
        FinancialMetrics::new(Symbol::new("ABC"))
            .with_ratio(Ratio::PriceToEarnings, Some(20.0))
            .with_ratio(Ratio::PriceToBook, Some(3.0))
            .with_ratio(Ratio::ReturnOnEquity, Some(18.0))
            .with_ratio(Ratio::NetMargin, Some(12.0))
            .with_ratio(Ratio::DebtToEquity, Some(0.6))
            .with_ratio(Ratio::CurrentRatio, Some(1.5))
            .with_ratio(Ratio::RevenueGrowth, Some(10.0))
            .with_ratio(Ratio::EarningsGrowth, Some(12.0))
    }

    #[test]
    fn test_deterministic_and_order_invariant() {
        let scorer = HealthScorer::default();
        let forward = full_metrics();

        let mut reversed = FinancialMetrics::new(Symbol::new("ABC"));
        let pairs: Vec<(Ratio, f64)> = forward.iter().collect();
        for (ratio, value) in pairs.into_iter().rev() {
            reversed.set(ratio, Some(value));
        }

        let a = scorer.score(&forward);
        let b = scorer.score(&reversed);
        let c = scorer.score(&forward);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_higher_pe_strictly_lowers_scores() {
        let scorer = HealthScorer::default();
        let base = scorer.score(&full_metrics());
        let pricier = scorer.score(
            &full_metrics().with_ratio(Ratio::PriceToEarnings, Some(26.0)),
        );

        assert!(pricier.component(Component::Valuation) < base.component(Component::Valuation));
        assert!(pricier.overall < base.overall);
        assert_eq!(
            pricier.component(Component::Profitability),
            base.component(Component::Profitability)
        );
    }

    #[test]
    fn test_missing_component_renormalizes() {
        let scorer = HealthScorer::default();
        let metrics = FinancialMetrics::new(Symbol::new("ABC"))
            .with_ratio(Ratio::PriceToEarnings, Some(20.0))
            .with_ratio(Ratio::ReturnOnEquity, Some(15.0))
            .with_ratio(Ratio::DebtToEquity, Some(0.8));
        let score = scorer.score(&metrics);

        assert_eq!(score.component(Component::Growth), None);
        assert_eq!(score.missing_components().collect::<Vec<_>>(), vec![Component::Growth]);

        // Every available ratio sits on its fair anchor, so each component is 5.
        let expected = (5.0 * 0.25 + 5.0 * 0.35 + 5.0 * 0.25) / (0.25 + 0.35 + 0.25);
        assert!((score.overall.unwrap() - expected).abs() < 1e-12);
        assert!((score.overall.unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(score.rating, Some(Rating::Fair));
    }

    #[test]
    fn test_renormalization_weights_remaining_components() {
        let scorer = HealthScorer::default();
        // Valuation at strong (8), profitability at poor (2), nothing else.
        let metrics = FinancialMetrics::new(Symbol::new("ABC"))
            .with_ratio(Ratio::PriceToEarnings, Some(12.0))
            .with_ratio(Ratio::ReturnOnEquity, Some(5.0));
        let score = scorer.score(&metrics);

        let expected = (8.0 * 0.25 + 2.0 * 0.35) / 0.60;
        assert!((score.overall.unwrap() - expected).abs() < 1e-12);
        assert!((score.coverage - 2.0 / 17.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_data_is_unavailable() {
        let score = HealthScorer::default().score(&FinancialMetrics::new(Symbol::new("ABC")));
        assert_eq!(score.overall, None);
        assert_eq!(score.rating, None);
        assert_eq!(score.coverage, 0.0);
        assert_eq!(score.missing_components().count(), 4);
        assert!(score.to_string().starts_with("unavailable"));
    }

    #[test]
    fn test_sector_changes_benchmark() {
        let scorer = HealthScorer::default();
        let generic = full_metrics().with_ratio(Ratio::PriceToEarnings, Some(28.0));
        let it = generic.clone().with_sector("IT Services");

        let generic_score = scorer.score(&generic);
        let it_score = scorer.score(&it);
        assert_eq!(generic_score.benchmark, None);
        assert_eq!(it_score.benchmark.as_deref(), Some("IT Services"));
        assert!(
            it_score.ratio_scores[&Ratio::PriceToEarnings]
                > generic_score.ratio_scores[&Ratio::PriceToEarnings]
        );
    }

    #[test]
    fn test_rating_bands() {
        assert_eq!(Rating::from_score(8.0), Rating::Excellent);
        assert_eq!(Rating::from_score(6.5), Rating::Good);
        assert_eq!(Rating::from_score(5.0), Rating::Fair);
        assert_eq!(Rating::from_score(3.0), Rating::Poor);
        assert_eq!(Rating::from_score(2.99), Rating::VeryPoor);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let weights = ScoringWeights {
            valuation: 0.0,
            profitability: 0.0,
            financial_health: 0.0,
            growth: 0.0,
        };
        assert!(HealthScorer::new(weights, BenchmarkTable::default()).is_err());

        let negative = ScoringWeights {
            growth: -0.1,
            ..ScoringWeights::default()
        };
        assert!(negative.validate().is_err());
    }
}
