#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Deterministic financial health scoring against sector benchmarks.
//!
//! - [`RatioBand`] - Thresholds and the bounded monotone mapping to a sub-score
//! - [`SectorBenchmark`] / [`BenchmarkTable`] - Bands per sector with a generic fallback
//! - [`ScoringWeights`] - Component weights
//! - [`HealthScorer`] - Produces a [`HealthScore`]

/// Ratio thresholds and the sub-score curve.
pub mod band;
/// Sector benchmark tables.
pub mod benchmark;
/// Component aggregation and the scorer.
pub mod score;

pub use band::RatioBand;
pub use benchmark::{BenchmarkTable, SectorBenchmark};
pub use score::{HealthScore, HealthScorer, Rating, ScoringWeights};
