//! Ratio thresholds and the sub-score curve.

use fusion_core::{DataError, Direction, Result};
use serde::{Deserialize, Serialize};

/// Sub-score at the `poor` threshold.
pub const POOR_SCORE: f64 = 2.0;
/// Sub-score at the `fair` threshold.
pub const FAIR_SCORE: f64 = 5.0;
/// Sub-score at the `strong` threshold.
pub const STRONG_SCORE: f64 = 8.0;
/// Upper bound of every sub-score.
pub const MAX_SCORE: f64 = 10.0;

/// Three thresholds for one ratio within a sector.
///
/// For a higher-is-better ratio the thresholds increase
/// (`poor < fair < strong`); for a lower-is-better ratio they decrease.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RatioBand {
    /// Value at which the ratio is considered poor.
    pub poor: f64,
    /// Value at which the ratio is considered fair.
    pub fair: f64,
    /// Value at which the ratio is considered strong.
    pub strong: f64,
}

impl RatioBand {
    /// Creates a band without validation.
    #[must_use]
    pub const fn new(poor: f64, fair: f64, strong: f64) -> Self {
        Self { poor, fair, strong }
    }

    /// Checks that the thresholds are finite and ordered for `direction`.
    pub fn validate(&self, direction: Direction) -> Result<()> {
        let finite = self.poor.is_finite() && self.fair.is_finite() && self.strong.is_finite();
        let ordered = match direction {
            Direction::HigherIsBetter => self.poor < self.fair && self.fair < self.strong,
            Direction::LowerIsBetter => self.poor > self.fair && self.fair > self.strong,
        };
        if finite && ordered {
            Ok(())
        } else {
            Err(DataError::Configuration(format!(
                "band {}/{}/{} is not ordered for {direction:?}",
                self.poor, self.fair, self.strong
            )))
        }
    }

    /// Maps `value` onto [0, 10].
    ///
    /// Linear between the anchors (poor, 2), (fair, 5), (strong, 8), with
    /// exponential tails toward 0 below `poor` and toward 10 above `strong`.
    /// The mapping is strictly monotone in the direction of improvement.
    #[must_use]
    pub fn score(&self, value: f64, direction: Direction) -> f64 {
        // Flip lower-is-better ratios so that larger always means better.
        let sign = match direction {
            Direction::HigherIsBetter => 1.0,
            Direction::LowerIsBetter => -1.0,
        };
        let x = value * sign;
        let (p, f, s) = (self.poor * sign, self.fair * sign, self.strong * sign);

        let score = if x <= p {
            POOR_SCORE * ((x - p) / (f - p)).exp()
        } else if x <= f {
            POOR_SCORE + (FAIR_SCORE - POOR_SCORE) * (x - p) / (f - p)
        } else if x <= s {
            FAIR_SCORE + (STRONG_SCORE - FAIR_SCORE) * (x - f) / (s - f)
        } else {
            MAX_SCORE - (MAX_SCORE - STRONG_SCORE) * (-(x - s) / (s - f)).exp()
        };
        score.clamp(0.0, MAX_SCORE)
    }
}
