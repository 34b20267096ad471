//! Technical indicators derived from a price history.

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};
use crate::types::PriceHistory;

const SHORT_WINDOW: usize = 5;
const LONG_WINDOW: usize = 20;
const RSI_WINDOW: usize = 14;
/// Moves smaller than this many percent count as flat.
const FLAT_BAND_PERCENT: f64 = 1.0;

/// Direction of the recent price trend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Price rose over the period.
    Up,
    /// Price fell over the period.
    Down,
    /// Price moved less than the flat band.
    Flat,
}

/// Snapshot of simple indicators at the end of a history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    /// Last close.
    pub last_close: f64,
    /// Mean of the last 5 closes.
    pub sma_5: Option<f64>,
    /// Mean of the last 20 closes.
    pub sma_20: Option<f64>,
    /// 14-period relative strength index.
    pub rsi_14: Option<f64>,
    /// Highest high over the period.
    pub period_high: f64,
    /// Lowest low over the period.
    pub period_low: f64,
    /// Change from first to last close, percent.
    pub trend_percent: f64,
}

impl TechnicalSnapshot {
    /// Computes the snapshot for a history.
    pub fn from_history(history: &PriceHistory) -> Result<Self> {
        Self::from_frame(&history.to_frame()?)
    }

    /// Computes the snapshot from a frame with `high`, `low` and `close` columns.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let closes: Vec<f64> = f64_column(df, "close")?
            .into_iter()
            .flatten()
            .filter(|v| v.is_finite())
            .collect();
        let (Some(first), Some(last)) = (closes.first().copied(), closes.last().copied()) else {
            return Err(DataError::InvalidParameter(
                "history has no closing prices".to_string(),
            ));
        };

        let period_high = ChunkAgg::max(f64_column(df, "high")?).unwrap_or(last);
        let period_low = ChunkAgg::min(f64_column(df, "low")?).unwrap_or(last);

        let trend_percent = if first == 0.0 {
            0.0
        } else {
            (last - first) / first * 100.0
        };

        Ok(Self {
            last_close: last,
            sma_5: sma(&closes, SHORT_WINDOW),
            sma_20: sma(&closes, LONG_WINDOW),
            rsi_14: rsi(&closes, RSI_WINDOW),
            period_high,
            period_low,
            trend_percent,
        })
    }

    /// Direction of the period's move.
    #[must_use]
    pub fn trend(&self) -> Trend {
        if self.trend_percent > FLAT_BAND_PERCENT {
            Trend::Up
        } else if self.trend_percent < -FLAT_BAND_PERCENT {
            Trend::Down
        } else {
            Trend::Flat
        }
    }
}

fn f64_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked> {
    df.column(name)
        .map_err(|e| DataError::Parse(e.to_string()))?
        .f64()
        .map_err(|e| DataError::Parse(e.to_string()))
}

/// Mean of the last `window` finite closes.
fn sma(closes: &[f64], window: usize) -> Option<f64> {
    let start = closes.len().checked_sub(window)?;
    Float64Chunked::from_slice("close".into(), &closes[start..]).mean()
}

/// Simple-average RSI over the last `window` changes.
fn rsi(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() <= window {
        return None;
    }
    let recent = &closes[closes.len() - window - 1..];
    let (gain, loss) = recent
        .windows(2)
        .map(|w| w[1] - w[0])
        .fold((0.0, 0.0), |(g, l), delta| {
            if delta > 0.0 {
                (g + delta, l)
            } else {
                (g, l - delta)
            }
        });
    let n = window as f64;
    let (avg_gain, avg_loss) = (gain / n, loss / n);
    if avg_loss == 0.0 {
        return (avg_gain > 0.0).then_some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}
