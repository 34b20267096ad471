//! The value a resolved request produces.

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::error::{DataError, Result};
use crate::metrics::FinancialMetrics;
use crate::types::{NewsItem, PriceHistory, Quote};

/// Result of resolving a [`Request`](crate::Request).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Latest price.
    Price(Quote),
    /// Daily history.
    History(PriceHistory),
    /// Ratios and figures.
    Fundamentals(FinancialMetrics),
    /// News items, newest first.
    News(Vec<NewsItem>),
    /// Raw generative model output.
    Completion(String),
}

impl Payload {
    /// Capability this payload answers.
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::Price(_) => Capability::CurrentPrice,
            Self::History(_) => Capability::HistoricalSeries,
            Self::Fundamentals(_) => Capability::Fundamentals,
            Self::News(_) => Capability::NewsItems,
            Self::Completion(_) => Capability::GenerateAnalysis,
        }
    }

    /// Size and shape description, safe to log.
    #[must_use]
    pub fn shape(&self) -> String {
        match self {
            Self::Price(_) => "price quote".to_string(),
            Self::History(h) => format!("history of {} bars", h.len()),
            Self::Fundamentals(m) => format!("fundamentals with {} ratios", m.available()),
            Self::News(items) => format!("{} news items", items.len()),
            Self::Completion(text) => format!("completion of {} chars", text.len()),
        }
    }

    /// Ensures the payload answers `expected`.
    pub fn expect_capability(&self, expected: Capability, provider: &str) -> Result<()> {
        if self.capability() == expected {
            Ok(())
        } else {
            Err(DataError::MalformedResponse {
                provider: provider.to_string(),
                shape: format!("{} where {expected} was requested", self.shape()),
            })
        }
    }

    /// Unwraps a quote.
    pub fn into_quote(self) -> Result<Quote> {
        match self {
            Self::Price(q) => Ok(q),
            other => Err(mismatch(&other, Capability::CurrentPrice)),
        }
    }

    /// Unwraps a price history.
    pub fn into_history(self) -> Result<PriceHistory> {
        match self {
            Self::History(h) => Ok(h),
            other => Err(mismatch(&other, Capability::HistoricalSeries)),
        }
    }

    /// Unwraps fundamentals.
    pub fn into_fundamentals(self) -> Result<FinancialMetrics> {
        match self {
            Self::Fundamentals(m) => Ok(m),
            other => Err(mismatch(&other, Capability::Fundamentals)),
        }
    }

    /// Unwraps news items.
    pub fn into_news(self) -> Result<Vec<NewsItem>> {
        match self {
            Self::News(items) => Ok(items),
            other => Err(mismatch(&other, Capability::NewsItems)),
        }
    }

    /// Unwraps a completion.
    pub fn into_completion(self) -> Result<String> {
        match self {
            Self::Completion(text) => Ok(text),
            other => Err(mismatch(&other, Capability::GenerateAnalysis)),
        }
    }
}

fn mismatch(payload: &Payload, expected: Capability) -> DataError {
    DataError::MalformedResponse {
        provider: "payload".to_string(),
        shape: format!("{} where {expected} was expected", payload.shape()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Symbol;
    use chrono::Utc;

    #[test]
    fn test_capability_check() {
        let payload = Payload::Price(Quote::new(Symbol::new("ABC"), 100.0, Utc::now()));
        assert!(payload.expect_capability(Capability::CurrentPrice, "mock").is_ok());

        let err = payload
            .expect_capability(Capability::Fundamentals, "mock")
            .unwrap_err();
        assert!(matches!(err, DataError::MalformedResponse { ref provider, .. } if provider == "mock"));
    }

    #[test]
    fn test_accessors() {
        let payload = Payload::Completion("ACTION: BUY".to_string());
        assert_eq!(payload.clone().into_completion().unwrap(), "ACTION: BUY");
        assert!(payload.into_quote().is_err());
    }

    #[test]
    fn test_shape_hides_content() {
        let payload = Payload::Completion("private analysis".to_string());
        assert_eq!(payload.shape(), "completion of 16 chars");
    }

    #[test]
    fn test_serde_round_trip() {
        let payload = Payload::News(vec![]);
        let json = serde_json::to_string(&payload).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
