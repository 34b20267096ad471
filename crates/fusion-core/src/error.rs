//! Error types for data operations.
//!
//! This module defines [`DataError`] which covers every failure that can occur
//! when resolving, parsing, caching or generating data, and [`Attempt`] which
//! records how each provider in a fallback chain failed.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::capability::Capability;

/// Errors that can occur during data operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// The provider reported itself unavailable (missing credentials, outage).
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<Duration>,
    },

    /// A provider call exceeded its deadline.
    #[error("Provider {provider} timed out after {elapsed:?}")]
    Timeout {
        /// The provider that timed out.
        provider: String,
        /// The deadline that was exceeded.
        elapsed: Duration,
    },

    /// The provider answered with something that could not be used.
    ///
    /// Only the size and shape of the offending payload are kept, never the
    /// content itself.
    #[error("Malformed response from {provider}: {shape}")]
    MalformedResponse {
        /// The provider that produced the response.
        provider: String,
        /// Size/shape description of the response.
        shape: String,
    },

    /// Every configured provider for a capability failed or was skipped.
    #[error("All providers exhausted for {capability}: {}", format_attempts(.attempts))]
    AllProvidersExhausted {
        /// The capability that could not be satisfied.
        capability: Capability,
        /// What happened to each provider in the chain.
        attempts: Vec<Attempt>,
    },

    /// The generative model answered without a recognizable action.
    #[error("Unrecognized model output ({0} chars)")]
    UnrecognizedModelOutput(usize),

    /// Network-related errors (connection failures, HTTP errors, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication failed for a provider.
    #[error("Authentication failed for provider {0}")]
    AuthenticationFailed(String),

    /// The requested symbol was not found.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error interacting with the cache.
    #[error("Cache error: {0}")]
    Cache(String),

    /// No provider is registered for a capability.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// The configuration is invalid. This is the only run-aborting error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested feature is not supported.
    #[error("Feature not supported: {0}")]
    NotSupported(String),
}

impl DataError {
    /// Returns true if this error should bias the provider's health.
    ///
    /// Rate limiting moves on to the next provider but is not a hard failure.
    #[must_use]
    pub const fn is_hard_failure(&self) -> bool {
        !matches!(self, Self::RateLimited { .. })
    }

    /// Returns true if the error concerns the request rather than the provider.
    ///
    /// An unknown symbol says nothing about whether the provider is healthy.
    #[must_use]
    pub const fn is_request_specific(&self) -> bool {
        matches!(
            self,
            Self::SymbolNotFound(_) | Self::NotSupported(_) | Self::InvalidParameter(_)
        )
    }

    /// Returns true if the error aborts an entire analysis run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::ProviderNotConfigured(_))
    }

    /// Builds a [`DataError::MalformedResponse`] describing a raw body by size only.
    #[must_use]
    pub fn malformed_body(provider: &str, body: &str, reason: impl fmt::Display) -> Self {
        Self::MalformedResponse {
            provider: provider.to_string(),
            shape: format!("{} bytes, {reason}", body.len()),
        }
    }
}

/// Outcome of trying one provider while resolving a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attempt {
    /// Provider name.
    pub provider: String,
    /// Short description of why the provider did not answer.
    pub outcome: String,
}

impl Attempt {
    /// Creates a new attempt record.
    #[must_use]
    pub fn new(provider: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            outcome: outcome.into(),
        }
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.outcome)
    }
}

fn format_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no candidates tried".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_not_hard_failure() {
        let err = DataError::RateLimited {
            provider: "yahoo".to_string(),
            retry_after: None,
        };
        assert!(!err.is_hard_failure());
        assert!(DataError::Network("reset".to_string()).is_hard_failure());
        assert!(
            DataError::Timeout {
                provider: "fmp".to_string(),
                elapsed: Duration::from_secs(5),
            }
            .is_hard_failure()
        );
    }

    #[test]
    fn test_malformed_body_hides_content() {
        let err = DataError::malformed_body("fmp", "{\"secret\":\"token\"}", "missing field");
        let msg = err.to_string();
        assert!(msg.contains("18 bytes"));
        assert!(!msg.contains("secret"));
    }

    #[test]
    fn test_exhausted_lists_attempts() {
        let err = DataError::AllProvidersExhausted {
            capability: Capability::CurrentPrice,
            attempts: vec![
                Attempt::new("yahoo", "timeout"),
                Attempt::new("fmp", "unavailable"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("yahoo (timeout)"));
        assert!(msg.contains("fmp (unavailable)"));
    }

    #[test]
    fn test_fatal_errors() {
        assert!(DataError::Configuration("no providers".into()).is_fatal());
        assert!(!DataError::UnrecognizedModelOutput(12).is_fatal());
    }

    #[test]
    fn test_request_specific_errors() {
        assert!(DataError::SymbolNotFound("XYZ".into()).is_request_specific());
        assert!(DataError::NotSupported("news".into()).is_request_specific());
        assert!(!DataError::Network("reset".into()).is_request_specific());
    }
}
