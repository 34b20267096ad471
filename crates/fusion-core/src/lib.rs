#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for resilient market-data resolution.
//!
//! This crate provides the foundational abstractions shared by every provider,
//! cache and consumer:
//!
//! - [`DataProvider`](provider::DataProvider) - Uniform interface over fallible sources
//! - [`CompletionProvider`](provider::CompletionProvider) - Generative model vendors
//! - [`DataCache`](cache::DataCache) - Caching abstraction with per-entry TTL
//! - [`Request`](request::Request) and [`Payload`](payload::Payload) - What is asked and what comes back
//! - [`Clock`](clock::Clock) - Injectable time source

/// Cache trait for storing resolved payloads.
pub mod cache;
/// Capability tags and default cache lifetimes.
pub mod capability;
/// Injectable clocks.
pub mod clock;
/// Error types for data operations.
pub mod error;
/// Financial ratios grouped into scoring components.
pub mod metrics;
/// Resolved payloads.
pub mod payload;
/// Holdings and portfolio valuation.
pub mod portfolio;
/// Provider traits for market data and completions.
pub mod provider;
/// Requests and cache keys.
pub mod request;
/// Technical indicators over price histories.
pub mod technical;
/// Core data types (Symbol, Quote, OHLCV, news).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::DataCache;
pub use capability::Capability;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use error::{Attempt, DataError, Result};
pub use metrics::{Component, Direction, FinancialMetrics, Ratio};
pub use payload::Payload;
pub use portfolio::{Holding, HoldingValuation, PortfolioValuation};
pub use provider::{CompletionProvider, DataProvider, RateLimit};
pub use request::{CacheKey, Request};
pub use technical::{TechnicalSnapshot, Trend};
pub use types::{HistoryRange, NewsItem, OhlcvBar, PriceHistory, Quote, Symbol};
