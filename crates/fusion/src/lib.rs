#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Resilient multi-source market data and bounded-context prediction.
//!
//! This crate re-exports the core types and the vendor adapters, and provides
//! the [`FallbackResolver`] that turns capability requests into payloads
//! through a cache, rate limits and provider backoff. On top of it sit the
//! [`PredictionOrchestrator`] and the [`AnalysisPipeline`].
//!
//! # Features
//!
//! - `yahoo` - Yahoo Finance quotes, history and ratios
//! - `fmp` - Financial Modeling Prep, including news
//! - `synthetic` - Seeded local data used as the last resort
//! - `cache-sqlite` - SQLite-backed persistent cache

/// Configuration types.
pub mod config;
/// Provider health table and exponential backoff.
pub mod health;
/// End-to-end portfolio analysis.
pub mod pipeline;
/// Model and rule-based recommendations.
pub mod prediction;
/// Per-provider token buckets.
pub mod rate_limit;
/// Capability resolution with cache and fallback.
pub mod resolver;
/// Portfolio, news and delivery collaborators.
pub mod sources;
/// Building live components from a configuration.
pub mod system;

#[cfg(test)]
mod testing;

// Core types and traits
pub use fusion_core::*;

// Cache implementations
#[cfg(feature = "cache-sqlite")]
pub use fusion_cache::SqliteCache;
pub use fusion_cache::{InMemoryCache, NoopCache};

// Providers
#[cfg(feature = "fmp")]
pub use fusion_fmp::FmpProvider;
#[cfg(feature = "synthetic")]
pub use fusion_synthetic::SyntheticProvider;
#[cfg(feature = "yahoo")]
pub use fusion_yahoo::YahooProvider;

// Generative vendors
pub use fusion_llm::{
    Action, AnthropicProvider, GeminiProvider, GenerationSettings, GenerativeProvider,
    OpenAiProvider,
};

// Scoring and retrieval
pub use fusion_health::{HealthScore, HealthScorer, Rating};
pub use fusion_retrieval::{
    ContextWindow, DocumentIndex, NewsSentiment, SearchFilter, SentimentLabel, TypePriorities,
};

pub use config::{FusionConfig, ResolverSettings};
pub use health::{BackoffPolicy, HealthTable, ProviderState};
pub use pipeline::{AnalysisPipeline, AnalysisReport, SymbolReport};
pub use prediction::{PredictionOrchestrator, Recommendation, RuleBasedRecommender, Tier};
pub use rate_limit::RateLimiter;
pub use resolver::{FallbackResolver, ResolutionSource, Resolved, ResolverBuilder};
pub use sources::{
    DeliveryChannel, LogDelivery, NewsSource, PortfolioSource, StaticNews, StaticPortfolio,
};
pub use system::Fusion;
