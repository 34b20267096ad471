//! Configuration for a [`Fusion`](crate::Fusion) instance.
//!
//! Everything is plain serde data with defaults, so a JSON file only needs
//! the fields it overrides. API keys are never stored here, only the names of
//! the environment variables that hold them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use fusion_core::{Capability, DataError, HistoryRange, RateLimit, Result};
use fusion_health::HealthScorer;
use fusion_llm::GenerationSettings;
use fusion_retrieval::TypePriorities;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::health::BackoffPolicy;
use crate::prediction::RuleThresholds;

/// Context budget used when none is configured.
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 2000;

/// Serializes a [`Duration`] as fractional seconds.
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

/// Cache lifetime per capability. Zero disables caching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtls {
    /// Quotes.
    #[serde(with = "secs")]
    pub current_price: Duration,
    /// Price histories.
    #[serde(with = "secs")]
    pub historical_series: Duration,
    /// Ratios.
    #[serde(with = "secs")]
    pub fundamentals: Duration,
    /// News lists.
    #[serde(with = "secs")]
    pub news_items: Duration,
    /// Model completions.
    #[serde(with = "secs")]
    pub generate_analysis: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            current_price: Capability::CurrentPrice.default_ttl(),
            historical_series: Capability::HistoricalSeries.default_ttl(),
            fundamentals: Capability::Fundamentals.default_ttl(),
            news_items: Capability::NewsItems.default_ttl(),
            generate_analysis: Capability::GenerateAnalysis.default_ttl(),
        }
    }
}

impl CacheTtls {
    /// Lifetime for `capability`.
    #[must_use]
    pub const fn get(&self, capability: Capability) -> Duration {
        match capability {
            Capability::CurrentPrice => self.current_price,
            Capability::HistoricalSeries => self.historical_series,
            Capability::Fundamentals => self.fundamentals,
            Capability::NewsItems => self.news_items,
            Capability::GenerateAnalysis => self.generate_analysis,
        }
    }
}

/// Resolver timeouts, backoff and TTLs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Deadline for a single provider call.
    #[serde(with = "secs")]
    pub call_timeout: Duration,
    /// Longest the resolver waits for a rate-limited provider's next token
    /// before giving up on it.
    #[serde(with = "secs")]
    pub max_rate_limit_wait: Duration,
    /// Backoff after failures.
    pub backoff: BackoffPolicy,
    /// Cache lifetimes.
    pub ttls: CacheTtls,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
            max_rate_limit_wait: Duration::from_secs(120),
            backoff: BackoffPolicy::default(),
            ttls: CacheTtls::default(),
        }
    }
}

/// Ranking and context budget.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Per-type ranking multipliers.
    pub priorities: TypePriorities,
    /// Token budget of one model context.
    pub max_context_tokens: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            priorities: TypePriorities::default(),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
        }
    }
}

/// Run-level settings of the analysis pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Deadline for a whole run, covering data resolution and generation.
    #[serde(with = "secs")]
    pub run_timeout: Duration,
    /// History range used for technical indicators.
    pub history_range: HistoryRange,
    /// How far back news is requested.
    pub news_lookback_hours: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            run_timeout: Duration::from_secs(120),
            history_range: HistoryRange::default(),
            news_lookback_hours: 48,
        }
    }
}

/// Data vendors this crate can build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Yahoo Finance.
    Yahoo,
    /// Financial Modeling Prep.
    Fmp,
    /// Seeded synthetic data.
    Synthetic,
}

impl ProviderKind {
    /// Capabilities the vendor serves.
    #[must_use]
    pub const fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Yahoo => &[
                Capability::CurrentPrice,
                Capability::HistoricalSeries,
                Capability::Fundamentals,
            ],
            Self::Fmp | Self::Synthetic => &[
                Capability::CurrentPrice,
                Capability::HistoricalSeries,
                Capability::Fundamentals,
                Capability::NewsItems,
            ],
        }
    }

    /// Returns true if the vendor's feature is compiled in.
    #[must_use]
    pub const fn is_compiled(&self) -> bool {
        match self {
            Self::Yahoo => cfg!(feature = "yahoo"),
            Self::Fmp => cfg!(feature = "fmp"),
            Self::Synthetic => cfg!(feature = "synthetic"),
        }
    }

    /// Feature that compiles the vendor in.
    #[must_use]
    pub const fn feature(&self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Fmp => "fmp",
            Self::Synthetic => "synthetic",
        }
    }
}

const fn enabled() -> bool {
    true
}

/// One configured data vendor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Vendor.
    pub kind: ProviderKind,
    /// Disabled entries are ignored.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Rank override; lower is tried first.
    #[serde(default)]
    pub priority: Option<u8>,
    /// Call budget override.
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Seed for the synthetic vendor.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl ProviderConfig {
    /// Enabled entry for `kind` with vendor defaults.
    #[must_use]
    pub const fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            enabled: true,
            priority: None,
            rate_limit: None,
            api_key_env: None,
            seed: None,
        }
    }

    /// Reads the API key from `var`.
    #[must_use]
    pub fn with_api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    /// Overrides the rank.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Seeds the synthetic vendor.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    const fn is_active(&self) -> bool {
        self.enabled && self.kind.is_compiled()
    }
}

/// Generative model vendors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VendorKind {
    /// OpenAI chat completions.
    #[serde(rename = "openai")]
    OpenAi,
    /// Anthropic messages.
    Anthropic,
    /// Google Gemini.
    Gemini,
}

impl VendorKind {
    /// Environment variable read when none is configured.
    #[must_use]
    pub const fn default_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// One configured generative vendor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Vendor.
    pub vendor: VendorKind,
    /// Disabled entries are ignored.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Model override.
    #[serde(default)]
    pub model: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Endpoint override.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Rank override; lower is tried first.
    #[serde(default)]
    pub priority: Option<u8>,
    /// Call budget.
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    /// Sampling settings.
    #[serde(default)]
    pub settings: GenerationSettings,
}

impl GeneratorConfig {
    /// Enabled entry for `vendor` with vendor defaults.
    #[must_use]
    pub fn new(vendor: VendorKind) -> Self {
        Self {
            vendor,
            enabled: true,
            model: None,
            api_key_env: None,
            base_url: None,
            priority: None,
            rate_limit: None,
            settings: GenerationSettings::default(),
        }
    }

    /// Overrides the rank.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Environment variable holding the key.
    #[must_use]
    pub fn key_env(&self) -> &str {
        self.api_key_env
            .as_deref()
            .unwrap_or_else(|| self.vendor.default_key_env())
    }
}

/// Cache backend.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CacheConfig {
    /// Process-local map.
    #[default]
    Memory,
    /// SQLite file; needs the `cache-sqlite` feature.
    Sqlite {
        /// Database file.
        path: PathBuf,
    },
    /// No caching.
    None,
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Data vendors.
    pub providers: Vec<ProviderConfig>,
    /// Generative vendors.
    pub generators: Vec<GeneratorConfig>,
    /// Cache backend.
    pub cache: CacheConfig,
    /// Resolver timeouts, backoff and TTLs.
    pub resolver: ResolverSettings,
    /// Health scoring weights and benchmarks.
    pub scoring: HealthScorer,
    /// Ranking and context budget.
    pub retrieval: RetrievalSettings,
    /// Rule-based thresholds.
    pub rules: RuleThresholds,
    /// Run-level settings.
    pub pipeline: PipelineSettings,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig::new(ProviderKind::Yahoo),
                ProviderConfig::new(ProviderKind::Fmp).with_api_key_env("FMP_API_KEY"),
                ProviderConfig::new(ProviderKind::Synthetic).with_seed(42),
            ],
            generators: vec![
                GeneratorConfig::new(VendorKind::OpenAi).with_priority(10),
                GeneratorConfig::new(VendorKind::Anthropic).with_priority(20),
                GeneratorConfig::new(VendorKind::Gemini).with_priority(30),
            ],
            cache: CacheConfig::default(),
            resolver: ResolverSettings::default(),
            scoring: HealthScorer::default(),
            retrieval: RetrievalSettings::default(),
            rules: RuleThresholds::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl FusionConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// [`DataError::Configuration`] on malformed JSON or an invalid
    /// configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DataError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// [`DataError::Configuration`] when the file cannot be read, or as
    /// [`from_json`](Self::from_json).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading configuration");
        let json = std::fs::read_to_string(path).map_err(|e| {
            DataError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    /// Enabled providers whose feature is compiled in.
    pub fn active_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.is_active())
    }

    /// Checks that the configuration can run an analysis.
    ///
    /// # Errors
    ///
    /// [`DataError::Configuration`] when a required capability has no active
    /// provider, or a weight, benchmark, threshold, budget or timeout is
    /// invalid.
    pub fn validate(&self) -> Result<()> {
        for capability in Capability::REQUIRED {
            if !self
                .active_providers()
                .any(|p| p.kind.capabilities().contains(&capability))
            {
                return Err(DataError::Configuration(format!(
                    "no enabled provider serves {capability}"
                )));
            }
        }

        if matches!(self.cache, CacheConfig::Sqlite { .. }) && !cfg!(feature = "cache-sqlite") {
            return Err(DataError::Configuration(
                "sqlite cache requires the cache-sqlite feature".into(),
            ));
        }

        let limits = self
            .providers
            .iter()
            .filter_map(|p| p.rate_limit)
            .chain(self.generators.iter().filter_map(|g| g.rate_limit));
        for limit in limits {
            if limit.max_calls == 0 || limit.window.is_zero() {
                return Err(DataError::Configuration(format!(
                    "rate limit of {} calls per {:?} allows nothing",
                    limit.max_calls, limit.window
                )));
            }
        }

        self.scoring.weights.validate()?;
        self.scoring.benchmarks.validate()?;
        self.rules.validate()?;

        let resolver = &self.resolver;
        if resolver.call_timeout.is_zero() {
            return Err(DataError::Configuration("call timeout must be positive".into()));
        }
        if resolver.backoff.base.is_zero() || resolver.backoff.base > resolver.backoff.max {
            return Err(DataError::Configuration(format!(
                "backoff base {:?} must be positive and at most max {:?}",
                resolver.backoff.base, resolver.backoff.max
            )));
        }
        if self.retrieval.max_context_tokens == 0 {
            return Err(DataError::Configuration(
                "context budget must be positive".into(),
            ));
        }
        if self.pipeline.run_timeout.is_zero() {
            return Err(DataError::Configuration("run timeout must be positive".into()));
        }
        Ok(())
    }
}
