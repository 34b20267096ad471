//! Wiring a [`FusionConfig`] into live components.

use std::sync::Arc;

use fusion_cache::{InMemoryCache, NoopCache};
use fusion_core::{
    CompletionProvider, DataCache, DataProvider, Result, SharedClock, system_clock,
};
use fusion_health::HealthScorer;
use fusion_llm::{AnthropicProvider, GeminiProvider, GenerativeProvider, OpenAiProvider};
use fusion_retrieval::DocumentIndex;
use tracing::{debug, info, warn};

use crate::config::{CacheConfig, FusionConfig, GeneratorConfig, ProviderConfig, VendorKind};
use crate::pipeline::AnalysisPipeline;
use crate::prediction::RuleBasedRecommender;
use crate::resolver::{FallbackResolver, ResolverBuilder};
use crate::sources::DeliveryChannel;

/// Resolver, index, scorer and rules built once from a configuration.
///
/// Every pipeline created from the same instance shares the cache, the
/// provider health table and the document index.
#[derive(Debug)]
pub struct Fusion {
    config: FusionConfig,
    resolver: Arc<FallbackResolver>,
    index: Arc<DocumentIndex>,
    scorer: HealthScorer,
    clock: SharedClock,
}

impl Fusion {
    /// Builds every component on the system clock.
    ///
    /// # Errors
    ///
    /// [`fusion_core::DataError::Configuration`] when the configuration is invalid or the
    /// cache cannot be opened.
    pub fn from_config(config: FusionConfig) -> Result<Self> {
        Self::from_config_with_clock(config, system_clock())
    }

    /// Builds every component on `clock`.
    ///
    /// # Errors
    ///
    /// As [`from_config`](Self::from_config).
    pub fn from_config_with_clock(config: FusionConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let scorer = HealthScorer::new(config.scoring.weights, config.scoring.benchmarks.clone())?;

        let mut builder = ResolverBuilder::new()
            .with_settings(config.resolver)
            .with_clock(clock.clone())
            .with_cache(build_cache(&config.cache, &clock)?);

        for provider in &config.providers {
            if !provider.enabled {
                debug!(kind = ?provider.kind, "Provider disabled");
                continue;
            }
            if !provider.kind.is_compiled() {
                warn!(
                    kind = ?provider.kind,
                    feature = provider.kind.feature(),
                    "Provider feature not compiled in, skipping"
                );
                continue;
            }
            if let Some(built) = build_provider(provider, &clock) {
                builder = builder.with_shared_provider(built);
            }
        }

        for generator in config.generators.iter().filter(|g| g.enabled) {
            if let Some(built) = build_generator(generator) {
                builder = builder.with_shared_provider(built);
            }
        }

        let resolver = builder.build();
        info!(
            providers = resolver.providers().len(),
            cache = ?config.cache,
            "Fusion ready"
        );

        Ok(Self {
            index: Arc::new(DocumentIndex::new(config.retrieval.priorities)),
            resolver: Arc::new(resolver),
            scorer,
            config,
            clock,
        })
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// The shared resolver.
    #[must_use]
    pub const fn resolver(&self) -> &Arc<FallbackResolver> {
        &self.resolver
    }

    /// The shared document index.
    #[must_use]
    pub const fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    /// A pipeline over the shared components that hands reports to
    /// `delivery`.
    #[must_use]
    pub fn pipeline(&self, delivery: Arc<dyn DeliveryChannel>) -> AnalysisPipeline {
        AnalysisPipeline::new(self.resolver.clone())
            .with_scorer(self.scorer.clone())
            .with_index(self.index.clone())
            .with_rules(RuleBasedRecommender::new(self.config.rules))
            .with_settings(self.config.pipeline)
            .with_max_context_tokens(self.config.retrieval.max_context_tokens)
            .with_delivery(delivery)
            .with_clock(self.clock.clone())
    }
}

fn build_cache(config: &CacheConfig, clock: &SharedClock) -> Result<Arc<dyn DataCache>> {
    match config {
        CacheConfig::Memory => Ok(Arc::new(InMemoryCache::with_clock(clock.clone()))),
        CacheConfig::None => Ok(Arc::new(NoopCache::new())),
        #[cfg(feature = "cache-sqlite")]
        CacheConfig::Sqlite { path } => Ok(Arc::new(
            fusion_cache::SqliteCache::new(path)?.with_clock(clock.clone()),
        )),
        #[cfg(not(feature = "cache-sqlite"))]
        CacheConfig::Sqlite { path } => Err(fusion_core::DataError::Configuration(format!(
            "cannot open {}: the cache-sqlite feature is not compiled in",
            path.display()
        ))),
    }
}

fn api_key(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.trim().is_empty())
}

#[allow(unused_variables)]
fn build_provider(config: &ProviderConfig, clock: &SharedClock) -> Option<Arc<dyn DataProvider>> {
    match config.kind {
        #[cfg(feature = "yahoo")]
        crate::config::ProviderKind::Yahoo => {
            let mut provider = fusion_yahoo::YahooProvider::new();
            if let Some(priority) = config.priority {
                provider = provider.with_priority(priority);
            }
            if let Some(limit) = config.rate_limit {
                provider = provider.with_rate_limit(limit);
            }
            Some(Arc::new(provider))
        }
        #[cfg(feature = "fmp")]
        crate::config::ProviderKind::Fmp => {
            let key = config.api_key_env.as_deref().and_then(api_key);
            if key.is_none() {
                warn!(env = ?config.api_key_env, "FMP API key not set, provider will report unavailable");
            }
            let mut provider = fusion_fmp::FmpProvider::new(key.unwrap_or_default());
            if let Some(priority) = config.priority {
                provider = provider.with_priority(priority);
            }
            if let Some(limit) = config.rate_limit {
                provider = provider.with_rate_limit(limit);
            }
            Some(Arc::new(provider))
        }
        #[cfg(feature = "synthetic")]
        crate::config::ProviderKind::Synthetic => {
            let mut provider = fusion_synthetic::SyntheticProvider::new(config.seed.unwrap_or(42))
                .with_clock(clock.clone());
            if let Some(priority) = config.priority {
                provider = provider.with_priority(priority);
            }
            Some(Arc::new(provider))
        }
        #[allow(unreachable_patterns)]
        kind => {
            warn!(kind = ?kind, "Provider feature not compiled in");
            None
        }
    }
}

fn build_generator(config: &GeneratorConfig) -> Option<Arc<dyn DataProvider>> {
    let env = config.key_env();
    let Some(key) = api_key(env) else {
        info!(vendor = ?config.vendor, env, "API key not set, skipping vendor");
        return None;
    };

    let vendor: Arc<dyn CompletionProvider> = match config.vendor {
        VendorKind::OpenAi => {
            let mut client = OpenAiProvider::new(key).with_settings(config.settings);
            if let Some(model) = &config.model {
                client = client.with_model(model.as_str());
            }
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url.as_str());
            }
            Arc::new(client)
        }
        VendorKind::Anthropic => {
            let mut client = AnthropicProvider::new(key).with_settings(config.settings);
            if let Some(model) = &config.model {
                client = client.with_model(model.as_str());
            }
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url.as_str());
            }
            Arc::new(client)
        }
        VendorKind::Gemini => {
            let mut client = GeminiProvider::new(key).with_settings(config.settings);
            if let Some(model) = &config.model {
                client = client.with_model(model.as_str());
            }
            if let Some(url) = &config.base_url {
                client = client.with_base_url(url.as_str());
            }
            Arc::new(client)
        }
    };

    let mut provider = GenerativeProvider::new(vendor);
    if let Some(priority) = config.priority {
        provider = provider.with_priority(priority);
    }
    if let Some(limit) = config.rate_limit {
        provider = provider.with_rate_limit(limit);
    }
    Some(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fusion_core::{Capability, DataError};

    const UNSET: &str = "FUSION_TEST_KEY_THAT_IS_NEVER_SET";

    fn unset_generator(vendor: VendorKind) -> GeneratorConfig {
        GeneratorConfig {
            api_key_env: Some(UNSET.to_string()),
            ..GeneratorConfig::new(vendor)
        }
    }

    #[test]
    fn test_rejects_config_without_providers() {
        let config = FusionConfig {
            providers: Vec::new(),
            ..FusionConfig::default()
        };
        let err = Fusion::from_config(config).unwrap_err();
        assert!(matches!(err, DataError::Configuration(_)));
    }

    #[test]
    fn test_generators_without_keys_are_skipped() {
        let generator = unset_generator(VendorKind::Anthropic);
        assert!(build_generator(&generator).is_none());
    }

    #[test]
    fn test_sqlite_cache_requires_feature() {
        let clock = system_clock();
        let config = CacheConfig::Sqlite {
            path: std::env::temp_dir().join("fusion-system-test.db"),
        };
        let built = build_cache(&config, &clock);
        assert_eq!(built.is_ok(), cfg!(feature = "cache-sqlite"));
    }

    #[cfg(feature = "synthetic")]
    mod synthetic {
        use super::*;
        use crate::config::{ProviderConfig, ProviderKind};
        use crate::prediction::Tier;
        use crate::sources::LogDelivery;
        use crate::testing::start;
        use fusion_core::{Holding, ManualClock, Symbol};

        fn offline_config() -> FusionConfig {
            FusionConfig {
                providers: vec![ProviderConfig::new(ProviderKind::Synthetic).with_seed(7)],
                generators: vec![
                    unset_generator(VendorKind::OpenAi),
                    unset_generator(VendorKind::Gemini),
                ],
                ..FusionConfig::default()
            }
        }

        #[test]
        fn test_builds_synthetic_only_system() {
            let fusion = Fusion::from_config(offline_config()).unwrap();
            let resolver = fusion.resolver();

            assert_eq!(resolver.providers().len(), 1);
            assert!(resolver.supports(Capability::CurrentPrice));
            assert!(resolver.supports(Capability::NewsItems));
            assert!(!resolver.supports(Capability::GenerateAnalysis));
        }

        #[tokio::test]
        async fn test_offline_run_uses_rules() {
            let clock = Arc::new(ManualClock::new(start()));
            let fusion = Fusion::from_config_with_clock(offline_config(), clock).unwrap();
            let pipeline = fusion.pipeline(Arc::new(LogDelivery));

            let holdings = vec![
                Holding::new("TCS.NS", 10.0, 3500.0).unwrap(),
                Holding::new("RELIANCE.NS", 4.0, 2400.0).unwrap(),
            ];
            let report = pipeline.run(&holdings, &[]).await.unwrap();

            assert_eq!(report.symbols.len(), 2);
            assert!(report.valuation.unpriced.is_empty());
            for entry in &report.symbols {
                assert!(entry.quote.is_some());
                assert_eq!(entry.recommendation.tier, Tier::RuleBased);
                assert!(entry.recommendation.confidence <= 0.5);
                assert_eq!(
                    entry.sources.get(&Capability::CurrentPrice).map(String::as_str),
                    Some("synthetic")
                );
            }
            assert!(!fusion.index().is_empty());

            let again = pipeline.run(&holdings, &[]).await.unwrap();
            let tcs = again.symbol(&Symbol::new("TCS.NS")).unwrap();
            assert_eq!(
                tcs.sources.get(&Capability::CurrentPrice).map(String::as_str),
                Some("cache")
            );
        }
    }
}
