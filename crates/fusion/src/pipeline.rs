//! End-to-end analysis of a portfolio.
//!
//! A run resolves every symbol's data concurrently under a deadline, scores
//! and values what arrived, reads the tone of its news, indexes all of it,
//! and asks the orchestrator for one recommendation per symbol from a
//! budgeted, symbol-filtered context. Generation shares the same deadline.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fusion_core::{
    Capability, DataError, FinancialMetrics, Holding, NewsItem, Payload, PortfolioValuation,
    PriceHistory, Quote, Request, Result, SharedClock, Symbol, TechnicalSnapshot, system_clock,
};
use fusion_health::{HealthScore, HealthScorer};
use fusion_retrieval::{
    Document, DocumentIndex, NewsSentiment, SearchFilter, TypePriorities, fundamentals_document,
    news_document, portfolio_document, quote_document, sentiment_document,
};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_MAX_CONTEXT_TOKENS, PipelineSettings};
use crate::prediction::{
    PredictionInputs, PredictionOrchestrator, Recommendation, RuleBasedRecommender,
};
use crate::resolver::{FallbackResolver, ResolutionSource, Resolved};
use crate::sources::{DeliveryChannel, LogDelivery, NewsSource, PortfolioSource};

/// Capabilities resolved for every symbol.
const DATA_CAPABILITIES: [Capability; 4] = [
    Capability::CurrentPrice,
    Capability::HistoricalSeries,
    Capability::Fundamentals,
    Capability::NewsItems,
];

/// Outcome for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolReport {
    /// Symbol analysed.
    pub symbol: Symbol,
    /// Recommendation.
    pub recommendation: Recommendation,
    /// Financial health score.
    pub health: HealthScore,
    /// Tone of the symbol's news.
    pub sentiment: NewsSentiment,
    /// Latest quote, if any source had one.
    pub quote: Option<Quote>,
    /// Indicators over the resolved history.
    pub technical: Option<TechnicalSnapshot>,
    /// Where each resolved capability came from.
    pub sources: BTreeMap<Capability, String>,
    /// Capabilities no source could supply.
    pub incomplete: Vec<Capability>,
    /// Documents that made it into the model context.
    pub context_documents: Vec<String>,
    /// Estimated size of that context in tokens.
    pub context_tokens: usize,
}

/// Outcome of a whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// When the run finished resolving data.
    pub generated_at: DateTime<Utc>,
    /// Per-symbol results, in holding order.
    pub symbols: Vec<SymbolReport>,
    /// Portfolio valuation at the resolved prices.
    pub valuation: PortfolioValuation,
}

impl AnalysisReport {
    /// Report for `symbol`.
    #[must_use]
    pub fn symbol(&self, symbol: &Symbol) -> Option<&SymbolReport> {
        self.symbols.iter().find(|s| &s.symbol == symbol)
    }

    /// Mean sentiment score over symbols that had news.
    #[must_use]
    pub fn market_sentiment(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .symbols
            .iter()
            .filter(|s| !s.sentiment.is_empty())
            .map(|s| s.sentiment.score)
            .collect();
        // Bounded by the number of holdings.
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
    }

    /// Returns true if every symbol got every capability.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.symbols.iter().all(|s| s.incomplete.is_empty())
    }
}

#[derive(Debug, Default)]
struct SymbolData {
    quote: Option<Quote>,
    history: Option<PriceHistory>,
    metrics: Option<FinancialMetrics>,
    news: Vec<NewsItem>,
    sources: BTreeMap<Capability, String>,
    incomplete: BTreeSet<Capability>,
}

impl SymbolData {
    fn absorb(&mut self, resolved: Resolved) {
        let capability = resolved.payload.capability();
        self.sources.insert(capability, resolved.source.to_string());
        match resolved.payload {
            Payload::Price(quote) => self.quote = Some(quote),
            Payload::History(history) => self.history = Some(history),
            Payload::Fundamentals(metrics) => self.metrics = Some(metrics),
            Payload::News(items) => self.news = items,
            Payload::Completion(_) => {}
        }
    }
}

/// Runs analyses against one resolver, index and scorer.
#[derive(Debug)]
pub struct AnalysisPipeline {
    resolver: Arc<FallbackResolver>,
    scorer: HealthScorer,
    index: Arc<DocumentIndex>,
    orchestrator: PredictionOrchestrator,
    settings: PipelineSettings,
    max_context_tokens: usize,
    delivery: Arc<dyn DeliveryChannel>,
    clock: SharedClock,
}

impl AnalysisPipeline {
    /// Creates a pipeline with default scoring, retrieval and rules that
    /// logs its reports.
    #[must_use]
    pub fn new(resolver: Arc<FallbackResolver>) -> Self {
        let orchestrator =
            PredictionOrchestrator::new(resolver.clone(), RuleBasedRecommender::default());
        Self {
            resolver,
            scorer: HealthScorer::default(),
            index: Arc::new(DocumentIndex::new(TypePriorities::default())),
            orchestrator,
            settings: PipelineSettings::default(),
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            delivery: Arc::new(LogDelivery),
            clock: system_clock(),
        }
    }

    /// Uses `scorer` for fundamentals.
    #[must_use]
    pub fn with_scorer(mut self, scorer: HealthScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Indexes documents into `index`.
    #[must_use]
    pub fn with_index(mut self, index: Arc<DocumentIndex>) -> Self {
        self.index = index;
        self
    }

    /// Falls back to `rules` when no model answers.
    #[must_use]
    pub fn with_rules(mut self, rules: RuleBasedRecommender) -> Self {
        self.orchestrator = PredictionOrchestrator::new(self.resolver.clone(), rules);
        self
    }

    /// Overrides the run deadline, history range and news lookback.
    #[must_use]
    pub const fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Caps each model context at `max_tokens` estimated tokens.
    #[must_use]
    pub const fn with_max_context_tokens(mut self, max_tokens: usize) -> Self {
        self.max_context_tokens = max_tokens;
        self
    }

    /// Sends reports to `delivery`.
    #[must_use]
    pub fn with_delivery(mut self, delivery: Arc<dyn DeliveryChannel>) -> Self {
        self.delivery = delivery;
        self
    }

    /// Timestamps documents and reports with `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// The resolver every request goes through.
    #[must_use]
    pub const fn resolver(&self) -> &Arc<FallbackResolver> {
        &self.resolver
    }

    /// The document index, shared across runs.
    #[must_use]
    pub const fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    /// Loads holdings and news from the collaborators, then runs.
    ///
    /// A failing news source only costs the external news.
    ///
    /// # Errors
    ///
    /// When the portfolio cannot be loaded, or as [`run`](Self::run).
    pub async fn run_from(
        &self,
        portfolio: &dyn PortfolioSource,
        news: &dyn NewsSource,
    ) -> Result<AnalysisReport> {
        let holdings = portfolio.holdings().await?;
        let symbols = unique_symbols(&holdings);
        let external = news.items(&symbols).await.unwrap_or_else(|e| {
            warn!(error = %e, "News source failed, continuing without external news");
            Vec::new()
        });
        self.run(&holdings, &external).await
    }

    /// Analyses `holdings`, adding `external_news` to the index.
    ///
    /// # Errors
    ///
    /// [`DataError::Configuration`] when no provider serves a required
    /// capability. Every other failure degrades the report instead.
    #[instrument(skip_all, fields(holdings = holdings.len()))]
    pub async fn run(
        &self,
        holdings: &[Holding],
        external_news: &[NewsItem],
    ) -> Result<AnalysisReport> {
        for capability in Capability::REQUIRED {
            if !self.resolver.supports(capability) {
                return Err(DataError::Configuration(format!(
                    "no provider configured for {capability}"
                )));
            }
        }

        let deadline = Instant::now() + self.settings.run_timeout;
        let symbols = unique_symbols(holdings);
        let mut data: HashMap<Symbol, SymbolData> = symbols
            .iter()
            .map(|s| (s.clone(), SymbolData::default()))
            .collect();

        self.resolve_all(&symbols, &mut data, deadline).await;
        let generated_at = self.clock.now();

        let prices: HashMap<Symbol, f64> = data
            .iter()
            .filter_map(|(symbol, d)| d.quote.as_ref().map(|q| (symbol.clone(), q.price)))
            .collect();
        let valuation = PortfolioValuation::compute(holdings, &prices);

        let mut scored = HashMap::with_capacity(symbols.len());
        let mut documents = vec![portfolio_document(&valuation, generated_at)];
        for symbol in &symbols {
            let Some(d) = data.get(symbol) else { continue };
            let technical = d.history.as_ref().and_then(|h| {
                TechnicalSnapshot::from_history(h)
                    .map_err(|e| debug!(symbol = %symbol, error = %e, "No technical snapshot"))
                    .ok()
            });
            let metrics = d
                .metrics
                .clone()
                .unwrap_or_else(|| FinancialMetrics::new(symbol.clone()));
            let health = self.scorer.score(&metrics);

            if let Some(quote) = &d.quote {
                let source = source_of(d, Capability::CurrentPrice);
                documents.push(quote_document(quote, technical.as_ref(), source));
            }
            if let Some(metrics) = &d.metrics {
                let source = source_of(d, Capability::Fundamentals);
                documents.push(fundamentals_document(metrics, &health, source, generated_at));
            }
            documents.extend(d.news.iter().map(news_document));

            let mentions = external_news.iter().filter(|n| n.symbols.contains(symbol));
            let sentiment = NewsSentiment::analyze(symbol.clone(), d.news.iter().chain(mentions));
            documents.push(sentiment_document(&sentiment, generated_at));
            scored.insert(symbol.clone(), (technical, health, sentiment));
        }
        documents.extend(external_news.iter().map(news_document));
        self.commit(documents);

        let reports = futures::future::join_all(symbols.iter().filter_map(|symbol| {
            let d = data.get(symbol)?;
            let (technical, health, sentiment) = scored.get(symbol)?;
            let valuation = &valuation;
            Some(async move {
                let context = self.index.assemble_context(
                    &context_query(symbol),
                    self.max_context_tokens,
                    &SearchFilter::Symbol(symbol.clone()),
                );
                let inputs = PredictionInputs::new(symbol)
                    .with_holding(valuation.holding(symbol))
                    .with_quote(d.quote.as_ref())
                    .with_technical(technical.as_ref())
                    .with_health(Some(health))
                    .with_sentiment(Some(sentiment));
                let recommendation = match tokio::time::timeout_at(
                    deadline,
                    self.orchestrator.generate(&context, &inputs),
                )
                .await
                {
                    Ok(recommendation) => recommendation,
                    Err(_) => {
                        warn!(symbol = %symbol, "Run deadline reached during generation, using rules");
                        self.orchestrator.rules().recommend(&inputs)
                    }
                };

                SymbolReport {
                    symbol: symbol.clone(),
                    recommendation,
                    health: health.clone(),
                    sentiment: sentiment.clone(),
                    quote: d.quote.clone(),
                    technical: technical.clone(),
                    sources: d.sources.clone(),
                    incomplete: d.incomplete.iter().copied().collect(),
                    context_documents: context.document_ids,
                    context_tokens: context.estimated_tokens,
                }
            })
        }))
        .await;

        let report = AnalysisReport {
            generated_at,
            symbols: reports,
            valuation,
        };
        info!(
            symbols = report.symbols.len(),
            complete = report.is_complete(),
            "Analysis finished"
        );

        if let Err(e) = self.delivery.deliver(&report).await {
            warn!(error = %e, "Report delivery failed");
        }
        Ok(report)
    }

    /// Resolves every data capability of every symbol until done or
    /// `deadline`. Requests still in flight at the deadline are dropped.
    async fn resolve_all(
        &self,
        symbols: &[Symbol],
        data: &mut HashMap<Symbol, SymbolData>,
        deadline: Instant,
    ) {
        let mut requests = Vec::new();
        for symbol in symbols {
            for capability in DATA_CAPABILITIES {
                if !self.resolver.supports(capability) {
                    if let Some(d) = data.get_mut(symbol) {
                        d.incomplete.insert(capability);
                    }
                    continue;
                }
                requests.push((symbol.clone(), self.request_for(symbol, capability)));
            }
        }

        let mut settled = vec![false; requests.len()];
        let mut pending: FuturesUnordered<_> = requests
            .iter()
            .enumerate()
            .map(|(i, (_, request))| async move {
                (i, self.resolver.resolve_or_last_known(request).await)
            })
            .collect();

        loop {
            let next = tokio::time::timeout_at(deadline, pending.next()).await;
            match next {
                Ok(Some((i, outcome))) => {
                    settled[i] = true;
                    let (symbol, request) = &requests[i];
                    let Some(d) = data.get_mut(symbol) else { continue };
                    match outcome {
                        Ok(resolved) => d.absorb(resolved),
                        Err(e) => {
                            warn!(
                                symbol = %symbol,
                                capability = %request.capability(),
                                error = %e,
                                "Capability unavailable"
                            );
                            d.incomplete.insert(request.capability());
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(in_flight = pending.len(), "Run deadline reached, dropping requests");
                    break;
                }
            }
        }
        drop(pending);

        for (i, (symbol, request)) in requests.iter().enumerate() {
            if settled[i] {
                continue;
            }
            let Some(d) = data.get_mut(symbol) else { continue };
            match self.resolver.last_known(request) {
                Some(payload) => d.absorb(Resolved {
                    payload,
                    source: ResolutionSource::LastKnown,
                }),
                None => {
                    d.incomplete.insert(request.capability());
                }
            }
        }
    }

    fn request_for(&self, symbol: &Symbol, capability: Capability) -> Request {
        match capability {
            Capability::HistoricalSeries => {
                Request::history(symbol.clone(), self.settings.history_range)
            }
            Capability::Fundamentals => Request::fundamentals(symbol.clone()),
            Capability::NewsItems => {
                Request::news(symbol.clone(), self.settings.news_lookback_hours)
            }
            Capability::CurrentPrice | Capability::GenerateAnalysis => {
                Request::current_price(symbol.clone())
            }
        }
    }

    fn commit(&self, documents: Vec<Document>) {
        debug!(documents = documents.len(), "Indexing documents");
        self.index.index_all(documents);
    }
}

fn unique_symbols(holdings: &[Holding]) -> Vec<Symbol> {
    let mut seen = BTreeSet::new();
    holdings
        .iter()
        .filter(|h| seen.insert(h.symbol.clone()))
        .map(|h| h.symbol.clone())
        .collect()
}

fn source_of(data: &SymbolData, capability: Capability) -> &str {
    data.sources.get(&capability).map_or("unknown", String::as_str)
}

fn context_query(symbol: &Symbol) -> String {
    format!(
        "{symbol} {} price trend fundamentals valuation profitability growth debt news sentiment portfolio",
        symbol.base()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProviderState;
    use crate::prediction::Tier;
    use crate::resolver::ResolverBuilder;
    use crate::sources::{StaticNews, StaticPortfolio};
    use crate::testing::{Behavior, ScriptedProvider, start};
    use fusion_core::{ManualClock, Ratio};
    use fusion_llm::Action;
    use fusion_retrieval::SentimentLabel;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Collect(Mutex<Vec<AnalysisReport>>);

    #[async_trait::async_trait]
    impl DeliveryChannel for Collect {
        async fn deliver(&self, report: &AnalysisReport) -> Result<()> {
            self.0.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    fn strong_ratios() -> Vec<(Ratio, f64)> {
        vec![
            (Ratio::PriceToEarnings, 12.0),
            (Ratio::ReturnOnEquity, 35.0),
            (Ratio::NetMargin, 25.0),
            (Ratio::DebtToEquity, 0.1),
            (Ratio::CurrentRatio, 3.0),
            (Ratio::RevenueGrowth, 25.0),
        ]
    }

    fn pipeline(
        clock: &ManualClock,
        providers: Vec<Arc<ScriptedProvider>>,
    ) -> (AnalysisPipeline, Arc<Collect>) {
        let shared = Arc::new(clock.clone());
        let resolver = providers
            .into_iter()
            .fold(ResolverBuilder::new(), |b, p| b.with_shared_provider(p))
            .with_clock(shared.clone())
            .build();
        let delivery = Arc::new(Collect::default());
        let pipeline = AnalysisPipeline::new(Arc::new(resolver))
            .with_delivery(delivery.clone())
            .with_clock(shared);
        (pipeline, delivery)
    }

    #[tokio::test]
    async fn test_cached_price_end_to_end() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(140.0));
        let fundamentals =
            ScriptedProvider::new("fundamentals", 1, Behavior::Fundamentals(strong_ratios()));
        let (pipeline, delivery) = pipeline(&clock, vec![prices.clone(), fundamentals]);

        let abc = Symbol::new("ABC");
        let cached = Payload::Price(Quote::new(abc.clone(), 100.0, start()));
        pipeline
            .resolver()
            .cache()
            .put(
                &Request::current_price("ABC").cache_key(),
                &cached,
                Duration::from_secs(300),
            )
            .await
            .unwrap();
        clock.advance(Duration::from_secs(120));

        let holdings = vec![Holding::new("ABC", 10.0, 80.0).unwrap()];
        let report = pipeline.run(&holdings, &[]).await.unwrap();

        assert_eq!(prices.calls(), 0);
        let entry = report.symbol(&abc).unwrap();
        assert_eq!(entry.quote.as_ref().map(|q| q.price), Some(100.0));
        assert_eq!(
            entry.sources.get(&Capability::CurrentPrice).map(String::as_str),
            Some("cache")
        );
        assert!((report.valuation.total_current_value - 1000.0).abs() < 1e-9);
        assert!((report.valuation.total_pnl - 200.0).abs() < 1e-9);
        assert!(entry.incomplete.contains(&Capability::HistoricalSeries));
        assert!(entry.incomplete.contains(&Capability::NewsItems));
        assert_eq!(delivery.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_every_vendor_failing_yields_rule_based_recommendation() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(500.0));
        let fundamentals =
            ScriptedProvider::new("fundamentals", 1, Behavior::Fundamentals(strong_ratios()));
        let openai = ScriptedProvider::new("openai", 1, Behavior::Completion(String::new()));
        openai.set_behavior(Behavior::Fail(DataError::Network("down".into())));
        let anthropic = ScriptedProvider::new("anthropic", 2, Behavior::Completion(String::new()));
        anthropic.set_behavior(Behavior::Fail(DataError::AuthenticationFailed("anthropic".into())));
        let (pipeline, _delivery) = pipeline(
            &clock,
            vec![prices, fundamentals, openai.clone(), anthropic.clone()],
        );

        let holdings = vec![Holding::new("TCS.NS", 5.0, 400.0).unwrap()];
        let report = pipeline.run(&holdings, &[]).await.unwrap();

        let entry = report.symbol(&Symbol::new("TCS.NS")).unwrap();
        let overall = entry.health.overall.unwrap();
        assert!(overall >= 7.0, "strong ratios scored {overall}");
        assert_eq!(entry.recommendation.action, Action::Buy);
        assert_eq!(entry.recommendation.tier, Tier::RuleBased);
        assert!(entry.recommendation.confidence <= 0.5);
        assert_eq!((openai.calls(), anthropic.calls()), (1, 1));
    }

    #[tokio::test]
    async fn test_model_recommendation_sees_filtered_context() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(10.0));
        let fundamentals =
            ScriptedProvider::new("fundamentals", 1, Behavior::Fundamentals(strong_ratios()));
        let model = ScriptedProvider::new(
            "model",
            1,
            Behavior::Completion("ACTION: HOLD\nCONFIDENCE: 6\nRATIONALE: Fairly valued.".into()),
        );
        let (pipeline, _delivery) = pipeline(&clock, vec![prices, fundamentals, model]);

        let holdings = vec![
            Holding::new("AAA", 1.0, 10.0).unwrap(),
            Holding::new("BBB", 1.0, 10.0).unwrap(),
        ];
        let news = vec![NewsItem::new(
            vec![Symbol::new("BBB")],
            "BBB price target raised",
            "Brokers see BBB fundamentals improving",
            start(),
        )];
        let report = pipeline.run(&holdings, &news).await.unwrap();

        let aaa = report.symbol(&Symbol::new("AAA")).unwrap();
        assert_eq!(aaa.recommendation.action, Action::Hold);
        assert_eq!(
            aaa.recommendation.tier,
            Tier::Model {
                provider: "model".into()
            }
        );
        assert!(!aaa.context_documents.is_empty());
        assert!(aaa.context_documents.iter().all(|id| !id.starts_with("news:")));
        assert!(aaa.context_tokens <= DEFAULT_MAX_CONTEXT_TOKENS);

        assert!(aaa.context_documents.iter().any(|id| id == "sentiment:AAA"));
        assert!(aaa.sentiment.is_empty());

        let bbb = report.symbol(&Symbol::new("BBB")).unwrap();
        assert!(bbb.context_documents.iter().any(|id| id.starts_with("news:")));
        assert_eq!(bbb.sentiment.article_count, 1);
        assert_eq!(bbb.sentiment.label, SentimentLabel::Positive);
        assert_eq!(report.market_sentiment(), Some(bbb.sentiment.score));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_drops_slow_requests() {
        let clock = ManualClock::new(start());
        let slow = ScriptedProvider::new("slow", 1, Behavior::Slow(Duration::from_secs(600), 1.0));
        let fundamentals =
            ScriptedProvider::new("fundamentals", 1, Behavior::Fundamentals(strong_ratios()));
        let (pipeline, _delivery) = pipeline(&clock, vec![slow, fundamentals]);
        let pipeline = pipeline.with_settings(PipelineSettings {
            run_timeout: Duration::from_secs(5),
            ..PipelineSettings::default()
        });

        let holdings = vec![Holding::new("ABC", 1.0, 1.0).unwrap()];
        let report = pipeline.run(&holdings, &[]).await.unwrap();

        let entry = report.symbol(&Symbol::new("ABC")).unwrap();
        assert!(entry.quote.is_none());
        assert!(entry.incomplete.contains(&Capability::CurrentPrice));
        assert!(!entry.incomplete.contains(&Capability::Fundamentals));
        assert_eq!(report.valuation.unpriced, vec![Symbol::new("ABC")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_covers_generation() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(10.0));
        let fundamentals =
            ScriptedProvider::new("fundamentals", 1, Behavior::Fundamentals(strong_ratios()));
        let model = ScriptedProvider::new("model", 1, Behavior::Slow(Duration::from_secs(600), 0.0))
            .with_capabilities(&[Capability::GenerateAnalysis]);
        let (pipeline, delivery) = pipeline(&clock, vec![prices, fundamentals, model.clone()]);
        let pipeline = pipeline.with_settings(PipelineSettings {
            run_timeout: Duration::from_secs(5),
            ..PipelineSettings::default()
        });

        let started = tokio::time::Instant::now();
        let holdings = vec![Holding::new("ABC", 1.0, 8.0).unwrap()];
        let report = pipeline.run(&holdings, &[]).await.unwrap();

        assert!(started.elapsed() <= Duration::from_secs(5));
        assert_eq!(model.calls(), 1);
        let entry = report.symbol(&Symbol::new("ABC")).unwrap();
        assert_eq!(entry.quote.as_ref().map(|q| q.price), Some(10.0));
        assert_eq!(entry.recommendation.tier, Tier::RuleBased);
        assert_eq!(entry.recommendation.action, Action::Buy);
        assert_eq!(delivery.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_negative_news_reaches_rules_and_index() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(10.0));
        let fundamentals = ScriptedProvider::new(
            "fundamentals",
            1,
            Behavior::Fundamentals(vec![
                (Ratio::ReturnOnEquity, 1.0),
                (Ratio::NetMargin, -5.0),
                (Ratio::DebtToEquity, 4.0),
                (Ratio::CurrentRatio, 0.5),
            ]),
        );
        let (pipeline, _delivery) = pipeline(&clock, vec![prices, fundamentals]);

        let holdings = vec![Holding::new("XYZ", 1.0, 20.0).unwrap()];
        let news = vec![
            NewsItem::new(vec![Symbol::new("XYZ")], "XYZ shares plunge", "Fraud lawsuit filed", start()),
            NewsItem::new(vec![Symbol::new("XYZ")], "XYZ misses estimates", "Weak demand", start()),
        ];
        let report = pipeline.run(&holdings, &news).await.unwrap();

        let entry = report.symbol(&Symbol::new("XYZ")).unwrap();
        assert_eq!(entry.sentiment.label, SentimentLabel::Negative);
        assert_eq!((entry.sentiment.negative, entry.sentiment.article_count), (2, 2));
        assert!(entry.health.overall.unwrap() <= 3.0);
        assert_eq!(entry.recommendation.action, Action::Sell);
        assert!(entry.recommendation.rationale.contains("news sentiment negative"));
        assert!(entry.context_documents.iter().any(|id| id == "sentiment:XYZ"));
    }

    #[tokio::test]
    async fn test_last_known_price_survives_outage() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(42.0));
        let fundamentals =
            ScriptedProvider::new("fundamentals", 1, Behavior::Fundamentals(strong_ratios()));
        let (pipeline, _delivery) = pipeline(&clock, vec![prices.clone(), fundamentals]);
        let holdings = vec![Holding::new("ABC", 1.0, 40.0).unwrap()];

        pipeline.run(&holdings, &[]).await.unwrap();
        prices.set_behavior(Behavior::Fail(DataError::Network("down".into())));
        clock.advance(Duration::from_secs(3600));

        let report = pipeline.run(&holdings, &[]).await.unwrap();
        let entry = report.symbol(&Symbol::new("ABC")).unwrap();
        assert_eq!(entry.quote.as_ref().map(|q| q.price), Some(42.0));
        assert_eq!(
            entry.sources.get(&Capability::CurrentPrice),
            Some(&ResolutionSource::LastKnown.to_string())
        );
        assert!(!entry.incomplete.contains(&Capability::CurrentPrice));
        assert_eq!(
            pipeline.resolver().health().state("prices"),
            ProviderState::BackingOff
        );
    }

    #[tokio::test]
    async fn test_missing_required_provider_aborts() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(1.0))
            .with_capabilities(&[Capability::CurrentPrice, Capability::HistoricalSeries]);
        let (pipeline, delivery) = pipeline(&clock, vec![prices.clone()]);

        let holdings = vec![Holding::new("ABC", 1.0, 1.0).unwrap()];
        let err = pipeline.run(&holdings, &[]).await.unwrap_err();
        assert!(matches!(err, DataError::Configuration(ref m) if m.contains("fundamentals")));
        assert!(delivery.0.lock().unwrap().is_empty());
        assert_eq!(prices.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_from_collaborators() {
        let clock = ManualClock::new(start());
        let prices = ScriptedProvider::new("prices", 1, Behavior::Price(20.0));
        let fundamentals =
            ScriptedProvider::new("fundamentals", 1, Behavior::Fundamentals(Vec::new()));
        let news = ScriptedProvider::new("news", 1, Behavior::NoNews);
        let (pipeline, delivery) = pipeline(&clock, vec![prices, fundamentals, news]);

        let portfolio = StaticPortfolio::new(vec![
            Holding::new("XYZ", 2.0, 10.0).unwrap(),
            Holding::new("XYZ", 1.0, 12.0).unwrap(),
        ]);
        let report = pipeline
            .run_from(&portfolio, &StaticNews::default())
            .await
            .unwrap();

        assert_eq!(report.symbols.len(), 1);
        assert_eq!(report.valuation.holdings.len(), 2);
        let entry = &report.symbols[0];
        assert_eq!(entry.health.overall, None);
        assert_eq!(entry.recommendation.action, Action::Hold);
        assert_eq!(entry.recommendation.confidence, 0.0);
        assert_eq!(entry.incomplete, vec![Capability::HistoricalSeries]);
        assert_eq!(delivery.0.lock().unwrap().len(), 1);
    }
}
