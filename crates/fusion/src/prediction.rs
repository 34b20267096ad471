//! Recommendations from generative models with a rule-based floor.
//!
//! The orchestrator asks whichever generative vendor the resolver reaches
//! first. When none answers it falls back to [`RuleBasedRecommender`], which
//! works from the health score alone and therefore always produces a result.

use std::fmt::Write as _;
use std::sync::Arc;

use fusion_core::{
    Capability, DataError, HoldingValuation, Quote, Request, Result, Symbol, TechnicalSnapshot,
    Trend,
};
use fusion_health::HealthScore;
use fusion_llm::{Action, parse_response};
use fusion_retrieval::{ContextWindow, NewsSentiment, SentimentLabel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::resolver::FallbackResolver;

/// Confidence of a rule-based call before trend and coverage adjustments.
const RULE_BASE_CONFIDENCE: f64 = 0.3;
/// Added when the price trend points the same way as the call.
const RULE_TREND_BONUS: f64 = 0.1;
/// Added when news sentiment points the same way as the call.
const RULE_SENTIMENT_BONUS: f64 = 0.1;
/// Rule-based calls never claim more than this.
const RULE_MAX_CONFIDENCE: f64 = 0.5;

/// How a recommendation was produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tier {
    /// A generative model answered with a recognizable action.
    Model {
        /// Vendor that answered.
        provider: String,
    },
    /// No model answered; thresholds on the health score decided.
    RuleBased,
    /// A model answered but no action could be read from it.
    Unparsed {
        /// Vendor that answered.
        provider: String,
    },
}

/// Action, confidence and reasoning for one symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Recommended action.
    pub action: Action,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Why.
    pub rationale: String,
    /// How the recommendation was produced.
    pub tier: Tier,
}

/// Buy and sell thresholds on the overall health score.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleThresholds {
    /// Scores at or above this are a buy.
    pub buy: f64,
    /// Scores at or below this are a sell.
    pub sell: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            buy: 7.0,
            sell: 3.0,
        }
    }
}

impl RuleThresholds {
    /// Rejects thresholds outside `[0, 10]` or a sell threshold not below the buy one.
    pub fn validate(&self) -> Result<()> {
        let in_range = |t: f64| t.is_finite() && (0.0..=10.0).contains(&t);
        if !in_range(self.buy) || !in_range(self.sell) {
            return Err(DataError::Configuration(
                "rule thresholds must lie within 0 and 10".to_string(),
            ));
        }
        if self.sell >= self.buy {
            return Err(DataError::Configuration(format!(
                "sell threshold {} must be below buy threshold {}",
                self.sell, self.buy
            )));
        }
        Ok(())
    }
}

/// Structured facts about one symbol, alongside the retrieved context.
#[derive(Clone, Copy, Debug)]
pub struct PredictionInputs<'a> {
    /// Symbol analysed.
    pub symbol: &'a Symbol,
    /// Position held, if any.
    pub holding: Option<&'a HoldingValuation>,
    /// Latest quote.
    pub quote: Option<&'a Quote>,
    /// Indicators over the recent history.
    pub technical: Option<&'a TechnicalSnapshot>,
    /// Financial health score.
    pub health: Option<&'a HealthScore>,
    /// Tone of recent news.
    pub sentiment: Option<&'a NewsSentiment>,
}

impl<'a> PredictionInputs<'a> {
    /// Inputs with nothing but the symbol.
    #[must_use]
    pub const fn new(symbol: &'a Symbol) -> Self {
        Self {
            symbol,
            holding: None,
            quote: None,
            technical: None,
            health: None,
            sentiment: None,
        }
    }

    /// Adds the position.
    #[must_use]
    pub const fn with_holding(mut self, holding: Option<&'a HoldingValuation>) -> Self {
        self.holding = holding;
        self
    }

    /// Adds the quote.
    #[must_use]
    pub const fn with_quote(mut self, quote: Option<&'a Quote>) -> Self {
        self.quote = quote;
        self
    }

    /// Adds the technical snapshot.
    #[must_use]
    pub const fn with_technical(mut self, technical: Option<&'a TechnicalSnapshot>) -> Self {
        self.technical = technical;
        self
    }

    /// Adds the health score.
    #[must_use]
    pub const fn with_health(mut self, health: Option<&'a HealthScore>) -> Self {
        self.health = health;
        self
    }

    /// Adds the news sentiment.
    #[must_use]
    pub const fn with_sentiment(mut self, sentiment: Option<&'a NewsSentiment>) -> Self {
        self.sentiment = sentiment;
        self
    }
}

/// Threshold rules on the overall health score.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RuleBasedRecommender {
    thresholds: RuleThresholds,
}

impl RuleBasedRecommender {
    /// Creates a recommender with `thresholds`.
    #[must_use]
    pub const fn new(thresholds: RuleThresholds) -> Self {
        Self { thresholds }
    }

    /// The thresholds in use.
    #[must_use]
    pub const fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    /// Recommends from the health score. Price trend and news sentiment only
    /// move the confidence. Never fails.
    #[must_use]
    pub fn recommend(&self, inputs: &PredictionInputs<'_>) -> Recommendation {
        let Some((overall, coverage)) = inputs
            .health
            .and_then(|h| h.overall.map(|overall| (overall, h.coverage)))
        else {
            return Recommendation {
                action: Action::Hold,
                confidence: 0.0,
                rationale: format!("No fundamentals available for {}, holding.", inputs.symbol),
                tier: Tier::RuleBased,
            };
        };

        let RuleThresholds { buy, sell } = self.thresholds;
        let action = if overall >= buy {
            Action::Buy
        } else if overall <= sell {
            Action::Sell
        } else {
            Action::Hold
        };

        let technical = inputs.technical;
        let agrees = matches!(
            (action, technical.map(TechnicalSnapshot::trend)),
            (Action::Buy, Some(Trend::Up))
                | (Action::Sell, Some(Trend::Down))
                | (Action::Hold, Some(Trend::Flat))
        );
        let sentiment = inputs.sentiment.filter(|s| !s.is_empty());
        let tone_agrees = matches!(
            (action, sentiment.map(|s| s.label)),
            (Action::Buy, Some(SentimentLabel::Positive))
                | (Action::Sell, Some(SentimentLabel::Negative))
        );
        let mut base = RULE_BASE_CONFIDENCE;
        if agrees {
            base += RULE_TREND_BONUS;
        }
        if tone_agrees {
            base += RULE_SENTIMENT_BONUS;
        }
        let confidence = (base * coverage.clamp(0.0, 1.0)).min(RULE_MAX_CONFIDENCE);

        let mut rationale = format!(
            "Health score {overall:.1}/10 against buy threshold {buy:.1} and sell threshold {sell:.1}"
        );
        if let Some(t) = technical {
            let _ = write!(rationale, "; price trend {:+.1}% over the period", t.trend_percent);
        }
        if let Some(s) = sentiment {
            let _ = write!(
                rationale,
                "; news sentiment {} ({:+.3}) over {} articles",
                s.label, s.score, s.article_count
            );
        }
        let _ = write!(rationale, "; {:.0}% of ratios available.", coverage * 100.0);

        Recommendation {
            action,
            confidence,
            rationale,
            tier: Tier::RuleBased,
        }
    }
}

/// Turns context and inputs into a recommendation.
#[derive(Debug, Clone)]
pub struct PredictionOrchestrator {
    resolver: Arc<FallbackResolver>,
    rules: RuleBasedRecommender,
}

impl PredictionOrchestrator {
    /// Generates through `resolver`, falling back to `rules`.
    #[must_use]
    pub const fn new(resolver: Arc<FallbackResolver>, rules: RuleBasedRecommender) -> Self {
        Self { resolver, rules }
    }

    /// The rule-based fallback.
    #[must_use]
    pub const fn rules(&self) -> &RuleBasedRecommender {
        &self.rules
    }

    /// Prompt sent to the model.
    #[must_use]
    pub fn build_prompt(&self, context: &ContextWindow, inputs: &PredictionInputs<'_>) -> String {
        let mut prompt = String::from(
            "You are an equity analyst reviewing one position of an investor's portfolio.\n\n",
        );
        let _ = writeln!(prompt, "Stock: {}", inputs.symbol);

        if let Some(h) = inputs.holding {
            let _ = write!(
                prompt,
                "Holding: {} shares bought at {:.2}, invested {:.2}",
                h.quantity, h.buy_price, h.investment
            );
            if let (Some(value), Some(pnl), Some(pct)) = (h.current_value, h.pnl, h.pnl_percent) {
                let _ = write!(prompt, ", now worth {value:.2} (P&L {pnl:+.2}, {pct:+.2}%)");
            }
            prompt.push('\n');
        }
        if let Some(q) = inputs.quote {
            let _ = write!(prompt, "Current price: {:.2}", q.price);
            if let Some(currency) = &q.currency {
                let _ = write!(prompt, " {currency}");
            }
            if let Some(change) = q.change_percent() {
                let _ = write!(prompt, " ({change:+.2}% on the day)");
            }
            prompt.push('\n');
        }
        if let Some(t) = inputs.technical {
            let _ = write!(
                prompt,
                "Technicals: trend {:+.2}% over the period, high {:.2}, low {:.2}",
                t.trend_percent, t.period_high, t.period_low
            );
            if let Some(sma) = t.sma_20 {
                let _ = write!(prompt, ", SMA 20 {sma:.2}");
            }
            if let Some(rsi) = t.rsi_14 {
                let _ = write!(prompt, ", RSI 14 {rsi:.1}");
            }
            prompt.push('\n');
        }
        if let Some(score) = inputs.health {
            let _ = writeln!(prompt, "Financial health: {score}");
        }
        match inputs.sentiment {
            Some(s) if !s.is_empty() => {
                let _ = writeln!(prompt, "News sentiment: {s}");
            }
            Some(_) => prompt.push_str("News sentiment: no recent articles\n"),
            None => {}
        }

        prompt.push_str("\nContext:\n");
        if context.is_empty() {
            prompt.push_str("(no additional context available)\n");
        } else {
            prompt.push_str(&context.text);
            prompt.push('\n');
        }

        prompt.push_str(
            "\nAnswer in exactly this format:\n\
             ACTION: BUY, SELL or HOLD\n\
             CONFIDENCE: a number from 1 to 10\n\
             RATIONALE: two or three sentences\n",
        );
        prompt
    }

    /// Recommends an action for `inputs.symbol`. Never fails.
    pub async fn generate(
        &self,
        context: &ContextWindow,
        inputs: &PredictionInputs<'_>,
    ) -> Recommendation {
        let symbol = inputs.symbol;
        if !self.resolver.supports(Capability::GenerateAnalysis) {
            debug!(symbol = %symbol, "No generative vendor configured, using rules");
            return self.rules.recommend(inputs);
        }

        let request = Request::generate(self.build_prompt(context, inputs));
        let resolved = match self.resolver.resolve(&request).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "No model answered, using rules");
                return self.rules.recommend(inputs);
            }
        };

        let provider = resolved.source.to_string();
        let text = match resolved.payload.into_completion() {
            Ok(text) => text,
            Err(e) => {
                warn!(symbol = %symbol, provider = %provider, error = %e, "Model returned no text, using rules");
                return self.rules.recommend(inputs);
            }
        };

        match parse_response(&text) {
            Ok(parsed) => {
                debug!(
                    symbol = %symbol,
                    provider = %provider,
                    action = %parsed.action,
                    confidence = parsed.confidence,
                    "Model recommendation"
                );
                Recommendation {
                    action: parsed.action,
                    confidence: parsed.confidence,
                    rationale: parsed.rationale,
                    tier: Tier::Model { provider },
                }
            }
            Err(e) => {
                warn!(symbol = %symbol, provider = %provider, error = %e, "Model answer has no action");
                Recommendation {
                    action: Action::NoAction,
                    confidence: 0.0,
                    rationale: format!("{provider} answered without a recognizable action."),
                    tier: Tier::Unparsed { provider },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::ResolverBuilder;
    use crate::testing::{Behavior, ScriptedProvider};
    use fusion_health::Rating;
    use std::collections::BTreeMap;

    fn health(overall: Option<f64>, coverage: f64) -> HealthScore {
        HealthScore {
            symbol: Symbol::new("TCS.NS"),
            benchmark: None,
            ratio_scores: BTreeMap::new(),
            components: BTreeMap::new(),
            overall,
            rating: overall.map(Rating::from_score),
            coverage,
        }
    }

    fn technical(trend_percent: f64) -> TechnicalSnapshot {
        TechnicalSnapshot {
            last_close: 100.0,
            sma_5: None,
            sma_20: None,
            rsi_14: None,
            period_high: 110.0,
            period_low: 90.0,
            trend_percent,
        }
    }

    fn sentiment(score: f64, articles: usize) -> NewsSentiment {
        NewsSentiment {
            score,
            label: SentimentLabel::from_score(score),
            article_count: articles,
            positive: articles,
            ..NewsSentiment::empty(Symbol::new("TCS.NS"))
        }
    }

    fn orchestrator(vendors: Vec<Arc<ScriptedProvider>>) -> PredictionOrchestrator {
        let resolver = vendors
            .into_iter()
            .fold(ResolverBuilder::new(), |b, p| b.with_shared_provider(p))
            .build();
        PredictionOrchestrator::new(Arc::new(resolver), RuleBasedRecommender::default())
    }

    #[test]
    fn test_rule_thresholds() {
        let rules = RuleBasedRecommender::default();
        let symbol = Symbol::new("TCS.NS");
        let action = |overall: f64| {
            let score = health(Some(overall), 1.0);
            rules
                .recommend(&PredictionInputs::new(&symbol).with_health(Some(&score)))
                .action
        };

        assert_eq!(action(8.2), Action::Buy);
        assert_eq!(action(7.0), Action::Buy);
        assert_eq!(action(6.9), Action::Hold);
        assert_eq!(action(3.1), Action::Hold);
        assert_eq!(action(3.0), Action::Sell);
        assert_eq!(action(1.0), Action::Sell);
    }

    #[test]
    fn test_rule_confidence_is_capped() {
        let rules = RuleBasedRecommender::default();
        let symbol = Symbol::new("TCS.NS");
        let full = health(Some(8.0), 1.0);
        let partial = health(Some(8.0), 0.5);
        let up = technical(4.0);
        let down = technical(-4.0);

        let with = |score: &HealthScore, t: &TechnicalSnapshot| {
            rules
                .recommend(
                    &PredictionInputs::new(&symbol)
                        .with_health(Some(score))
                        .with_technical(Some(t)),
                )
                .confidence
        };

        assert!((with(&full, &up) - 0.4).abs() < 1e-9);
        assert!((with(&full, &down) - 0.3).abs() < 1e-9);
        assert!((with(&partial, &up) - 0.2).abs() < 1e-9);

        let recommendation = rules.recommend(&PredictionInputs::new(&symbol).with_health(Some(&full)));
        assert!(recommendation.confidence <= RULE_MAX_CONFIDENCE);
        assert_eq!(recommendation.tier, Tier::RuleBased);
    }

    #[test]
    fn test_agreeing_sentiment_raises_rule_confidence() {
        let rules = RuleBasedRecommender::default();
        let symbol = Symbol::new("TCS.NS");
        let strong = health(Some(8.0), 1.0);
        let weak = health(Some(2.0), 1.0);
        let up = technical(4.0);
        let positive = sentiment(0.4, 3);
        let quiet = NewsSentiment::empty(symbol.clone());

        let recommend = |score: &HealthScore, tone: &NewsSentiment| {
            rules.recommend(
                &PredictionInputs::new(&symbol)
                    .with_health(Some(score))
                    .with_sentiment(Some(tone)),
            )
        };

        let buy = recommend(&strong, &positive);
        assert_eq!(buy.action, Action::Buy);
        assert!((buy.confidence - 0.4).abs() < 1e-9);
        assert!(buy.rationale.contains("news sentiment positive (+0.400) over 3 articles"));

        let sell = recommend(&weak, &positive);
        assert_eq!(sell.action, Action::Sell);
        assert!((sell.confidence - 0.3).abs() < 1e-9);

        assert!((recommend(&strong, &quiet).confidence - 0.3).abs() < 1e-9);
        assert!(!recommend(&strong, &quiet).rationale.contains("sentiment"));

        let both = rules.recommend(
            &PredictionInputs::new(&symbol)
                .with_health(Some(&strong))
                .with_technical(Some(&up))
                .with_sentiment(Some(&positive)),
        );
        assert!((both.confidence - RULE_MAX_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn test_rules_without_fundamentals_hold() {
        let rules = RuleBasedRecommender::default();
        let symbol = Symbol::new("XYZ");
        let empty = health(None, 0.0);

        for inputs in [
            PredictionInputs::new(&symbol),
            PredictionInputs::new(&symbol).with_health(Some(&empty)),
        ] {
            let recommendation = rules.recommend(&inputs);
            assert_eq!(recommendation.action, Action::Hold);
            assert_eq!(recommendation.confidence, 0.0);
        }
    }

    #[test]
    fn test_threshold_validation() {
        assert!(RuleThresholds::default().validate().is_ok());
        assert!(RuleThresholds { buy: 3.0, sell: 7.0 }.validate().is_err());
        assert!(RuleThresholds { buy: 11.0, sell: 3.0 }.validate().is_err());
    }

    #[test]
    fn test_prompt_carries_inputs_and_context() {
        let orchestrator = orchestrator(Vec::new());
        let symbol = Symbol::new("INFY.NS");
        let quote = Quote::new(symbol.clone(), 1500.0, crate::testing::start())
            .with_currency("INR");
        let score = health(Some(6.8), 0.8);
        let tone = sentiment(-0.25, 2);
        let context = ContextWindow {
            text: "[fundamentals] Stock symbol: INFY.NS ROE: 31.2".to_string(),
            document_ids: vec!["fundamentals:INFY.NS".to_string()],
            estimated_tokens: 12,
            omitted: 0,
        };

        let prompt = orchestrator.build_prompt(
            &context,
            &PredictionInputs::new(&symbol)
                .with_quote(Some(&quote))
                .with_health(Some(&score))
                .with_sentiment(Some(&tone)),
        );
        assert!(prompt.contains("Stock: INFY.NS"));
        assert!(prompt.contains("Current price: 1500.00 INR"));
        assert!(prompt.contains("Financial health: 6.8/10"));
        assert!(prompt.contains("ROE: 31.2"));
        assert!(prompt.contains("News sentiment: negative (-0.250) over 2 articles"));
        assert!(prompt.contains("ACTION: BUY, SELL or HOLD"));
    }

    #[tokio::test]
    async fn test_model_answer() {
        let model = ScriptedProvider::new(
            "model",
            1,
            Behavior::Completion("ACTION: SELL\nCONFIDENCE: 8/10\nRATIONALE: Debt is rising.".into()),
        );
        let orchestrator = orchestrator(vec![model]);
        let symbol = Symbol::new("ABC");

        let recommendation = orchestrator
            .generate(&ContextWindow::default(), &PredictionInputs::new(&symbol))
            .await;
        assert_eq!(recommendation.action, Action::Sell);
        assert!((recommendation.confidence - 0.8).abs() < 1e-9);
        assert_eq!(recommendation.rationale, "Debt is rising.");
        assert_eq!(
            recommendation.tier,
            Tier::Model {
                provider: "model".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unrecognized_answer_is_no_action() {
        let model = ScriptedProvider::new("model", 1, Behavior::Completion("I cannot say.".into()));
        let orchestrator = orchestrator(vec![model]);
        let symbol = Symbol::new("ABC");
        let score = health(Some(9.0), 1.0);

        let recommendation = orchestrator
            .generate(
                &ContextWindow::default(),
                &PredictionInputs::new(&symbol).with_health(Some(&score)),
            )
            .await;
        assert_eq!(recommendation.action, Action::NoAction);
        assert_eq!(recommendation.confidence, 0.0);
        assert_eq!(
            recommendation.tier,
            Tier::Unparsed {
                provider: "model".into()
            }
        );
    }

    #[tokio::test]
    async fn test_every_vendor_failing_falls_back_to_rules() {
        let first = ScriptedProvider::new("first", 1, Behavior::Completion(String::new()));
        first.set_behavior(Behavior::Fail(DataError::AuthenticationFailed("first".into())));
        let second = ScriptedProvider::new("second", 2, Behavior::Completion(String::new()));
        second.set_behavior(Behavior::Fail(DataError::Network("down".into())));
        let orchestrator = orchestrator(vec![first.clone(), second.clone()]);
        let symbol = Symbol::new("ABC");
        let score = health(Some(7.5), 1.0);

        let recommendation = orchestrator
            .generate(
                &ContextWindow::default(),
                &PredictionInputs::new(&symbol).with_health(Some(&score)),
            )
            .await;
        assert_eq!(recommendation.action, Action::Buy);
        assert_eq!(recommendation.tier, Tier::RuleBased);
        assert_eq!((first.calls(), second.calls()), (1, 1));
    }

    #[tokio::test]
    async fn test_no_vendor_uses_rules() {
        let orchestrator = orchestrator(Vec::new());
        let symbol = Symbol::new("ABC");
        let score = health(Some(2.0), 1.0);

        let recommendation = orchestrator
            .generate(
                &ContextWindow::default(),
                &PredictionInputs::new(&symbol).with_health(Some(&score)),
            )
            .await;
        assert_eq!(recommendation.action, Action::Sell);
        assert_eq!(recommendation.tier, Tier::RuleBased);
    }
}
