//! Scripted providers shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fusion_core::{
    Capability, DataError, DataProvider, FinancialMetrics, Payload, Quote, RateLimit, Ratio,
    Request, Result,
};

pub(crate) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

#[derive(Clone, Debug)]
pub(crate) enum Behavior {
    /// Quotes every symbol at this price.
    Price(f64),
    /// Answers after a delay.
    Slow(Duration, f64),
    /// Answers every request with this completion text.
    Completion(String),
    /// Answers fundamentals with these ratios.
    Fundamentals(Vec<(Ratio, f64)>),
    /// Answers news requests with an empty list.
    NoNews,
    /// Fails every call.
    Fail(DataError),
}

#[derive(Debug)]
pub(crate) struct ScriptedProvider {
    name: &'static str,
    priority: u8,
    capabilities: Vec<Capability>,
    behavior: Mutex<Behavior>,
    available: bool,
    rate_limit: Option<RateLimit>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(name: &'static str, priority: u8, behavior: Behavior) -> Arc<Self> {
        let capabilities = match &behavior {
            Behavior::Completion(_) => vec![Capability::GenerateAnalysis],
            Behavior::Fundamentals(_) => vec![Capability::Fundamentals],
            Behavior::NoNews => vec![Capability::NewsItems],
            _ => vec![Capability::CurrentPrice],
        };
        Arc::new(Self {
            name,
            priority,
            capabilities,
            behavior: Mutex::new(behavior),
            available: true,
            rate_limit: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn rebuild(self: Arc<Self>, edit: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).expect("provider not yet shared");
        edit(&mut inner);
        Arc::new(inner)
    }

    pub(crate) fn unavailable(self: Arc<Self>) -> Arc<Self> {
        self.rebuild(|p| p.available = false)
    }

    pub(crate) fn with_rate_limit(self: Arc<Self>, limit: RateLimit) -> Arc<Self> {
        self.rebuild(|p| p.rate_limit = Some(limit))
    }

    pub(crate) fn with_capabilities(self: Arc<Self>, capabilities: &[Capability]) -> Arc<Self> {
        self.rebuild(|p| p.capabilities = capabilities.to_vec())
    }

    pub(crate) fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "scripted test provider"
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn fetch(&self, request: &Request) -> Result<Payload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().unwrap().clone();
        let symbol = request.symbol().cloned().unwrap_or_default();
        match behavior {
            Behavior::Price(price) => Ok(Payload::Price(Quote::new(symbol, price, start()))),
            Behavior::Slow(delay, price) => {
                tokio::time::sleep(delay).await;
                Ok(Payload::Price(Quote::new(symbol, price, start())))
            }
            Behavior::Completion(text) => Ok(Payload::Completion(text)),
            Behavior::Fundamentals(ratios) => Ok(Payload::Fundamentals(
                ratios
                    .into_iter()
                    .fold(FinancialMetrics::new(symbol), |m, (ratio, value)| {
                        m.with_ratio(ratio, Some(value))
                    }),
            )),
            Behavior::NoNews => Ok(Payload::News(Vec::new())),
            Behavior::Fail(err) => Err(err),
        }
    }
}
