//! Completion vendors as data providers.

use std::sync::Arc;

use async_trait::async_trait;
use fusion_core::{
    Capability, CompletionProvider, DataError, DataProvider, Payload, RateLimit, Request, Result,
};

const CAPABILITIES: &[Capability] = &[Capability::GenerateAnalysis];

/// Exposes a [`CompletionProvider`] as a `GenerateAnalysis` [`DataProvider`].
#[derive(Debug, Clone)]
pub struct GenerativeProvider {
    vendor: Arc<dyn CompletionProvider>,
    description: String,
    priority: u8,
    rate_limit: Option<RateLimit>,
}

impl GenerativeProvider {
    /// Wraps `vendor` with the default priority and no call budget.
    #[must_use]
    pub fn new(vendor: Arc<dyn CompletionProvider>) -> Self {
        let description = format!("{} completions ({})", vendor.name(), vendor.model());
        Self {
            vendor,
            description,
            priority: 10,
            rate_limit: None,
        }
    }

    /// Overrides the priority rank.
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Declares a call budget.
    #[must_use]
    pub const fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// The wrapped vendor.
    #[must_use]
    pub fn vendor(&self) -> &Arc<dyn CompletionProvider> {
        &self.vendor
    }
}

#[async_trait]
impl DataProvider for GenerativeProvider {
    fn name(&self) -> &str {
        self.vendor.name()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn capabilities(&self) -> &[Capability] {
        CAPABILITIES
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        self.rate_limit
    }

    async fn is_available(&self) -> bool {
        self.vendor.is_available().await
    }

    async fn fetch(&self, request: &Request) -> Result<Payload> {
        match request {
            Request::GenerateAnalysis { prompt } => {
                self.vendor.complete(prompt).await.map(Payload::Completion)
            }
            other => Err(DataError::NotSupported(format!(
                "{} only generates analysis, not {}",
                self.vendor.name(),
                other.capability()
            ))),
        }
    }
}
