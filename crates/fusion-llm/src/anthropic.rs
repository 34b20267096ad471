//! Anthropic messages client.

use std::fmt;

use async_trait::async_trait;
use fusion_core::{CompletionProvider, DataError, Result};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::http::{non_empty, send_json};
use crate::settings::GenerationSettings;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const API_VERSION: &str = "2023-06-01";
const NAME: &str = "anthropic";

/// Anthropic messages vendor.
#[derive(Clone)]
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    settings: GenerationSettings,
}

impl fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    /// Creates a client for the default model.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into().trim().to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            settings: GenerationSettings::default(),
        }
    }

    /// Uses `model` instead of the default.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides length and temperature.
    #[must_use]
    pub const fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    fn body<'a>(&'a self, prompt: &'a str) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[instrument(skip_all, fields(vendor = NAME, model = %self.model, prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(DataError::ProviderUnavailable(format!("{NAME}: no API key")));
        }
        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.body(prompt));
        let response: MessagesResponse = send_json(NAME, request).await?;
        non_empty(NAME, response.into_text())
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl MessagesResponse {
    /// Concatenated text blocks.
    fn into_text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n");
        (!text.is_empty()).then_some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let settings = GenerationSettings {
            max_tokens: 512,
            temperature: 0.2,
        };
        let provider = AnthropicProvider::new("key").with_settings(settings);
        let body = serde_json::to_value(provider.body("analyse TCS")).unwrap();

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["content"], "analyse TCS");
    }

    #[test]
    fn test_response_joins_text_blocks() {
        let body = r#"{"id":"msg_1","type":"message","role":"assistant","content":[
            {"type":"text","text":"ACTION: SELL"},
            {"type":"tool_use","id":"t","name":"x","input":{}},
            {"type":"text","text":"CONFIDENCE: 70%"}
        ],"stop_reason":"end_turn"}"#;
        let response: MessagesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.into_text().as_deref(),
            Some("ACTION: SELL\nCONFIDENCE: 70%")
        );
    }

    #[tokio::test]
    async fn test_availability_follows_key() {
        assert!(AnthropicProvider::new("key").is_available().await);
        assert!(!AnthropicProvider::new(" ").is_available().await);
    }
}
