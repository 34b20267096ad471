#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Generative model vendors and model-output parsing.
//!
//! - [`OpenAiProvider`], [`AnthropicProvider`], [`GeminiProvider`] - HTTP clients
//!   implementing [`CompletionProvider`](fusion_core::CompletionProvider)
//! - [`GenerativeProvider`] - exposes a vendor to the fallback resolver
//! - [`parse_response`] - extracts action, confidence and rationale

/// Completion vendors as data providers.
pub mod adapter;
/// Anthropic messages API.
pub mod anthropic;
/// Google Gemini `generateContent` API.
pub mod gemini;
mod http;
/// OpenAI chat completions API.
pub mod openai;
/// Model-output parsing.
pub mod response;
/// Shared generation settings.
pub mod settings;

pub use adapter::GenerativeProvider;
pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use response::{Action, ParsedResponse, parse_response};
pub use settings::GenerationSettings;
