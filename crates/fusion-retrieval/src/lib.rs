#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fusion/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! TF-IDF retrieval and token-bounded context assembly.

/// Documents built from resolved data.
pub mod builders;
/// Token-budgeted context assembly.
pub mod context;
/// Immutable documents and their types.
pub mod document;
/// TF-IDF index and ranked search.
pub mod index;
/// News tone per symbol.
pub mod sentiment;
/// Tokenizer.
pub mod tokenize;

pub use builders::{
    PORTFOLIO_ID, fundamentals_document, news_document, portfolio_document, quote_document,
    sentiment_document,
};
pub use context::{ContextWindow, estimate_tokens};
pub use document::{Document, DocumentType};
pub use index::{DocumentIndex, RetrievalResult, SearchFilter, TypePriorities};
pub use sentiment::{NewsSentiment, SentimentLabel, polarity};
pub use tokenize::{terms, tokenize};
