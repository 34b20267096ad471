//! Immutable documents and their types.

use chrono::{DateTime, Utc};
use fusion_core::Symbol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::tokenize::terms;

/// Kind of a document, used for ranking priority and rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Holdings and P&L of the whole portfolio.
    PortfolioSnapshot,
    /// Ratios and health score of a symbol.
    Fundamentals,
    /// Price and technical indicators of a symbol.
    MarketQuote,
    /// A news item.
    News,
    /// News tone of a symbol.
    Sentiment,
    /// Anything else.
    General,
}

impl DocumentType {
    /// Tag used when rendering the document into a context.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::PortfolioSnapshot => "portfolio",
            Self::Fundamentals => "fundamentals",
            Self::MarketQuote => "quote",
            Self::News => "news",
            Self::Sentiment => "sentiment",
            Self::General => "general",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A text document with metadata.
///
/// Term counts are computed once at construction. Documents are never
/// mutated; a newer document with the same id replaces the old one.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: String,
    content: String,
    doc_type: DocumentType,
    symbol: Option<Symbol>,
    created_at: DateTime<Utc>,
    metadata: BTreeMap<String, String>,
    term_counts: BTreeMap<String, u32>,
}

impl Document {
    /// Creates a document and computes its term counts.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        doc_type: DocumentType,
        created_at: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        let mut term_counts = BTreeMap::new();
        for term in terms(&content) {
            *term_counts.entry(term).or_insert(0) += 1;
        }
        Self {
            id: id.into(),
            content,
            doc_type,
            symbol: None,
            created_at,
            metadata: BTreeMap::new(),
            term_counts,
        }
    }

    /// Attaches the symbol the document is about.
    #[must_use]
    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.metadata
            .insert("symbol".to_string(), symbol.to_string());
        self.symbol = Some(symbol);
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Document type.
    #[must_use]
    pub const fn doc_type(&self) -> DocumentType {
        self.doc_type
    }

    /// Symbol, for per-symbol documents.
    #[must_use]
    pub const fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Metadata map.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Term counts (unigrams and bigrams).
    #[must_use]
    pub const fn term_counts(&self) -> &BTreeMap<String, u32> {
        &self.term_counts
    }

    /// Rendered form used in a context window.
    #[must_use]
    pub fn render(&self) -> String {
        format!("[{}] {}", self.doc_type.tag(), self.content)
    }
}
