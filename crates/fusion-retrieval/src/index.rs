//! TF-IDF index and ranked search.
//!
//! Every insertion rebuilds the vocabulary, IDF weights and document vectors
//! into a new [`Snapshot`] and swaps it in under a write lock. Searches clone
//! the current `Arc<Snapshot>` and never observe a partial rebuild.

use fusion_core::Symbol;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace};

use crate::document::{Document, DocumentType};
use crate::tokenize::terms;

/// Ranking multiplier per document type.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypePriorities {
    /// Portfolio snapshot multiplier.
    pub portfolio_snapshot: f64,
    /// Fundamentals multiplier.
    pub fundamentals: f64,
    /// Market quote multiplier.
    pub market_quote: f64,
    /// News multiplier.
    pub news: f64,
    /// News sentiment multiplier.
    pub sentiment: f64,
    /// General document multiplier.
    pub general: f64,
}

impl Default for TypePriorities {
    fn default() -> Self {
        Self {
            portfolio_snapshot: 1.5,
            fundamentals: 1.3,
            market_quote: 1.2,
            news: 1.0,
            sentiment: 1.1,
            general: 0.8,
        }
    }
}

impl TypePriorities {
    /// Multiplier for `doc_type`.
    #[must_use]
    pub const fn multiplier(&self, doc_type: DocumentType) -> f64 {
        match doc_type {
            DocumentType::PortfolioSnapshot => self.portfolio_snapshot,
            DocumentType::Fundamentals => self.fundamentals,
            DocumentType::MarketQuote => self.market_quote,
            DocumentType::News => self.news,
            DocumentType::Sentiment => self.sentiment,
            DocumentType::General => self.general,
        }
    }
}

/// Restricts which documents a search may return.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchFilter {
    /// Every document.
    #[default]
    All,
    /// Documents about one symbol plus documents about no symbol.
    Symbol(Symbol),
}

impl SearchFilter {
    /// Filter for `symbol`.
    #[must_use]
    pub fn symbol(symbol: impl Into<Symbol>) -> Self {
        Self::Symbol(symbol.into())
    }

    fn admits(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Symbol(symbol) => document.symbol().is_none_or(|s| s == symbol),
        }
    }
}

/// One ranked search hit.
#[derive(Clone, Debug)]
pub struct RetrievalResult {
    /// The matching document.
    pub document: Arc<Document>,
    /// Cosine similarity with the query.
    pub similarity: f64,
    /// Similarity times the type multiplier.
    pub score: f64,
}

type SparseVector = HashMap<String, f64>;

#[derive(Debug, Default)]
struct Snapshot {
    documents: Vec<Arc<Document>>,
    vectors: Vec<SparseVector>,
    idf: HashMap<String, f64>,
}

impl Snapshot {
    fn build(documents: Vec<Arc<Document>>) -> Self {
        let n = documents.len() as f64;
        let mut df: HashMap<&str, usize> = HashMap::new();
        for doc in &documents {
            for term in doc.term_counts().keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        // Smoothed IDF, as in the usual TF-IDF formulation.
        let idf: HashMap<String, f64> = df
            .into_iter()
            .map(|(term, count)| {
                let weight = ((1.0 + n) / (1.0 + count as f64)).ln() + 1.0;
                (term.to_string(), weight)
            })
            .collect();

        let vectors = documents
            .iter()
            .map(|doc| {
                normalize(
                    doc.term_counts()
                        .iter()
                        .map(|(term, count)| {
                            let weight = idf.get(term).copied().unwrap_or(0.0);
                            (term.clone(), f64::from(*count) * weight)
                        })
                        .collect(),
                )
            })
            .collect();

        Self {
            documents,
            vectors,
            idf,
        }
    }

    fn query_vector(&self, query: &str) -> SparseVector {
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for term in terms(query) {
            *counts.entry(term).or_insert(0) += 1;
        }
        normalize(
            counts
                .into_iter()
                .filter_map(|(term, count)| {
                    self.idf
                        .get(&term)
                        .map(|weight| (term, f64::from(count) * weight))
                })
                .collect(),
        )
    }
}

fn normalize(mut vector: SparseVector) -> SparseVector {
    let norm = vector.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for value in vector.values_mut() {
            *value /= norm;
        }
    }
    vector
}

fn dot(query: &SparseVector, document: &SparseVector) -> f64 {
    query
        .iter()
        .filter_map(|(term, q)| document.get(term).map(|d| q * d))
        .sum()
}

/// Ordering of ranked results: score, then recency, then identity.
fn rank(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.document.created_at().cmp(&a.document.created_at()))
        .then_with(|| a.document.id().cmp(b.document.id()))
}

/// In-memory TF-IDF document index.
#[derive(Debug, Default)]
pub struct DocumentIndex {
    snapshot: RwLock<Arc<Snapshot>>,
    // Serializes rebuilds so concurrent insertions are not lost.
    writer: Mutex<()>,
    priorities: TypePriorities,
}

impl DocumentIndex {
    /// Creates an empty index with the given type priorities.
    #[must_use]
    pub fn new(priorities: TypePriorities) -> Self {
        Self {
            priorities,
            ..Self::default()
        }
    }

    /// Type priorities in use.
    #[must_use]
    pub const fn priorities(&self) -> &TypePriorities {
        &self.priorities
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|p| p.into_inner()))
    }

    /// Adds a document, replacing any document with the same id.
    pub fn index(&self, document: Document) {
        self.index_all(std::iter::once(document));
    }

    /// Adds several documents with a single rebuild.
    pub fn index_all(&self, documents: impl IntoIterator<Item = Document>) {
        let _writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());

        let mut merged: Vec<Arc<Document>> = self.current().documents.clone();
        let mut added = 0usize;
        for document in documents {
            match merged.iter_mut().find(|d| d.id() == document.id()) {
                Some(slot) => {
                    trace!(id = document.id(), "Replacing document");
                    *slot = Arc::new(document);
                }
                None => merged.push(Arc::new(document)),
            }
            added += 1;
        }
        if added == 0 {
            return;
        }

        let snapshot = Arc::new(Snapshot::build(merged));
        debug!(
            documents = snapshot.documents.len(),
            vocabulary = snapshot.idf.len(),
            "Rebuilt retrieval index"
        );
        *self.snapshot.write().unwrap_or_else(|p| p.into_inner()) = snapshot;
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current().documents.len()
    }

    /// Returns true if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Document with `id`, if indexed.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<Document>> {
        self.current()
            .documents
            .iter()
            .find(|d| d.id() == id)
            .cloned()
    }

    /// Top `top_k` documents for `query` over the whole index.
    #[must_use]
    pub fn search(&self, query: &str, top_k: usize) -> Vec<RetrievalResult> {
        self.search_with(query, top_k, &SearchFilter::All)
    }

    /// Top `top_k` documents for `query` admitted by `filter`.
    ///
    /// Documents with zero similarity are never returned.
    #[must_use]
    pub fn search_with(
        &self,
        query: &str,
        top_k: usize,
        filter: &SearchFilter,
    ) -> Vec<RetrievalResult> {
        let snapshot = self.current();
        let query_vector = snapshot.query_vector(query);
        if query_vector.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<RetrievalResult> = snapshot
            .documents
            .iter()
            .zip(&snapshot.vectors)
            .filter(|(doc, _)| filter.admits(doc))
            .filter_map(|(doc, vector)| {
                let similarity = dot(&query_vector, vector);
                (similarity > 0.0).then(|| RetrievalResult {
                    document: Arc::clone(doc),
                    similarity,
                    score: similarity * self.priorities.multiplier(doc.doc_type()),
                })
            })
            .collect();

        results.sort_by(rank);
        results.truncate(top_k);
        results
    }
}
