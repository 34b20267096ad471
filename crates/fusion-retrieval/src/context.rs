//! Token-budgeted context assembly.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::{DocumentIndex, SearchFilter};

/// Approximate token count of `text`: one token per four characters, rounded up.
///
/// This is an estimate, not a tokenizer; it tends to overcount for English
/// prose, which keeps assembled contexts on the safe side of a model limit.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Context handed to a generative model.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Rendered documents joined by newlines.
    pub text: String,
    /// Ids of the included documents, in rank order.
    pub document_ids: Vec<String>,
    /// Token estimate of `text`.
    pub estimated_tokens: usize,
    /// Relevant documents left out because the budget ran out.
    pub omitted: usize,
}

impl ContextWindow {
    /// Returns true if no document fit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.document_ids.is_empty()
    }
}

impl DocumentIndex {
    /// Assembles whole documents relevant to `query` until the next one would
    /// push the estimate past `max_tokens`.
    ///
    /// Documents are never cut; assembly stops at the first document that
    /// does not fit.
    #[must_use]
    pub fn assemble_context(
        &self,
        query: &str,
        max_tokens: usize,
        filter: &SearchFilter,
    ) -> ContextWindow {
        let ranked = self.search_with(query, usize::MAX, filter);
        let mut window = ContextWindow::default();

        for (position, result) in ranked.iter().enumerate() {
            let block = result.document.render();
            let candidate = if window.text.is_empty() {
                block
            } else {
                format!("{}\n{block}", window.text)
            };
            let tokens = estimate_tokens(&candidate);
            if tokens > max_tokens {
                window.omitted = ranked.len() - position;
                break;
            }
            window.text = candidate;
            window.estimated_tokens = tokens;
            window.document_ids.push(result.document.id().to_string());
        }

        debug!(
            included = window.document_ids.len(),
            omitted = window.omitted,
            tokens = window.estimated_tokens,
            max_tokens,
            "Assembled context"
        );
        window
    }
}
