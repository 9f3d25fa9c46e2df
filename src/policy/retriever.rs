//! Policy retrieval boundary — fragments and the retriever capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// A chunk of unstructured policy-document text.
///
/// `matched_sku` is set by whoever observed literal SKU containment — the
/// retriever leaves it `false`; the resolver marks the fragment it selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFragment {
    pub source_doc_id: String,
    pub text: String,
    #[serde(default)]
    pub matched_sku: bool,
}

impl PolicyFragment {
    pub fn new(source_doc_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source_doc_id: source_doc_id.into(),
            text: text.into(),
            matched_sku: false,
        }
    }
}

/// Capability interface over the policy corpus.
///
/// Backed externally by a text corpus + similarity search; the resolver
/// treats it as a black box returning ordered text blobs.
#[async_trait]
pub trait PolicyRetriever: Send + Sync {
    /// Ranked candidate fragments for `query`, at most `limit` of them.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PolicyFragment>, RetrievalError>;

    /// Every fragment in the corpus, in insertion order.
    ///
    /// Used for the exhaustive second search tier: retrieval ranking can miss
    /// an exact textual match that a full scan contains.
    async fn all_fragments(&self) -> Result<Vec<PolicyFragment>, RetrievalError>;
}
