//! In-memory policy corpus — chunking and a naive ranked index.
//!
//! Stands in for an external vector store behind the `PolicyRetriever`
//! trait. Ranking is term overlap, not embeddings.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use crate::error::RetrievalError;
use crate::policy::retriever::{PolicyFragment, PolicyRetriever};

/// Chunk size in characters, matching the corpus splitter the policy
/// documents were originally ingested with.
pub const CHUNK_SIZE: usize = 500;

/// Overlap between consecutive chunks in characters.
pub const CHUNK_OVERLAP: usize = 100;

/// Split text into overlapping character chunks.
///
/// Operates on char boundaries; the final chunk may be shorter than
/// `chunk_size`. `overlap` must be smaller than `chunk_size`.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// In-memory ranked index over policy fragments.
pub struct InMemoryPolicyIndex {
    fragments: Vec<PolicyFragment>,
}

impl InMemoryPolicyIndex {
    /// Build an index from pre-made fragments (tests, fixtures).
    pub fn new(fragments: Vec<PolicyFragment>) -> Self {
        Self { fragments }
    }

    /// Chunk a policy document and index the chunks.
    pub fn from_document(doc_id: &str, text: &str) -> Self {
        let fragments = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP)
            .into_iter()
            .map(|chunk| PolicyFragment::new(doc_id, chunk))
            .collect::<Vec<_>>();
        info!(doc_id, fragments = fragments.len(), "Policy document indexed");
        Self { fragments }
    }

    /// Load a policy document from a text file and index it.
    pub fn from_file(path: &Path) -> Result<Self, RetrievalError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RetrievalError::DocumentLoad(format!("{}: {e}", path.display()))
        })?;
        let doc_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("policy")
            .to_string();
        Ok(Self::from_document(&doc_id, &text))
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Count query terms appearing in the fragment (case-insensitive substring).
fn overlap_score(query: &str, text: &str) -> usize {
    let haystack = text.to_lowercase();
    query
        .split_whitespace()
        .filter(|term| haystack.contains(&term.to_lowercase()))
        .count()
}

#[async_trait]
impl PolicyRetriever for InMemoryPolicyIndex {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<PolicyFragment>, RetrievalError> {
        if self.fragments.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }

        let mut scored: Vec<(usize, &PolicyFragment)> = self
            .fragments
            .iter()
            .map(|f| (overlap_score(query, &f.text), f))
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn all_fragments(&self) -> Result<Vec<PolicyFragment>, RetrievalError> {
        if self.fragments.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }
        Ok(self.fragments.clone())
    }
}
