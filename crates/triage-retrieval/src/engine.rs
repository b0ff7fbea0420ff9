//! Retrieval Engine: expansion → search → re-rank → confidence.
//!
//! Expansion broadens the query for recall; re-ranking scores candidates
//! against the *original* query so the final order reflects true intent.
//! An empty result set is a valid outcome; callers decide whether missing
//! grounding is fatal or merely degrading.
use std::sync::Arc;

use tracing::{debug, warn};

use triage_core::contract::{RankedEntry, RetrievalResult};
use triage_core::traits::{
    CollaboratorError, EmbeddingProvider, SearchHit, TextGenerator, VectorStore,
};

use crate::similarity::cosine;

const EXPAND_PROMPT: &str = "You are a semantic search optimizer.
Rewrite the following query to maximize recall in a vector similarity search.
Expand acronyms, add synonyms, and include related concepts.
Return ONLY the rewritten query as a single sentence. No explanation.

Original query: ";

pub struct RetrievalEngine {
    generator: Arc<dyn TextGenerator>,
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
}

impl RetrievalEngine {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            generator,
            embeddings,
            store,
        }
    }

    pub fn store(&self) -> Arc<dyn VectorStore> {
        Arc::clone(&self.store)
    }

    pub fn embeddings(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embeddings)
    }

    /// Retrieve ranked grounding context for `query` from `collection`.
    pub async fn retrieve(
        &self,
        query: &str,
        collection: &str,
        k: usize,
        score_threshold: f64,
    ) -> Result<RetrievalResult, CollaboratorError> {
        let expanded = self.expand_query(query).await;

        let query_vector = self.embeddings.embed(&expanded).await?;
        // one spare candidate, purely for re-rank headroom
        let hits = self
            .store
            .search(collection, &query_vector, k + 1, score_threshold)
            .await?;
        debug!(collection, candidates = hits.len(), "vector search complete");

        let entries = self.rerank(query, hits, k).await;
        let confidence = entries.first().map(|e| e.score).unwrap_or(0.0);

        Ok(RetrievalResult {
            original_query: query.to_string(),
            expanded_query: expanded,
            entries,
            confidence,
            collection: collection.to_string(),
        })
    }

    /// Broaden the query via the text generator. Expansion is best-effort:
    /// any failure falls back to the original query unchanged.
    async fn expand_query(&self, query: &str) -> String {
        let prompt = format!("{EXPAND_PROMPT}{query}");
        match self.generator.generate(&prompt).await {
            Ok(text) => {
                let line = text.lines().next().unwrap_or_default().trim();
                if line.is_empty() {
                    query.to_string()
                } else {
                    line.to_string()
                }
            }
            Err(error) => {
                warn!(%error, "query expansion failed, using original query");
                query.to_string()
            }
        }
    }

    /// Re-score candidates against the original query's embedding and keep
    /// the top `k`. When re-ranking cannot run, fall back to the original
    /// similarity order.
    async fn rerank(&self, original_query: &str, hits: Vec<SearchHit>, k: usize) -> Vec<RankedEntry> {
        if hits.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<RankedEntry> = match self.embeddings.embed(original_query).await {
            Ok(original_vector) => hits
                .into_iter()
                .map(|h| RankedEntry {
                    score: cosine(&original_vector, &h.vector),
                    payload: h.payload,
                })
                .collect(),
            Err(error) => {
                warn!(%error, "re-rank embed failed, keeping search order");
                hits.into_iter()
                    .map(|h| RankedEntry {
                        score: h.score,
                        payload: h.payload,
                    })
                    .collect()
            }
        };

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}
