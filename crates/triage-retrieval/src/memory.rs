//! In-memory vector store backed by a per-collection entry list.
//!
//! Cosine-similarity scan, good enough for tests, local runs, and modest
//! collections. Writes are append-or-replace by id; reads take a snapshot
//! under the lock, so a write racing a search is an acceptable
//! eventually-consistent view.
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use triage_core::traits::{CollaboratorError, SearchHit, VectorStore};

use crate::similarity::cosine;

#[derive(Debug, Clone)]
struct StoredEntry {
    id: String,
    vector: Vec<f32>,
    payload: serde_json::Value,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<StoredEntry>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a collection, mainly for test assertions
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> Result<(), CollaboratorError> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.to_string()).or_default();
        let entry = StoredEntry {
            id: id.to_string(),
            vector,
            payload,
        };
        match entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        score_threshold: f64,
    ) -> Result<Vec<SearchHit>, CollaboratorError> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = entries
            .iter()
            .map(|e| SearchHit {
                id: e.id.clone(),
                score: cosine(vector, &e.vector),
                payload: e.payload.clone(),
                vector: e.vector.clone(),
            })
            .filter(|h| h.score >= score_threshold)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}
