//! Collaborator traits: every external system the pipeline talks to sits
//! behind one of these seams and is injected at construction time.
//!
//! Implementations live outside the pipeline crates (real LLM, chat, and
//! tracker backends) or in `triage-retrieval` (in-memory store, stub
//! embedder) for tests and local runs.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contract::{FileKind, IssueRecord};

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("GENERATE/{0}")]
    Generation(String),

    #[error("EMBED/{0}")]
    Embedding(String),

    #[error("STORE/{0}")]
    Store(String),

    #[error("TRACKER/{0}")]
    Tracker(String),
}

/// Chat-posting failures are classified so the report branch knows
/// whether a retry can help.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("transient chat error: {0}")]
    Transient(String),

    #[error("permanent chat error: {0}")]
    Permanent(String),
}

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("missing required field '{field}' in row {row}")]
    MissingField { field: String, row: usize },

    #[error("malformed input: {0}")]
    Malformed(String),
}

/// Text-generation collaborator. Accepts a fully-formed prompt, returns
/// generated text. Guarantees nothing about output shape; callers own
/// parse-and-retry-once semantics for structured outputs.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Text to fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CollaboratorError>;

    /// Vector dimension produced by this provider
    fn dimension(&self) -> usize;
}

/// One search candidate returned by the vector store.
///
/// The stored vector is returned alongside the payload so the re-ranker
/// can re-score candidates without a second embed call each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    /// Similarity score in [0, 1]
    pub score: f64,
    pub payload: serde_json::Value,
    pub vector: Vec<f32>,
}

/// Vector store collaborator. Writes are append-only from the pipeline's
/// point of view; a write racing a concurrent read is acceptable.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(
        &self,
        collection: &str,
        id: &str,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) -> Result<(), CollaboratorError>;

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        score_threshold: f64,
    ) -> Result<Vec<SearchHit>, CollaboratorError>;
}

/// Chat-posting collaborator. Returns a permalink on success.
#[async_trait]
pub trait ChatPoster: Send + Sync {
    async fn post(&self, channel: &str, text: &str) -> Result<String, ChatError>;
}

/// Structured fields for one tracker entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketFields {
    /// One-line title, max 100 chars
    pub summary: String,
    pub description: String,
    pub repro_steps: String,
    pub expected: String,
    pub actual: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    P1,
    P2,
    P3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedTicket {
    pub key: String,
    pub url: String,
}

/// Ticket-tracker collaborator.
#[async_trait]
pub trait TicketTracker: Send + Sync {
    async fn create(
        &self,
        project_key: &str,
        fields: &TicketFields,
    ) -> Result<CreatedTicket, CollaboratorError>;
}

/// Normalized record source: raw bytes + format hint to issue records.
///
/// Must fail loudly when required fields (`id`, `title`, `description`) are
/// absent after normalization; absent optional fields default to "".
pub trait RecordSource: Send + Sync {
    fn normalize(&self, bytes: &[u8], kind: FileKind) -> Result<Vec<IssueRecord>, NormalizeError>;
}
