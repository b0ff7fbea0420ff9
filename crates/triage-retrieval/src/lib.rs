//! Triage Retrieval: query expansion, vector search, and re-ranking over a
//! named knowledge collection.
//!
//! The engine is the single retrieval primitive of the system: the taxonomy
//! lookup, duplicate detection, and answer grounding all go through
//! [`RetrievalEngine::retrieve`] with different collections and thresholds.

pub mod engine;
pub mod memory;
pub mod similarity;
pub mod stub;

pub use engine::RetrievalEngine;
pub use memory::InMemoryVectorStore;
pub use stub::StubEmbedding;
