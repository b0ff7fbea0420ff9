//! Triage Core: pipeline state, execution contract, stage trait, and the
//! directed-graph runner that drives a triage request end to end.

pub mod config;
pub mod contract;
pub mod error;
pub mod graph;
pub mod json_slice;
pub mod outcome;
pub mod stage;
pub mod state;
pub mod traits;

pub use config::TriageConfig;
pub use contract::{
    ClassificationVerdict, CriterionKind, ExecutionContract, FileKind, FilterCriterion, Intent,
    IssueRecord, OutputShape, RankedEntry, RetrievalResult, TriageResponse,
};
pub use error::ErrorEntry;
pub use graph::{GraphBuildError, GraphBuilder, PipelineGraph, RunFailure};
pub use outcome::{
    AnswerPayload, CreatedEntry, DuplicateEntry, Outcome, ReportPayload, TicketPayload,
};
pub use stage::{Stage, StageError};
pub use state::{ActionQueries, PipelineState, RawFile};
pub use traits::{
    ChatError, ChatPoster, CollaboratorError, CreatedTicket, EmbeddingProvider, NormalizeError,
    Priority, RecordSource, SearchHit, TextGenerator, TicketFields, TicketTracker, VectorStore,
};

/// Engine version reported by the health endpoint
pub const TRIAGE_VERSION: &str = env!("CARGO_PKG_VERSION");
