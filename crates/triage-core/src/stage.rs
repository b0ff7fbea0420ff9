//! Stage Trait: the single contract every pipeline stage implements.
use async_trait::async_trait;

use crate::state::PipelineState;

/// One named unit of pipeline work.
///
/// Stages mutate the shared envelope in place, writing only fields they
/// own. A stage error aborts the run unless the stage ran inside a
/// parallel fan-out, in which case the runner captures it as that
/// branch's failure without touching its siblings.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Unique stage name used for graph wiring and error entries
    fn name(&self) -> &'static str;

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StageError {
    /// Retrieval returned nothing when grounding was mandatory
    #[error("GROUNDING/{0}")]
    GroundingUnavailable(String),

    /// A structured-output call stayed unparseable after one retry
    #[error("GENERATION/{0}")]
    MalformedGeneration(String),

    /// Record normalization rejected the upload
    #[error("NORMALIZE/{0}")]
    Normalization(String),

    /// Any other stage-level failure
    #[error("EXEC/{0}")]
    Execution(String),
}

impl StageError {
    /// Request-rejection errors map to a 4xx at the HTTP boundary
    pub fn is_request_rejection(&self) -> bool {
        matches!(self, StageError::Normalization(_))
    }
}
