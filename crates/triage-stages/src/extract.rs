//! Contract extraction: turn the raw instruction into the structured,
//! strongly-typed execution contract that drives every routing decision
//! downstream. Retries once on unparseable output, then fails the run.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use triage_core::contract::{ExecutionContract, Intent};
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;
use triage_core::json_slice;
use triage_core::traits::TextGenerator;

const CONTRACT_PROMPT: &str = r#"You are a task contract extractor for a QA triage system.

Given a user instruction, extract a structured task contract with these exact fields:

intent: one of
  - "query"             - user is asking a question, no file processing needed
  - "filter_and_report" - filter issues from a file and report the result
  - "analyze"           - analyze issues from a file without strict filtering
  - "update"            - create or update tracker entries from a file

requires_file_processing: true when the instruction refers to a file or
uploaded issues, false for pure questions.

filter_criterion: object, or null when no filtering is needed:
  kind: one of "accuracy", "performance", "security", "critical", "custom"
  description: 1-2 sentence description of what to look for
  confidence_threshold: float (default 0.6; 0.8 for "strict/only clear"; 0.4 for "all/any")

wants_report: true when the user wants a chat summary posted
  (keywords: post, send, notify, share)
wants_tickets: true when the user wants tracker entries created
  (keywords: ticket, create, log, file, track)
wants_answer: true when the user wants an inline answer or analysis;
  always true when intent is "query".

output_shape: one of "executive" (short, high-level), "detailed" (full
breakdown), "bullet" (list).

User instruction: "#;

pub struct ExtractContractStage {
    generator: Arc<dyn TextGenerator>,
}

impl ExtractContractStage {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    async fn attempt(&self, prompt: &str) -> Result<ExecutionContract, String> {
        let raw = self
            .generator
            .generate(prompt)
            .await
            .map_err(|e| e.to_string())?;
        let slice = json_slice::object_slice(&raw).ok_or("no JSON object in output")?;
        serde_json::from_str::<ExecutionContract>(slice).map_err(|e| e.to_string())
    }
}

/// Normalize inconsistencies the generator is allowed to produce: a query
/// intent never processes files and always wants an answer, and thresholds
/// live in [0, 1].
fn normalize(mut contract: ExecutionContract) -> ExecutionContract {
    if contract.intent == Intent::Query {
        contract.requires_file_processing = false;
        contract.wants_answer = true;
    }
    if let Some(criterion) = &mut contract.filter_criterion {
        criterion.confidence_threshold = criterion.confidence_threshold.clamp(0.0, 1.0);
    }
    contract
}

#[async_trait]
impl Stage for ExtractContractStage {
    fn name(&self) -> &'static str {
        "extract_contract"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let prompt = format!(
            "{CONTRACT_PROMPT}{}\n\nReturn ONLY valid JSON with these exact keys. No explanation. No markdown.",
            state.instruction
        );

        let contract = match self.attempt(&prompt).await {
            Ok(contract) => contract,
            Err(first_error) => {
                warn!(%first_error, "contract extraction unparseable, retrying once");
                self.attempt(&prompt).await.map_err(|second_error| {
                    StageError::MalformedGeneration(format!(
                        "contract extraction failed twice: {second_error}"
                    ))
                })?
            }
        };

        let contract = normalize(contract);
        debug!(intent = ?contract.intent, "contract extracted");
        state.contract = Some(contract);
        Ok(())
    }
}
