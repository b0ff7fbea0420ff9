//! Answer branch: generate an inline answer or analysis, grounded in the
//! knowledge collection. Grounding is best-effort here; a retrieval
//! failure degrades to an ungrounded answer instead of failing the branch.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use triage_core::config::TriageConfig;
use triage_core::contract::RetrievalResult;
use triage_core::outcome::{AnswerPayload, Outcome};
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;
use triage_core::traits::TextGenerator;
use triage_retrieval::RetrievalEngine;

const ANSWER_K: usize = 2;

const QUESTION_PROMPT: &str = "You are a QA knowledge assistant.

Question: {query}

Relevant internal knowledge:
{context}

Answer the question directly. When the knowledge above is relevant, ground
your answer in it. When it is empty or unrelated, say what you can from
general QA practice.";

const ANALYSIS_PROMPT: &str = "You are a QA analyst.

Task: {query}

Issues under analysis (JSON):
{issues}

Relevant internal knowledge:
{context}

Produce the requested analysis of the issues above.";

pub struct AnswerActionStage {
    retrieval: Arc<RetrievalEngine>,
    generator: Arc<dyn TextGenerator>,
    config: TriageConfig,
}

impl AnswerActionStage {
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        generator: Arc<dyn TextGenerator>,
        config: TriageConfig,
    ) -> Self {
        Self {
            retrieval,
            generator,
            config,
        }
    }
}

#[async_trait]
impl Stage for AnswerActionStage {
    fn name(&self) -> &'static str {
        "answer_action"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let Some(query) = state.queries.answer.clone() else {
            return Ok(());
        };

        let grounding: Option<RetrievalResult> = match self
            .retrieval
            .retrieve(
                &query,
                &self.config.knowledge_collection,
                ANSWER_K,
                self.config.score_threshold,
            )
            .await
        {
            Ok(result) => Some(result),
            Err(error) => {
                warn!(%error, "answer grounding unavailable, continuing ungrounded");
                None
            }
        };
        let context = grounding
            .as_ref()
            .map(|g| g.context_block())
            .unwrap_or_default();

        let prompt = if state.working_set.is_empty() {
            QUESTION_PROMPT
                .replace("{query}", &query)
                .replace("{context}", &context)
        } else {
            let issues = serde_json::to_string(
                &state
                    .working_set
                    .iter()
                    .map(|r| json!({ "id": r.id, "title": r.title, "description": r.description }))
                    .collect::<Vec<_>>(),
            )
            .unwrap_or_default();
            ANALYSIS_PROMPT
                .replace("{query}", &query)
                .replace("{issues}", &issues)
                .replace("{context}", &context)
        };

        match self.generator.generate(&prompt).await {
            Ok(answer) => {
                debug!(grounded = !context.is_empty(), "answer generated");
                state.answer_outcome = Some(Outcome::success(AnswerPayload {
                    answer: answer.trim().to_string(),
                    sources: grounding.as_ref().map(|g| g.sources()).unwrap_or_default(),
                    confidence: grounding.as_ref().map(|g| g.confidence).unwrap_or(0.0),
                }));
            }
            Err(error) => {
                let message = format!("answer generation failed: {error}");
                state.push_error(self.name(), &message);
                state.answer_outcome = Some(Outcome::failure(message));
            }
        }
        Ok(())
    }
}
