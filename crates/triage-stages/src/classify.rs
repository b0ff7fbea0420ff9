//! Batched record classification against the extracted filter criterion,
//! grounded in the retrieved taxonomy.
//!
//! Records are classified in fixed-size batches to bound the size of any
//! single generation request; each record lands in exactly one batch and
//! must come back with exactly one verdict. A batch that is unparseable,
//! incomplete, or carries duplicate verdicts is retried once with identical
//! inputs; a second failure aborts the stage; an empty classification is
//! worse than none.
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use triage_core::config::TriageConfig;
use triage_core::contract::{ClassificationVerdict, FilterCriterion, IssueRecord};
use triage_core::json_slice;
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;
use triage_core::traits::TextGenerator;

const CLASSIFY_PROMPT: &str = r#"You are a QA issue classifier.

Criterion to classify against:
{criterion}

Reference taxonomy (from internal knowledge):
{context}

Classify each of the following issues. For each issue determine:
- matches: true/false — does it fit the criterion?
- confidence: float between 0.0 and 1.0
- rationale: one sentence explaining the decision

Return a JSON array, one object per issue:
[{"issue_id": "...", "matches": true, "confidence": 0.85, "rationale": "..."}]
Return ONLY the JSON array. No explanation. No markdown.

Issues to classify:
{issues}"#;

pub struct ClassifyStage {
    generator: Arc<dyn TextGenerator>,
    config: TriageConfig,
}

/// Verdicts for one batch, split into those covering the batch's records
/// and the ids the generator invented.
struct BatchVerdicts {
    verdicts: Vec<ClassificationVerdict>,
    unknown: Vec<String>,
}

impl ClassifyStage {
    pub fn new(generator: Arc<dyn TextGenerator>, config: TriageConfig) -> Self {
        Self { generator, config }
    }

    fn batch_prompt(&self, criterion: &FilterCriterion, context: &str, batch: &[IssueRecord]) -> String {
        let issues = serde_json::to_string(
            &batch
                .iter()
                .map(|r| json!({ "id": r.id, "title": r.title, "description": r.description }))
                .collect::<Vec<_>>(),
        )
        .unwrap_or_default();
        CLASSIFY_PROMPT
            .replace("{criterion}", &criterion.description)
            .replace("{context}", context)
            .replace("{issues}", &issues)
    }

    async fn attempt(
        &self,
        prompt: &str,
        batch: &[IssueRecord],
    ) -> Result<BatchVerdicts, String> {
        let raw = self
            .generator
            .generate(prompt)
            .await
            .map_err(|e| e.to_string())?;
        let slice = json_slice::array_slice(&raw).ok_or("no JSON array in output")?;
        let parsed =
            serde_json::from_str::<Vec<ClassificationVerdict>>(slice).map_err(|e| e.to_string())?;

        let batch_ids: HashSet<&str> = batch.iter().map(|r| r.id.as_str()).collect();
        let mut verdicts = Vec::with_capacity(batch.len());
        let mut unknown = Vec::new();
        for verdict in parsed {
            if batch_ids.contains(verdict.issue_id.as_str()) {
                verdicts.push(verdict);
            } else {
                unknown.push(verdict.issue_id);
            }
        }

        // one verdict per record, no more, no less
        let mut covered: HashSet<&str> = HashSet::with_capacity(verdicts.len());
        for verdict in &verdicts {
            if !covered.insert(verdict.issue_id.as_str()) {
                return Err(format!("duplicate verdict for issue '{}'", verdict.issue_id));
            }
        }
        if covered.len() != batch_ids.len() {
            return Err(format!(
                "verdicts cover {} of {} records in the batch",
                covered.len(),
                batch_ids.len()
            ));
        }

        Ok(BatchVerdicts { verdicts, unknown })
    }

    async fn classify_batch(
        &self,
        prompt: &str,
        batch: &[IssueRecord],
    ) -> Result<BatchVerdicts, StageError> {
        match self.attempt(prompt, batch).await {
            Ok(verdicts) => Ok(verdicts),
            Err(first_error) => {
                warn!(%first_error, "classification batch rejected, retrying once");
                self.attempt(prompt, batch).await.map_err(|second_error| {
                    StageError::MalformedGeneration(format!(
                        "classification batch failed twice: {second_error}"
                    ))
                })
            }
        }
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    fn name(&self) -> &'static str {
        "classify_records"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let criterion = state
            .contract
            .as_ref()
            .and_then(|c| c.filter_criterion.clone());

        // no criterion: classification was skipped by design, not by failure
        let Some(criterion) = criterion else {
            return Ok(());
        };

        let context = state
            .taxonomy
            .as_ref()
            .map(|t| t.context_block())
            .unwrap_or_default();
        if context.is_empty() {
            warn!("classifying without taxonomy grounding; reduced-confidence mode");
            state.set_metric("classification_grounded", false);
        } else {
            state.set_metric("classification_grounded", true);
        }

        let mut verdicts = Vec::with_capacity(state.parsed.len());
        let batches: Vec<Vec<IssueRecord>> = state
            .parsed
            .chunks(self.config.classification_batch_size.max(1))
            .map(<[IssueRecord]>::to_vec)
            .collect();

        for batch in &batches {
            let prompt = self.batch_prompt(&criterion, &context, batch);
            let outcome = self.classify_batch(&prompt, batch).await?;
            for id in outcome.unknown {
                state.push_error(
                    self.name(),
                    format!("dropped verdict for unknown issue id '{id}'"),
                );
            }
            for verdict in outcome.verdicts {
                let verdict = verdict.clamped();
                if !verdict.is_valid() {
                    state.push_error(
                        self.name(),
                        format!(
                            "rejected verdict for issue '{}': matches=true with empty rationale",
                            verdict.issue_id
                        ),
                    );
                    continue;
                }
                verdicts.push(verdict);
            }
        }

        debug!(
            records = state.parsed.len(),
            verdicts = verdicts.len(),
            batches = batches.len(),
            "classification complete"
        );
        state.classified = verdicts;
        Ok(())
    }
}
