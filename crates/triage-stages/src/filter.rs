//! Working-set selection from classification verdicts.
//!
//! A record survives the filter only when its verdict says it matches AND
//! the verdict confidence clears the criterion threshold. Order follows the
//! upload, not verdict arrival. An empty working set short-circuits the
//! run: dispatching actions over nothing wastes collaborator calls and
//! produces misleading reports.
use std::collections::HashMap;

use async_trait::async_trait;
use tracing::info;

use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;

pub struct FilterStage;

#[async_trait]
impl Stage for FilterStage {
    fn name(&self) -> &'static str {
        "filter_working_set"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let criterion = state
            .contract
            .as_ref()
            .and_then(|c| c.filter_criterion.clone());

        match criterion {
            Some(criterion) => {
                let verdicts: HashMap<&str, (bool, f64)> = state
                    .classified
                    .iter()
                    .map(|v| (v.issue_id.as_str(), (v.matches, v.confidence)))
                    .collect();
                state.working_set = state
                    .parsed
                    .iter()
                    .filter(|record| {
                        verdicts
                            .get(record.id.as_str())
                            .is_some_and(|(matches, confidence)| {
                                *matches && *confidence >= criterion.confidence_threshold
                            })
                    })
                    .cloned()
                    .collect();

                if state.working_set.is_empty() {
                    state.early_exit = Some(format!(
                        "no issues matched '{}' at confidence >= {:.2}",
                        criterion.description, criterion.confidence_threshold
                    ));
                }
            }
            // no criterion: every parsed record is in scope
            None => state.working_set = state.parsed.clone(),
        }

        info!(
            parsed = state.parsed.len(),
            matched = state.working_set.len(),
            "working set selected"
        );
        state.set_metric("issues_matched", state.working_set.len());
        Ok(())
    }
}
