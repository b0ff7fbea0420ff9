//! Terminal stage: project the pipeline state onto the outbound response.
//! Pure assembly, no collaborator calls, never fails.
use async_trait::async_trait;

use triage_core::contract::TriageResponse;
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;

pub struct BuildResponseStage;

#[async_trait]
impl Stage for BuildResponseStage {
    fn name(&self) -> &'static str {
        "build_response"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let ticket_payload = state.ticket_outcome.as_ref().and_then(|o| o.payload());
        let report_payload = state.report_outcome.as_ref().and_then(|o| o.payload());

        state.response = Some(TriageResponse {
            request_id: state.request_id.clone(),
            trace_id: state.trace_id.clone(),
            intent: state.contract.as_ref().map(|c| c.intent),
            answer: state
                .answer_outcome
                .as_ref()
                .and_then(|o| o.payload())
                .map(|p| p.answer.clone()),
            summary_posted: state
                .report_outcome
                .as_ref()
                .is_some_and(|o| o.is_success()),
            tickets_created: ticket_payload.map_or(0, |p| p.created.len() as u32),
            duplicates_skipped: ticket_payload.map_or(0, |p| p.duplicates.len() as u32),
            report_url: report_payload.and_then(|p| p.permalink.clone()),
            ticket_urls: ticket_payload
                .map(|p| p.created.iter().map(|c| c.url.clone()).collect())
                .unwrap_or_default(),
            issues_processed: state.parsed.len() as u32,
            issues_matched: state.working_set.len() as u32,
            early_exit: state.early_exit.clone(),
            errors: state.errors.clone(),
        });
        Ok(())
    }
}
