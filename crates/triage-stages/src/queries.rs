//! Action query construction. One deterministic, template-built query per
//! requested action; no generator calls. Keeping this stage pure makes the
//! fan-out reproducible: the same contract and working set always dispatch
//! the same work.
use async_trait::async_trait;
use tracing::debug;

use triage_core::contract::Intent;
use triage_core::stage::{Stage, StageError};
use triage_core::state::{ActionQueries, PipelineState};

const SAMPLE_TITLES: usize = 5;

pub struct BuildQueriesStage;

impl BuildQueriesStage {
    fn describe_working_set(state: &PipelineState) -> String {
        let criterion = state
            .contract
            .as_ref()
            .and_then(|c| c.filter_criterion.as_ref())
            .map(|c| c.description.clone())
            .unwrap_or_else(|| "all QA issues".to_string());

        let titles: Vec<&str> = state
            .working_set
            .iter()
            .take(SAMPLE_TITLES)
            .map(|r| r.title.as_str())
            .collect();

        format!(
            "{} issues matching: {}. Sample titles: {}",
            state.working_set.len(),
            criterion,
            titles.join("; ")
        )
    }
}

#[async_trait]
impl Stage for BuildQueriesStage {
    fn name(&self) -> &'static str {
        "build_queries"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let contract = state
            .contract
            .as_ref()
            .ok_or_else(|| StageError::Execution("no contract before query build".to_string()))?;

        let mut queries = ActionQueries::default();

        if contract.intent == Intent::Query || !contract.requires_file_processing {
            // pure question: the instruction itself is the query
            queries.answer = Some(state.instruction.clone());
            state.queries = queries;
            debug!("query-only dispatch prepared");
            return Ok(());
        }

        let summary = Self::describe_working_set(state);
        let shape = contract.output_shape.instruction();

        if contract.wants_report {
            queries.report = Some(format!("Summarize for a team channel: {summary}. {shape}"));
        }
        if contract.wants_tickets {
            queries.ticket = Some(format!("Create tracker tickets for: {summary}"));
        }
        if contract.wants_answer {
            queries.answer = Some(format!(
                "{} Context: {summary}. {shape}",
                state.instruction
            ));
        }

        debug!(
            report = queries.report.is_some(),
            ticket = queries.ticket.is_some(),
            answer = queries.answer.is_some(),
            "action queries built"
        );
        state.queries = queries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::contract::{
        CriterionKind, ExecutionContract, FilterCriterion, IssueRecord, OutputShape,
    };

    fn record(id: &str) -> IssueRecord {
        IssueRecord {
            id: id.to_string(),
            title: format!("title {id}"),
            description: "d".to_string(),
            repro_steps: String::new(),
            severity: String::new(),
        }
    }

    fn contract(intent: Intent) -> ExecutionContract {
        ExecutionContract {
            intent,
            requires_file_processing: intent != Intent::Query,
            filter_criterion: Some(FilterCriterion {
                kind: CriterionKind::Accuracy,
                description: "wrong outputs".to_string(),
                confidence_threshold: 0.6,
            }),
            wants_report: true,
            wants_tickets: true,
            wants_answer: false,
            output_shape: OutputShape::Executive,
        }
    }

    #[tokio::test]
    async fn test_only_requested_actions_get_queries() {
        let mut state = PipelineState::new("r", "filter and post");
        state.contract = Some(contract(Intent::FilterAndReport));
        state.working_set = vec![record("1"), record("2")];
        BuildQueriesStage.run(&mut state).await.unwrap();

        assert!(state.queries.report.is_some());
        assert!(state.queries.ticket.is_some());
        assert!(state.queries.answer.is_none());
    }

    #[tokio::test]
    async fn test_queries_carry_count_criterion_and_sample_titles() {
        let mut state = PipelineState::new("r", "filter and post");
        state.contract = Some(contract(Intent::FilterAndReport));
        state.working_set = (1..=8).map(|i| record(&i.to_string())).collect();
        BuildQueriesStage.run(&mut state).await.unwrap();

        let report = state.queries.report.unwrap();
        assert!(report.contains("8 issues"));
        assert!(report.contains("wrong outputs"));
        assert!(report.contains("title 5"));
        assert!(!report.contains("title 6"), "samples cap at five titles");
    }

    #[tokio::test]
    async fn test_query_intent_passes_the_instruction_verbatim() {
        let mut state = PipelineState::new("r", "what are common accuracy issues?");
        state.contract = Some(contract(Intent::Query));
        BuildQueriesStage.run(&mut state).await.unwrap();

        assert_eq!(
            state.queries.answer.as_deref(),
            Some("what are common accuracy issues?")
        );
        assert!(state.queries.report.is_none());
        assert!(state.queries.ticket.is_none());
    }
}
