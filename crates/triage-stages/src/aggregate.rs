//! Outcome aggregation after the join barrier.
//!
//! Reads the three branch outcome slots and folds them into run metrics.
//! Always completes, even when every branch failed: partial results reach
//! the caller instead of vanishing into an error.
use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use triage_core::outcome::Outcome;
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;

pub struct AggregateStage;

/// `true`/`false` when the action ran, `null` when it was never requested.
fn success_flag<T>(outcome: &Option<Outcome<T>>) -> Value {
    match outcome {
        Some(outcome) => Value::Bool(outcome.is_success()),
        None => Value::Null,
    }
}

#[async_trait]
impl Stage for AggregateStage {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let (created, duplicates) = state
            .ticket_outcome
            .as_ref()
            .and_then(|o| o.payload())
            .map(|p| (p.created.len(), p.duplicates.len()))
            .unwrap_or((0, 0));

        let attempted = created + duplicates;
        let duplicate_rate = if attempted == 0 {
            0.0
        } else {
            duplicates as f64 / attempted as f64
        };

        state.set_metric("tickets_created", created);
        state.set_metric("duplicates_skipped", duplicates);
        state.set_metric("duplicate_rate", duplicate_rate);
        state.set_metric("report_success", success_flag(&state.report_outcome));
        state.set_metric("ticket_success", success_flag(&state.ticket_outcome));
        state.set_metric("answer_success", success_flag(&state.answer_outcome));

        info!(
            tickets_created = created,
            duplicates_skipped = duplicates,
            errors = state.errors.len(),
            "dispatch outcomes aggregated"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use triage_core::outcome::{CreatedEntry, DuplicateEntry, TicketPayload};

    fn created(id: &str) -> CreatedEntry {
        CreatedEntry {
            issue_id: id.to_string(),
            key: format!("QA-{id}"),
            url: format!("https://tracker.example/QA-{id}"),
        }
    }

    fn duplicate(id: &str) -> DuplicateEntry {
        DuplicateEntry {
            issue_id: id.to_string(),
            similarity: 0.95,
            existing: json!({"key": "QA-old"}),
        }
    }

    #[tokio::test]
    async fn test_counts_and_duplicate_rate() {
        let mut state = PipelineState::new("r", "i");
        state.ticket_outcome = Some(Outcome::success(TicketPayload {
            created: vec![created("1"), created("2"), created("3")],
            duplicates: vec![duplicate("4")],
            record_failures: vec![],
        }));
        AggregateStage.run(&mut state).await.unwrap();

        assert_eq!(state.metrics["tickets_created"], json!(3));
        assert_eq!(state.metrics["duplicates_skipped"], json!(1));
        assert_eq!(state.metrics["duplicate_rate"], json!(0.25));
    }

    #[tokio::test]
    async fn test_no_tickets_attempted_has_zero_rate() {
        let mut state = PipelineState::new("r", "i");
        AggregateStage.run(&mut state).await.unwrap();
        assert_eq!(state.metrics["duplicate_rate"], json!(0.0));
    }

    #[tokio::test]
    async fn test_success_flags_distinguish_failed_from_not_requested() {
        let mut state = PipelineState::new("r", "i");
        state.report_outcome = Some(Outcome::failure("chat unreachable"));
        state.ticket_outcome = Some(Outcome::success(TicketPayload {
            created: vec![created("1")],
            duplicates: vec![],
            record_failures: vec![],
        }));
        AggregateStage.run(&mut state).await.unwrap();

        assert_eq!(state.metrics["report_success"], json!(false));
        assert_eq!(state.metrics["ticket_success"], json!(true));
        assert_eq!(state.metrics["answer_success"], Value::Null);
    }

    #[tokio::test]
    async fn test_completes_when_every_branch_failed() {
        let mut state = PipelineState::new("r", "i");
        state.report_outcome = Some(Outcome::failure("down"));
        state.ticket_outcome = Some(Outcome::failure("down"));
        state.answer_outcome = Some(Outcome::failure("down"));
        AggregateStage.run(&mut state).await.unwrap();
        assert_eq!(state.metrics["tickets_created"], json!(0));
    }
}
