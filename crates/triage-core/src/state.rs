//! Pipeline State: the single mutable envelope threaded through every stage.
//!
//! Every stage reads some subset of fields and writes a disjoint subset; no
//! stage re-derives another stage's output. Record lists are superseded by
//! the next stage, never mutated in place.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::contract::{
    ClassificationVerdict, ExecutionContract, FileKind, IssueRecord, RetrievalResult,
    TriageResponse,
};
use crate::error::ErrorEntry;
use crate::outcome::{AnswerPayload, Outcome, ReportPayload, TicketPayload};

/// Raw uploaded file, kept only until the normalization stage consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFile {
    pub name: String,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

/// Per-action instructions synthesized by the query builder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionQueries {
    pub report: Option<String>,
    pub ticket: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    // Request
    pub request_id: String,
    pub trace_id: String,
    pub instruction: String,
    pub file: Option<RawFile>,

    // Processing
    pub contract: Option<ExecutionContract>,
    pub taxonomy: Option<RetrievalResult>,
    pub parsed: Vec<IssueRecord>,
    pub classified: Vec<ClassificationVerdict>,
    /// Records that survived the filter stage
    pub working_set: Vec<IssueRecord>,

    // Orchestration
    pub queries: ActionQueries,
    /// Early-exit reason set by the filter stage when the working set is empty
    pub early_exit: Option<String>,

    // Branch outcomes
    pub report_outcome: Option<Outcome<ReportPayload>>,
    pub ticket_outcome: Option<Outcome<TicketPayload>>,
    pub answer_outcome: Option<Outcome<AnswerPayload>>,

    // Output
    pub errors: Vec<ErrorEntry>,
    pub metrics: HashMap<String, serde_json::Value>,
    pub response: Option<TriageResponse>,
}

impl PipelineState {
    pub fn new(request_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            instruction: instruction.into(),
            file: None,
            contract: None,
            taxonomy: None,
            parsed: Vec::new(),
            classified: Vec::new(),
            working_set: Vec::new(),
            queries: ActionQueries::default(),
            early_exit: None,
            report_outcome: None,
            ticket_outcome: None,
            answer_outcome: None,
            errors: Vec::new(),
            metrics: HashMap::new(),
            response: None,
        }
    }

    pub fn with_file(mut self, file: RawFile) -> Self {
        self.file = Some(file);
        self
    }

    pub fn push_error(&mut self, stage: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ErrorEntry::new(stage, message));
    }

    pub fn set_metric(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metrics.insert(key.to_string(), value.into());
    }

    /// Merge a completed parallel branch back into the trunk state.
    ///
    /// Branches run on clones and write disjoint fields: their own outcome
    /// slot, appended error entries, and new metric keys. `base_error_count`
    /// is the trunk's error count at fan-out time, so shared prefix entries
    /// are not duplicated.
    pub fn absorb_branch(&mut self, branch: PipelineState, base_error_count: usize) {
        if self.report_outcome.is_none() {
            self.report_outcome = branch.report_outcome;
        }
        if self.ticket_outcome.is_none() {
            self.ticket_outcome = branch.ticket_outcome;
        }
        if self.answer_outcome.is_none() {
            self.answer_outcome = branch.answer_outcome;
        }
        self.errors
            .extend(branch.errors.into_iter().skip(base_error_count));
        for (key, value) in branch.metrics {
            self.metrics.entry(key).or_insert(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_branch_merges_disjoint_outcomes() {
        let mut trunk = PipelineState::new("r1", "do things");
        trunk.push_error("extract", "pre-existing");

        let base = trunk.errors.len();
        let mut report_branch = trunk.clone();
        report_branch.report_outcome = Some(Outcome::failure("chat down"));
        report_branch.push_error("report", "chat down");

        let mut ticket_branch = trunk.clone();
        ticket_branch.ticket_outcome = Some(Outcome::success(TicketPayload {
            created: vec![],
            duplicates: vec![],
            record_failures: vec![],
        }));

        trunk.absorb_branch(report_branch, base);
        trunk.absorb_branch(ticket_branch, base);

        assert!(trunk.report_outcome.is_some());
        assert!(trunk.ticket_outcome.is_some());
        assert!(trunk.answer_outcome.is_none());
        // shared prefix not duplicated, branch entry kept
        assert_eq!(trunk.errors.len(), 2);
        assert_eq!(trunk.errors[1].stage, "report");
    }

    #[test]
    fn test_absorb_branch_keeps_existing_metric_keys() {
        let mut trunk = PipelineState::new("r1", "i");
        trunk.set_metric("issues_processed", 5);

        let mut branch = trunk.clone();
        branch.set_metric("tickets_created", 2);
        branch.set_metric("issues_processed", 99);

        trunk.absorb_branch(branch, 0);
        assert_eq!(trunk.metrics["issues_processed"], serde_json::json!(5));
        assert_eq!(trunk.metrics["tickets_created"], serde_json::json!(2));
    }
}
