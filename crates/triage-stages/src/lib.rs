//! Triage Stages: the pipeline stage implementations wired into the graph.
//!
//! # Pipeline Flow
//!
//! ```text
//! instruction → extract_contract → [query-only?] → retrieve_taxonomy
//!             → parse_records → [criterion?] → classify_records
//!             → filter_working_set → [empty? early exit] → build_queries
//!             → (report | ticket | answer in parallel) → aggregate
//!             → build_response
//! ```
//!
//! Stages only read and write their declared slice of [`PipelineState`];
//! the routing decisions below are pure functions over the same state.

mod aggregate;
mod classify;
mod extract;
mod filter;
mod parse;
mod queries;
mod respond;
mod taxonomy;

pub use aggregate::AggregateStage;
pub use classify::ClassifyStage;
pub use extract::ExtractContractStage;
pub use filter::FilterStage;
pub use parse::ParseRecordsStage;
pub use queries::BuildQueriesStage;
pub use respond::BuildResponseStage;
pub use taxonomy::TaxonomyStage;

use triage_core::contract::Intent;
use triage_core::state::PipelineState;

/// After contract extraction: does this request touch a file at all?
pub fn route_mode(state: &PipelineState) -> &'static str {
    match &state.contract {
        Some(c) if c.intent == Intent::Query || !c.requires_file_processing => "query_only",
        _ => "process_file",
    }
}

/// After normalization: is there a criterion to classify against?
pub fn route_criterion(state: &PipelineState) -> &'static str {
    match &state.contract {
        Some(c) if c.filter_criterion.is_some() => "classify",
        _ => "skip_classification",
    }
}

/// After filtering: anything left to dispatch on?
pub fn route_working_set(state: &PipelineState) -> &'static str {
    if state.early_exit.is_some() {
        "early_exit"
    } else {
        "dispatch"
    }
}
