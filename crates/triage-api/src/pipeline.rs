//! Graph wiring: one place that assembles every stage, routing decision,
//! and fan-out into the validated pipeline graph.
use std::sync::Arc;

use triage_core::config::TriageConfig;
use triage_core::graph::{GraphBuildError, GraphBuilder, PipelineGraph};
use triage_core::traits::{
    ChatPoster, EmbeddingProvider, RecordSource, TextGenerator, TicketTracker, VectorStore,
};
use triage_dispatch::{AnswerActionStage, ReportActionStage, TicketActionStage};
use triage_retrieval::RetrievalEngine;
use triage_stages::{
    route_criterion, route_mode, route_working_set, AggregateStage, BuildQueriesStage,
    BuildResponseStage, ClassifyStage, ExtractContractStage, FilterStage, ParseRecordsStage,
    TaxonomyStage,
};

/// Every external collaborator the pipeline needs, injected once here.
pub struct Collaborators {
    pub generator: Arc<dyn TextGenerator>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub chat: Arc<dyn ChatPoster>,
    pub tracker: Arc<dyn TicketTracker>,
    pub source: Arc<dyn RecordSource>,
}

pub fn build_graph(
    collaborators: Collaborators,
    config: TriageConfig,
) -> Result<PipelineGraph, GraphBuildError> {
    let retrieval = Arc::new(RetrievalEngine::new(
        Arc::clone(&collaborators.generator),
        collaborators.embeddings,
        collaborators.store,
    ));

    GraphBuilder::new()
        .stage(ExtractContractStage::new(Arc::clone(&collaborators.generator)))
        .stage(TaxonomyStage::new(Arc::clone(&retrieval), config.clone()))
        .stage(ParseRecordsStage::new(collaborators.source))
        .stage(ClassifyStage::new(
            Arc::clone(&collaborators.generator),
            config.clone(),
        ))
        .stage(FilterStage)
        .stage(BuildQueriesStage)
        .stage(ReportActionStage::new(
            Arc::clone(&collaborators.generator),
            collaborators.chat,
            config.clone(),
        ))
        .stage(TicketActionStage::new(
            Arc::clone(&retrieval),
            Arc::clone(&collaborators.generator),
            collaborators.tracker,
            config.clone(),
        ))
        .stage(AnswerActionStage::new(
            retrieval,
            collaborators.generator,
            config,
        ))
        .stage(AggregateStage)
        .stage(BuildResponseStage)
        .entry("extract_contract")
        .conditional(
            "extract_contract",
            route_mode,
            &[
                ("query_only", "build_queries"),
                ("process_file", "retrieve_taxonomy"),
            ],
        )
        .edge("retrieve_taxonomy", "parse_records")
        .conditional(
            "parse_records",
            route_criterion,
            &[
                ("classify", "classify_records"),
                ("skip_classification", "filter_working_set"),
            ],
        )
        .edge("classify_records", "filter_working_set")
        .conditional(
            "filter_working_set",
            route_working_set,
            &[
                ("dispatch", "build_queries"),
                ("early_exit", "build_response"),
            ],
        )
        .parallel(
            "build_queries",
            &["report_action", "ticket_action", "answer_action"],
        )
        .join(
            &["report_action", "ticket_action", "answer_action"],
            "aggregate",
        )
        .edge("aggregate", "build_response")
        .terminal("build_response")
        .build()
}
