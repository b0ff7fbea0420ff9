//! Taxonomy retrieval: ground the upcoming classification in stored
//! knowledge instead of generator assumptions.
//!
//! Grounding is mandatory whenever a filter criterion exists: an empty
//! retrieval there aborts the run, since classifying without a taxonomy is
//! worse than not classifying. Without a criterion the classifier is
//! skipped anyway, so the stage records a note and passes through.
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use triage_core::config::TriageConfig;
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;
use triage_retrieval::RetrievalEngine;

pub struct TaxonomyStage {
    retrieval: Arc<RetrievalEngine>,
    config: TriageConfig,
}

impl TaxonomyStage {
    pub fn new(retrieval: Arc<RetrievalEngine>, config: TriageConfig) -> Self {
        Self { retrieval, config }
    }
}

#[async_trait]
impl Stage for TaxonomyStage {
    fn name(&self) -> &'static str {
        "retrieve_taxonomy"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let criterion = state
            .contract
            .as_ref()
            .and_then(|c| c.filter_criterion.clone());

        let Some(criterion) = criterion else {
            info!("no filter criterion; taxonomy lookup skipped");
            state.set_metric("taxonomy_skipped", true);
            return Ok(());
        };

        let query = format!(
            "Definition and classification rules for {} issues: {}. \
             Include examples of matching and non-matching bugs.",
            serde_json::to_string(&criterion.kind)
                .unwrap_or_default()
                .trim_matches('"'),
            criterion.description
        );

        let result = self
            .retrieval
            .retrieve(
                &query,
                &self.config.taxonomy_collection,
                self.config.retrieval_top_k,
                self.config.score_threshold,
            )
            .await
            .map_err(|e| StageError::Execution(e.to_string()))?;

        if result.is_empty() {
            return Err(StageError::GroundingUnavailable(format!(
                "no taxonomy entries in '{}' above threshold {:.2}; cannot classify",
                self.config.taxonomy_collection, self.config.score_threshold
            )));
        }

        debug!(
            entries = result.entries.len(),
            confidence = result.confidence,
            "taxonomy grounding retrieved"
        );
        state.taxonomy = Some(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use triage_core::contract::{
        CriterionKind, ExecutionContract, FilterCriterion, Intent, OutputShape,
    };
    use triage_core::traits::{CollaboratorError, EmbeddingProvider, TextGenerator, VectorStore};
    use triage_retrieval::{InMemoryVectorStore, StubEmbedding};

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            Err(CollaboratorError::Generation("offline".to_string()))
        }
    }

    fn contract_with_criterion(criterion: Option<FilterCriterion>) -> ExecutionContract {
        ExecutionContract {
            intent: Intent::FilterAndReport,
            requires_file_processing: true,
            filter_criterion: criterion,
            wants_report: true,
            wants_tickets: false,
            wants_answer: false,
            output_shape: OutputShape::Executive,
        }
    }

    fn accuracy_criterion() -> FilterCriterion {
        FilterCriterion {
            kind: CriterionKind::Accuracy,
            description: "wrong outputs and calculations".to_string(),
            confidence_threshold: 0.6,
        }
    }

    async fn engine_with_taxonomy(seeded: bool) -> Arc<RetrievalEngine> {
        let stub = Arc::new(StubEmbedding::default());
        let store = Arc::new(InMemoryVectorStore::new());
        if seeded {
            let text = "accuracy issues: wrong outputs calculations predictions data";
            let v = stub.embed(text).await.unwrap();
            store
                .upsert("issue_taxonomy", "tax1", v, json!({ "text": text }))
                .await
                .unwrap();
        }
        Arc::new(RetrievalEngine::new(Arc::new(EchoGenerator), stub, store))
    }

    #[tokio::test]
    async fn test_empty_taxonomy_with_criterion_is_fatal() {
        let stage = TaxonomyStage::new(engine_with_taxonomy(false).await, TriageConfig::default());
        let mut state = PipelineState::new("r", "i");
        state.contract = Some(contract_with_criterion(Some(accuracy_criterion())));

        let error = stage.run(&mut state).await.unwrap_err();
        assert!(matches!(error, StageError::GroundingUnavailable(_)));
    }

    #[tokio::test]
    async fn test_without_criterion_stage_is_a_pass_through() {
        let stage = TaxonomyStage::new(engine_with_taxonomy(false).await, TriageConfig::default());
        let mut state = PipelineState::new("r", "i");
        state.contract = Some(contract_with_criterion(None));

        stage.run(&mut state).await.unwrap();
        assert!(state.taxonomy.is_none());
        assert_eq!(state.metrics["taxonomy_skipped"], json!(true));
    }

    #[tokio::test]
    async fn test_seeded_taxonomy_lands_in_state() {
        let mut config = TriageConfig::default();
        config.score_threshold = 0.0;
        let stage = TaxonomyStage::new(engine_with_taxonomy(true).await, config);
        let mut state = PipelineState::new("r", "i");
        state.contract = Some(contract_with_criterion(Some(accuracy_criterion())));

        stage.run(&mut state).await.unwrap();
        let taxonomy = state.taxonomy.unwrap();
        assert!(!taxonomy.is_empty());
        assert_eq!(taxonomy.confidence, taxonomy.entries[0].score);
    }
}
