//! Record normalization: hand the raw upload to the record source
//! collaborator and validate the result at the boundary. The only stage
//! with zero generator calls.
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;
use triage_core::traits::RecordSource;

pub struct ParseRecordsStage {
    source: Arc<dyn RecordSource>,
}

impl ParseRecordsStage {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Stage for ParseRecordsStage {
    fn name(&self) -> &'static str {
        "parse_records"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        // raw bytes are consumed here; later stages only see records
        let Some(file) = state.file.take() else {
            return Err(StageError::Normalization(
                "file processing requested but no file was uploaded".to_string(),
            ));
        };

        let records = self
            .source
            .normalize(&file.bytes, file.kind)
            .map_err(|e| StageError::Normalization(e.to_string()))?;

        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.id.as_str()) {
                return Err(StageError::Normalization(format!(
                    "duplicate record id '{}' in upload",
                    record.id
                )));
            }
        }

        info!(file = %file.name, records = records.len(), "upload normalized");
        state.set_metric("issues_processed", records.len());
        state.parsed = records;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::contract::{FileKind, IssueRecord};
    use triage_core::state::RawFile;
    use triage_core::traits::NormalizeError;

    struct FixedSource(Vec<IssueRecord>);

    impl RecordSource for FixedSource {
        fn normalize(
            &self,
            _bytes: &[u8],
            _kind: FileKind,
        ) -> Result<Vec<IssueRecord>, NormalizeError> {
            Ok(self.0.clone())
        }
    }

    fn record(id: &str) -> IssueRecord {
        IssueRecord {
            id: id.to_string(),
            title: format!("bug {id}"),
            description: "d".to_string(),
            repro_steps: String::new(),
            severity: String::new(),
        }
    }

    fn state_with_file() -> PipelineState {
        PipelineState::new("r", "i").with_file(RawFile {
            name: "issues.csv".to_string(),
            kind: FileKind::Tabular,
            bytes: b"id,title\n".to_vec(),
        })
    }

    #[tokio::test]
    async fn test_records_land_in_state_and_bytes_are_dropped() {
        let stage = ParseRecordsStage::new(Arc::new(FixedSource(vec![record("1"), record("2")])));
        let mut state = state_with_file();
        stage.run(&mut state).await.unwrap();
        assert_eq!(state.parsed.len(), 2);
        assert!(state.file.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_ids_reject_the_upload() {
        let stage = ParseRecordsStage::new(Arc::new(FixedSource(vec![record("1"), record("1")])));
        let mut state = state_with_file();
        let error = stage.run(&mut state).await.unwrap_err();
        assert!(matches!(error, StageError::Normalization(_)));
        assert!(error.is_request_rejection());
    }

    #[tokio::test]
    async fn test_missing_file_is_a_rejection() {
        let stage = ParseRecordsStage::new(Arc::new(FixedSource(vec![])));
        let mut state = PipelineState::new("r", "i");
        let error = stage.run(&mut state).await.unwrap_err();
        assert!(error.is_request_rejection());
    }
}
