//! Report branch: generate a summary of the working set and post it to the
//! team channel, retrying transient chat failures within a fixed budget.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use triage_core::config::TriageConfig;
use triage_core::outcome::{Outcome, ReportPayload};
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;
use triage_core::traits::{ChatError, ChatPoster, TextGenerator};

const SUMMARY_PROMPT: &str = "You are writing a QA triage summary for a team chat channel.

Task: {query}

Matched issues (JSON):
{issues}

Write the summary. Plain text, no markdown headers.";

pub struct ReportActionStage {
    generator: Arc<dyn TextGenerator>,
    chat: Arc<dyn ChatPoster>,
    config: TriageConfig,
}

impl ReportActionStage {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        chat: Arc<dyn ChatPoster>,
        config: TriageConfig,
    ) -> Self {
        Self {
            generator,
            chat,
            config,
        }
    }

    /// Post with bounded retry. Only transient failures consume retry
    /// budget; a permanent failure stops immediately.
    async fn post_with_retry(&self, text: &str) -> Result<String, String> {
        let attempts = self.config.max_chat_retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.chat.post(&self.config.chat_channel, text).await {
                Ok(permalink) => return Ok(permalink),
                Err(ChatError::Permanent(message)) => {
                    return Err(format!("permanent chat failure: {message}"));
                }
                Err(ChatError::Transient(message)) => {
                    warn!(attempt, %message, "transient chat failure");
                    last_error = message;
                }
            }
        }
        Err(format!(
            "chat post failed after {attempts} attempts: {last_error}"
        ))
    }
}

#[async_trait]
impl Stage for ReportActionStage {
    fn name(&self) -> &'static str {
        "report_action"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        let Some(query) = state.queries.report.clone() else {
            return Ok(());
        };

        let issues = serde_json::to_string(
            &state
                .working_set
                .iter()
                .map(|r| json!({ "id": r.id, "title": r.title, "severity": r.severity }))
                .collect::<Vec<_>>(),
        )
        .unwrap_or_default();
        let prompt = SUMMARY_PROMPT
            .replace("{query}", &query)
            .replace("{issues}", &issues);

        let summary = match self.generator.generate(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(error) => {
                let message = format!("summary generation failed: {error}");
                state.push_error(self.name(), &message);
                state.report_outcome = Some(Outcome::failure(message));
                return Ok(());
            }
        };

        match self.post_with_retry(&summary).await {
            Ok(permalink) => {
                info!(channel = %self.config.chat_channel, "report posted");
                state.report_outcome = Some(Outcome::success(ReportPayload {
                    summary,
                    permalink: Some(permalink),
                }));
            }
            Err(message) => {
                state.push_error(self.name(), &message);
                state.report_outcome = Some(Outcome::failure(message));
            }
        }
        Ok(())
    }
}
