//! Ticket branch: file one tracker entry per working-set record, skipping
//! records whose near-duplicate is already in the ticket history.
//!
//! Records are processed concurrently under a semaphore so a large upload
//! cannot flood the tracker. Every created entry is embedded back into the
//! history collection, so duplicate detection strengthens with each run.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use triage_core::config::TriageConfig;
use triage_core::contract::IssueRecord;
use triage_core::json_slice;
use triage_core::outcome::{CreatedEntry, DuplicateEntry, Outcome, TicketPayload};
use triage_core::stage::{Stage, StageError};
use triage_core::state::PipelineState;
use triage_core::traits::{TextGenerator, TicketFields, TicketTracker};
use triage_retrieval::RetrievalEngine;

const MAX_SUMMARY_LEN: usize = 100;

const TICKET_PROMPT: &str = r#"You are filing a bug tracker ticket from a QA issue record.

Issue record (JSON):
{record}

Produce the ticket fields as a JSON object with these exact keys:
  summary: one-line title, at most 100 characters
  description: full description of the problem
  repro_steps: reproduction steps, or "" when unknown
  expected: expected behavior
  actual: actual behavior
  priority: "P1", "P2" or "P3"

Return ONLY the JSON object. No explanation. No markdown."#;

/// Per-record result inside the branch.
enum Disposition {
    Created(CreatedEntry),
    Duplicate(DuplicateEntry),
    Failed(String),
}

struct TicketContext {
    retrieval: Arc<RetrievalEngine>,
    generator: Arc<dyn TextGenerator>,
    tracker: Arc<dyn TicketTracker>,
    config: TriageConfig,
}

impl TicketContext {
    async fn generate_fields(&self, record: &IssueRecord) -> Result<TicketFields, String> {
        let prompt = TICKET_PROMPT.replace(
            "{record}",
            &serde_json::to_string(record).unwrap_or_default(),
        );
        let mut last_error = String::new();
        for _ in 0..2 {
            match self.generator.generate(&prompt).await {
                Ok(raw) => {
                    match json_slice::object_slice(&raw)
                        .ok_or("no JSON object in output".to_string())
                        .and_then(|s| {
                            serde_json::from_str::<TicketFields>(s).map_err(|e| e.to_string())
                        }) {
                        Ok(mut fields) => {
                            if fields.summary.len() > MAX_SUMMARY_LEN {
                                let mut cut = MAX_SUMMARY_LEN;
                                while !fields.summary.is_char_boundary(cut) {
                                    cut -= 1;
                                }
                                fields.summary.truncate(cut);
                            }
                            return Ok(fields);
                        }
                        Err(error) => last_error = error,
                    }
                }
                Err(error) => last_error = error.to_string(),
            }
        }
        Err(format!("ticket fields unparseable twice: {last_error}"))
    }

    async fn process(&self, record: IssueRecord) -> Disposition {
        let history_text = format!("{} {}", record.title, record.description);

        // duplicate check against the filed-ticket history
        match self
            .retrieval
            .retrieve(
                &history_text,
                &self.config.ticket_history_collection,
                1,
                self.config.duplicate_threshold,
            )
            .await
        {
            Ok(result) if !result.is_empty() && result.confidence >= self.config.duplicate_threshold => {
                debug!(issue = %record.id, similarity = result.confidence, "duplicate skipped");
                return Disposition::Duplicate(DuplicateEntry {
                    issue_id: record.id,
                    similarity: result.confidence,
                    existing: result.entries[0].payload.clone(),
                });
            }
            Ok(_) => {}
            Err(error) => {
                // history unavailable: file the ticket rather than lose it
                warn!(issue = %record.id, %error, "duplicate check unavailable, filing anyway");
            }
        }

        let fields = match self.generate_fields(&record).await {
            Ok(fields) => fields,
            Err(error) => {
                return Disposition::Failed(format!("issue '{}': {error}", record.id));
            }
        };

        let created = match self.tracker.create(&self.config.project_key, &fields).await {
            Ok(created) => created,
            Err(error) => {
                return Disposition::Failed(format!("issue '{}': {error}", record.id));
            }
        };

        // self-reinforcing history write; the ticket exists even if this fails
        match self.retrieval.embeddings().embed(&history_text).await {
            Ok(vector) => {
                let payload = json!({
                    "key": created.key,
                    "url": created.url,
                    "text": history_text,
                });
                if let Err(error) = self
                    .retrieval
                    .store()
                    .upsert(
                        &self.config.ticket_history_collection,
                        &created.key,
                        vector,
                        payload,
                    )
                    .await
                {
                    warn!(key = %created.key, %error, "history upsert failed");
                }
            }
            Err(error) => warn!(key = %created.key, %error, "history embed failed"),
        }

        Disposition::Created(CreatedEntry {
            issue_id: record.id,
            key: created.key,
            url: created.url,
        })
    }
}

pub struct TicketActionStage {
    ctx: Arc<TicketContext>,
}

impl TicketActionStage {
    pub fn new(
        retrieval: Arc<RetrievalEngine>,
        generator: Arc<dyn TextGenerator>,
        tracker: Arc<dyn TicketTracker>,
        config: TriageConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(TicketContext {
                retrieval,
                generator,
                tracker,
                config,
            }),
        }
    }
}

#[async_trait]
impl Stage for TicketActionStage {
    fn name(&self) -> &'static str {
        "ticket_action"
    }

    async fn run(&self, state: &mut PipelineState) -> Result<(), StageError> {
        if state.queries.ticket.is_none() {
            return Ok(());
        }

        let limiter = Arc::new(Semaphore::new(self.ctx.config.max_ticket_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (index, record) in state.working_set.iter().cloned().enumerate() {
            let ctx = Arc::clone(&self.ctx);
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(closed) => {
                        return (
                            index,
                            Disposition::Failed(format!(
                                "issue '{}': concurrency limiter closed: {closed}",
                                record.id
                            )),
                        );
                    }
                };
                (index, ctx.process(record).await)
            });
        }

        let mut dispositions: Vec<(usize, Disposition)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => dispositions.push(entry),
                Err(error) => dispositions.push((
                    usize::MAX,
                    Disposition::Failed(format!("ticket task panicked: {error}")),
                )),
            }
        }
        dispositions.sort_by_key(|(index, _)| *index);

        let total = dispositions.len();
        let mut payload = TicketPayload {
            created: Vec::new(),
            duplicates: Vec::new(),
            record_failures: Vec::new(),
        };
        for (_, disposition) in dispositions {
            match disposition {
                Disposition::Created(entry) => payload.created.push(entry),
                Disposition::Duplicate(entry) => payload.duplicates.push(entry),
                Disposition::Failed(message) => payload.record_failures.push(message),
            }
        }

        if !payload.record_failures.is_empty() {
            state.push_error(
                self.name(),
                format!(
                    "{} of {} records failed: {}",
                    payload.record_failures.len(),
                    total,
                    payload.record_failures[0]
                ),
            );
        }

        info!(
            created = payload.created.len(),
            duplicates = payload.duplicates.len(),
            failed = payload.record_failures.len(),
            "ticket branch complete"
        );

        state.ticket_outcome = Some(
            if total > 0 && payload.record_failures.len() == total {
                Outcome::failure(format!(
                    "all {} records failed: {}",
                    total, payload.record_failures[0]
                ))
            } else {
                Outcome::success(payload)
            },
        );
        Ok(())
    }
}
