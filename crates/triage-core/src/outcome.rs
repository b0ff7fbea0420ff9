//! Action outcomes: the tagged success/failure values produced by the
//! parallel dispatch branches. Failures never raise; they are threaded
//! through the pipeline and read only by the aggregator.
use serde::{Deserialize, Serialize};

/// Tagged success/failure record for one downstream action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    Success { payload: T },
    Failure { message: String },
}

impl<T> Outcome<T> {
    pub fn success(payload: T) -> Self {
        Outcome::Success { payload }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn payload(&self) -> Option<&T> {
        match self {
            Outcome::Success { payload } => Some(payload),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Outcome::Failure { message } => Some(message),
            Outcome::Success { .. } => None,
        }
    }
}

/// Report branch payload: the generated summary and where it landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub summary: String,
    /// Permalink returned by the chat service
    pub permalink: Option<String>,
}

/// A tracker entry created for one working-set record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedEntry {
    pub issue_id: String,
    pub key: String,
    pub url: String,
}

/// A record skipped because a near-duplicate was already filed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateEntry {
    pub issue_id: String,
    /// Retrieval confidence against ticket history
    pub similarity: f64,
    /// Payload of the matched existing entry
    pub existing: serde_json::Value,
}

/// Ticket branch payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPayload {
    pub created: Vec<CreatedEntry>,
    pub duplicates: Vec<DuplicateEntry>,
    /// Per-record failures that did not sink the whole branch
    pub record_failures: Vec<String>,
}

/// Answer branch payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub answer: String,
    /// Grounding source labels
    pub sources: Vec<String>,
    /// Grounding confidence carried from retrieval
    pub confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accessors() {
        let ok: Outcome<ReportPayload> = Outcome::success(ReportPayload {
            summary: "s".to_string(),
            permalink: None,
        });
        assert!(ok.is_success());
        assert!(ok.payload().is_some());
        assert!(ok.failure_message().is_none());

        let err: Outcome<ReportPayload> = Outcome::failure("chat unreachable");
        assert!(!err.is_success());
        assert_eq!(err.failure_message(), Some("chat unreachable"));
    }
}
