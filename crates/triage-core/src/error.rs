//! The append-only error log surfaced in the response contract.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One absorbed or fatal condition, as surfaced in the response `errors` list.
///
/// The log is append-only: stages push entries, nothing removes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEntry {
    /// Stage or branch that produced the error
    pub stage: String,
    /// Human-readable description
    pub message: String,
    /// When the condition was recorded
    pub at: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}
