//! Data Model: ExecutionContract, IssueRecord, ClassificationVerdict,
//! RetrievalResult, and the outbound response contract.
use serde::{Deserialize, Serialize};

/// What the user wants the pipeline to do overall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Pure question, no file processing
    Query,
    /// Filter issues from a file and report the result
    FilterAndReport,
    /// Analyze issues from a file without strict filtering
    Analyze,
    /// Create or update tracker entries from a file
    Update,
}

/// Which class of issues a filter run is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    Accuracy,
    Performance,
    Security,
    Critical,
    Custom,
}

/// Shape of generated text output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    Executive,
    Detailed,
    Bullet,
}

impl OutputShape {
    /// Prompt fragment steering the generator toward this shape
    pub fn instruction(&self) -> &'static str {
        match self {
            OutputShape::Executive => "Keep the output under 200 words, highest-impact points only.",
            OutputShape::Detailed => "Provide a thorough, detailed breakdown with examples.",
            OutputShape::Bullet => "Structure the output as a bullet-point list.",
        }
    }
}

/// The classification target extracted from the instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCriterion {
    /// Criterion family
    pub kind: CriterionKind,
    /// 1-2 sentence description of what to look for
    pub description: String,
    /// Minimum verdict confidence to keep a record, in [0, 1]
    pub confidence_threshold: f64,
}

/// Structured task contract extracted from the raw instruction.
///
/// Immutable once produced; every routing decision reads it, none mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContract {
    pub intent: Intent,
    /// Whether a file must be normalized to fulfill the request
    pub requires_file_processing: bool,
    /// Optional classification target; absent means "pass everything through"
    pub filter_criterion: Option<FilterCriterion>,
    /// Post a chat summary
    pub wants_report: bool,
    /// Create tracker entries
    pub wants_tickets: bool,
    /// Produce an inline answer / analysis
    pub wants_answer: bool,
    pub output_shape: OutputShape,
}

/// Accepted upload kinds. Anything else is rejected before the pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Comma- or tab-separated rows with a header line
    Tabular,
    /// Markdown pipe table
    MarkdownTable,
    /// One issue title per non-empty line
    PlainText,
}

impl FileKind {
    /// Map a file extension to a kind. `None` means the upload is rejected.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" => Some(FileKind::Tabular),
            "md" => Some(FileKind::MarkdownTable),
            "txt" => Some(FileKind::PlainText),
            _ => None,
        }
    }
}

/// One normalized issue from the uploaded file.
///
/// `id` is the identity key and must be unique within a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssueRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Reproduction steps; empty string when absent from the source
    #[serde(default)]
    pub repro_steps: String,
    /// Reported severity; empty string when absent from the source
    #[serde(default)]
    pub severity: String,
}

/// Per-record classifier decision. Produced once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    /// References IssueRecord.id
    pub issue_id: String,
    /// Whether the record matches the criterion
    pub matches: bool,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// One-sentence explanation; required whenever `matches` is true
    pub rationale: String,
}

impl ClassificationVerdict {
    /// Clamp confidence into [0, 1]
    pub fn clamped(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }

    /// A matching verdict must carry a non-empty rationale
    pub fn is_valid(&self) -> bool {
        !self.matches || !self.rationale.trim().is_empty()
    }
}

/// One ranked entry in a retrieval result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Similarity score in [0, 1]
    pub score: f64,
    /// Stored payload for this entry
    pub payload: serde_json::Value,
}

impl RankedEntry {
    /// Best-effort text content of the payload, used for prompt context
    pub fn text(&self) -> &str {
        self.payload
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

/// Ranked, confidence-scored grounding context for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub original_query: String,
    pub expanded_query: String,
    /// Entries ordered best-first
    pub entries: Vec<RankedEntry>,
    /// Top entry's score, or 0.0 when the result set is empty
    pub confidence: f64,
    pub collection: String,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Join entry texts into a single grounding context block
    pub fn context_block(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.text().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Best-effort source labels for the answer action
    pub fn sources(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|e| e.payload.get("source").and_then(|v| v.as_str()))
            .map(String::from)
            .collect()
    }
}

/// The only state exposed past the HTTP boundary.
///
/// Internal record lists and intermediate verdicts are never serialized
/// to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResponse {
    pub request_id: String,
    pub trace_id: String,
    pub intent: Option<Intent>,
    pub answer: Option<String>,
    pub summary_posted: bool,
    pub tickets_created: u32,
    pub duplicates_skipped: u32,
    pub report_url: Option<String>,
    pub ticket_urls: Vec<String>,
    pub issues_processed: u32,
    pub issues_matched: u32,
    /// Reason the run stopped before dispatch, when it did
    pub early_exit: Option<String>,
    pub errors: Vec<crate::error::ErrorEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_clamping() {
        let v = ClassificationVerdict {
            issue_id: "1".to_string(),
            matches: true,
            confidence: 1.7,
            rationale: "wrong calculation".to_string(),
        }
        .clamped();
        assert_eq!(v.confidence, 1.0);

        let v = ClassificationVerdict {
            issue_id: "2".to_string(),
            matches: false,
            confidence: -0.2,
            rationale: String::new(),
        }
        .clamped();
        assert_eq!(v.confidence, 0.0);
    }

    #[test]
    fn test_matching_verdict_requires_rationale() {
        let v = ClassificationVerdict {
            issue_id: "1".to_string(),
            matches: true,
            confidence: 0.9,
            rationale: "  ".to_string(),
        };
        assert!(!v.is_valid());

        let v = ClassificationVerdict {
            issue_id: "1".to_string(),
            matches: false,
            confidence: 0.9,
            rationale: String::new(),
        };
        assert!(v.is_valid());
    }

    #[test]
    fn test_file_kind_allow_list() {
        assert_eq!(FileKind::from_extension("CSV"), Some(FileKind::Tabular));
        assert_eq!(FileKind::from_extension("tsv"), Some(FileKind::Tabular));
        assert_eq!(FileKind::from_extension("md"), Some(FileKind::MarkdownTable));
        assert_eq!(FileKind::from_extension("txt"), Some(FileKind::PlainText));
        assert_eq!(FileKind::from_extension("xlsx"), None);
        assert_eq!(FileKind::from_extension("pdf"), None);
    }

    #[test]
    fn test_retrieval_context_block_skips_non_text_payloads() {
        let result = RetrievalResult {
            original_query: "q".to_string(),
            expanded_query: "q expanded".to_string(),
            entries: vec![
                RankedEntry {
                    score: 0.9,
                    payload: serde_json::json!({"text": "accuracy taxonomy"}),
                },
                RankedEntry {
                    score: 0.8,
                    payload: serde_json::json!({"other": 1}),
                },
            ],
            confidence: 0.9,
            collection: "taxonomy".to_string(),
        };
        assert_eq!(result.context_block(), "accuracy taxonomy");
    }
}
