//! Runtime configuration with compiled defaults and environment overrides.
use std::env;

/// Tunables for one pipeline process. Defaults mirror a conservative
/// production profile; every field can be overridden with a `TRIAGE_*`
/// environment variable.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Knowledge collection holding the classification taxonomy
    pub taxonomy_collection: String,
    /// Append-only collection of filed ticket embeddings
    pub ticket_history_collection: String,
    /// General knowledge collection for answer grounding
    pub knowledge_collection: String,

    /// Results fetched per retrieval, before the re-rank spare
    pub retrieval_top_k: usize,
    /// Minimum similarity for general retrieval
    pub score_threshold: f64,
    /// Minimum retrieval confidence to treat a record as already filed
    pub duplicate_threshold: f64,

    /// Records per classification batch
    pub classification_batch_size: usize,
    /// Threshold used when the contract does not set one
    pub default_confidence_threshold: f64,

    /// Hard cap on in-flight ticket operations
    pub max_ticket_concurrency: usize,
    /// Retries after the first chat post attempt
    pub max_chat_retries: u32,

    /// Chat channel for report posts
    pub chat_channel: String,
    /// Tracker project key for created entries
    pub project_key: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            taxonomy_collection: "issue_taxonomy".to_string(),
            ticket_history_collection: "ticket_history".to_string(),
            knowledge_collection: "qa_knowledge".to_string(),
            retrieval_top_k: 4,
            score_threshold: 0.72,
            duplicate_threshold: 0.90,
            classification_batch_size: 5,
            default_confidence_threshold: 0.6,
            max_ticket_concurrency: 5,
            max_chat_retries: 2,
            chat_channel: "qa-triage".to_string(),
            project_key: "QA".to_string(),
        }
    }
}

impl TriageConfig {
    /// Load defaults, then apply any `TRIAGE_*` environment overrides.
    /// Unparseable values fall back to the default silently rather than
    /// failing process start.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = env::var("TRIAGE_TAXONOMY_COLLECTION") {
            cfg.taxonomy_collection = v;
        }
        if let Ok(v) = env::var("TRIAGE_TICKET_HISTORY_COLLECTION") {
            cfg.ticket_history_collection = v;
        }
        if let Ok(v) = env::var("TRIAGE_KNOWLEDGE_COLLECTION") {
            cfg.knowledge_collection = v;
        }
        if let Some(v) = parse_env("TRIAGE_RETRIEVAL_TOP_K") {
            cfg.retrieval_top_k = v;
        }
        if let Some(v) = parse_env("TRIAGE_SCORE_THRESHOLD") {
            cfg.score_threshold = v;
        }
        if let Some(v) = parse_env("TRIAGE_DUPLICATE_THRESHOLD") {
            cfg.duplicate_threshold = v;
        }
        if let Some(v) = parse_env("TRIAGE_CLASSIFICATION_BATCH_SIZE") {
            cfg.classification_batch_size = v;
        }
        if let Some(v) = parse_env("TRIAGE_CONFIDENCE_THRESHOLD") {
            cfg.default_confidence_threshold = v;
        }
        if let Some(v) = parse_env("TRIAGE_MAX_TICKET_CONCURRENCY") {
            cfg.max_ticket_concurrency = v;
        }
        if let Some(v) = parse_env("TRIAGE_MAX_CHAT_RETRIES") {
            cfg.max_chat_retries = v;
        }
        if let Ok(v) = env::var("TRIAGE_CHAT_CHANNEL") {
            cfg.chat_channel = v;
        }
        if let Ok(v) = env::var("TRIAGE_PROJECT_KEY") {
            cfg.project_key = v;
        }
        cfg
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_production_profile() {
        let cfg = TriageConfig::default();
        assert_eq!(cfg.retrieval_top_k, 4);
        assert_eq!(cfg.score_threshold, 0.72);
        assert_eq!(cfg.duplicate_threshold, 0.90);
        assert_eq!(cfg.classification_batch_size, 5);
        assert_eq!(cfg.max_ticket_concurrency, 5);
        assert_eq!(cfg.max_chat_retries, 2);
    }
}
