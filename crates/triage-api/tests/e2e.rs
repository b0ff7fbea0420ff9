//! End-to-end runs through the HTTP surface: router, validation, pipeline,
//! and response contract, with scripted collaborators standing in for the
//! generator, chat, and tracker backends.
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use triage_api::decode::FileDecoder;
use triage_api::metrics::ApiMetrics;
use triage_api::pipeline::{build_graph, Collaborators};
use triage_api::{create_app, AppState};
use triage_core::config::TriageConfig;
use triage_core::traits::{
    ChatError, ChatPoster, CollaboratorError, CreatedTicket, EmbeddingProvider, TextGenerator,
    TicketFields, TicketTracker, VectorStore,
};
use triage_retrieval::{InMemoryVectorStore, StubEmbedding};

/// Routes prompts by their role markers; expansion always fails so
/// retrieval falls back to the raw query and stays deterministic.
struct ScenarioGenerator {
    contract: String,
    verdicts: String,
}

#[async_trait]
impl TextGenerator for ScenarioGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError> {
        if prompt.contains("task contract extractor") {
            return Ok(self.contract.clone());
        }
        if prompt.contains("QA issue classifier") {
            return Ok(self.verdicts.clone());
        }
        if prompt.contains("semantic search optimizer") {
            return Err(CollaboratorError::Generation("no expansion".to_string()));
        }
        if prompt.contains("filing a bug tracker ticket") {
            return Ok(json!({
                "summary": "Filed from triage",
                "description": "see source record",
                "repro_steps": "",
                "expected": "correct behavior",
                "actual": "incorrect behavior",
                "priority": "P2",
            })
            .to_string());
        }
        // summary and answer prompts
        Ok("Two accuracy issues matched this week.".to_string())
    }
}

struct CountingChat {
    calls: AtomicU32,
    transient: bool,
}

impl CountingChat {
    fn ok() -> Self {
        Self {
            calls: AtomicU32::new(0),
            transient: false,
        }
    }

    fn flaky() -> Self {
        Self {
            calls: AtomicU32::new(0),
            transient: true,
        }
    }
}

#[async_trait]
impl ChatPoster for CountingChat {
    async fn post(&self, _channel: &str, _text: &str) -> Result<String, ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.transient {
            Err(ChatError::Transient("rate limited".to_string()))
        } else {
            Ok("https://chat.example/p/1".to_string())
        }
    }
}

struct SeqTracker {
    created: AtomicUsize,
}

impl SeqTracker {
    fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TicketTracker for SeqTracker {
    async fn create(
        &self,
        project_key: &str,
        _fields: &TicketFields,
    ) -> Result<CreatedTicket, CollaboratorError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreatedTicket {
            key: format!("{project_key}-{n}"),
            url: format!("https://tracker.example/{project_key}-{n}"),
        })
    }
}

fn contract(threshold: f64, wants_report: bool, wants_tickets: bool) -> String {
    json!({
        "intent": "filter_and_report",
        "requires_file_processing": true,
        "filter_criterion": {
            "kind": "accuracy",
            "description": "wrong outputs",
            "confidence_threshold": threshold,
        },
        "wants_report": wants_report,
        "wants_tickets": wants_tickets,
        "wants_answer": false,
        "output_shape": "executive",
    })
    .to_string()
}

fn verdicts() -> String {
    json!([
        { "issue_id": "1", "matches": true, "confidence": 0.9, "rationale": "clearly wrong output" },
        { "issue_id": "2", "matches": true, "confidence": 0.7, "rationale": "likely wrong output" },
        { "issue_id": "3", "matches": true, "confidence": 0.4, "rationale": "weak signal" },
    ])
    .to_string()
}

const CSV: &str = "id,title,description\n\
    1,export totals wrong,numbers disagree with dashboard\n\
    2,forecast off,predictions drift weekly\n\
    3,button misaligned,two pixels left\n";

struct Harness {
    app: axum::Router,
    chat: Arc<CountingChat>,
    tracker: Arc<SeqTracker>,
    store: Arc<InMemoryVectorStore>,
}

async fn harness(generator: ScenarioGenerator, chat: CountingChat) -> Harness {
    let chat = Arc::new(chat);
    let tracker = Arc::new(SeqTracker::new());
    let store = Arc::new(InMemoryVectorStore::new());
    let embeddings = Arc::new(StubEmbedding::default());

    // taxonomy grounding must exist for criterion runs
    let text = "accuracy issues wrong outputs incorrect calculations predictions";
    let vector = embeddings.embed(text).await.unwrap();
    store
        .upsert("issue_taxonomy", "tax1", vector, json!({ "text": text }))
        .await
        .unwrap();

    let mut config = TriageConfig::default();
    config.score_threshold = 0.0;

    let graph = build_graph(
        Collaborators {
            generator: Arc::new(generator),
            embeddings,
            store: store.clone(),
            chat: chat.clone(),
            tracker: tracker.clone(),
            source: Arc::new(FileDecoder),
        },
        config,
    )
    .unwrap();

    let app = create_app(Arc::new(AppState {
        graph,
        metrics: ApiMetrics::new().unwrap(),
    }));
    Harness {
        app,
        chat,
        tracker,
        store,
    }
}

async fn post_triage(app: axum::Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/triage")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn csv_request(instruction: &str) -> Value {
    json!({
        "instruction": instruction,
        "file_name": "issues.csv",
        "file_content_base64": base64::engine::general_purpose::STANDARD.encode(CSV),
    })
}

#[tokio::test]
async fn test_filter_keeps_records_above_the_contract_threshold() {
    let h = harness(
        ScenarioGenerator {
            contract: contract(0.6, true, false),
            verdicts: verdicts(),
        },
        CountingChat::ok(),
    )
    .await;

    let (status, body) = post_triage(h.app, csv_request("filter accuracy issues and post")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issues_processed"], json!(3));
    assert_eq!(body["issues_matched"], json!(2));
    assert_eq!(body["summary_posted"], json!(true));
    assert_eq!(body["report_url"], json!("https://chat.example/p/1"));
    assert_eq!(body["early_exit"], Value::Null);
}

#[tokio::test]
async fn test_nothing_above_threshold_exits_before_any_action() {
    let h = harness(
        ScenarioGenerator {
            contract: contract(0.99, true, true),
            verdicts: verdicts(),
        },
        CountingChat::ok(),
    )
    .await;

    let (status, body) = post_triage(h.app, csv_request("strictly filter accuracy issues")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issues_matched"], json!(0));
    assert!(body["early_exit"].as_str().unwrap().contains("0.99"));
    assert_eq!(body["summary_posted"], json!(false));
    assert_eq!(body["tickets_created"], json!(0));
    assert_eq!(h.chat.calls.load(Ordering::SeqCst), 0, "no action invoked");
    assert_eq!(h.tracker.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failed_report_does_not_sink_the_ticket_branch() {
    let h = harness(
        ScenarioGenerator {
            contract: contract(0.6, true, true),
            verdicts: verdicts(),
        },
        CountingChat::flaky(),
    )
    .await;

    let (status, body) =
        post_triage(h.app, csv_request("filter accuracy issues, post and file tickets")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary_posted"], json!(false));
    assert_eq!(body["tickets_created"], json!(2));
    assert_eq!(h.chat.calls.load(Ordering::SeqCst), 3, "1 attempt + 2 retries");
    assert!(body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e["stage"] == json!("report_action")));
}

#[tokio::test]
async fn test_already_filed_record_is_skipped_as_duplicate() {
    let h = harness(
        ScenarioGenerator {
            contract: contract(0.6, false, true),
            verdicts: verdicts(),
        },
        CountingChat::ok(),
    )
    .await;

    // the first record's history entry already exists
    let embeddings = StubEmbedding::default();
    let text = "export totals wrong numbers disagree with dashboard";
    let vector = embeddings.embed(text).await.unwrap();
    h.store
        .upsert(
            "ticket_history",
            "QA-old",
            vector,
            json!({ "key": "QA-old", "text": text }),
        )
        .await
        .unwrap();

    let (status, body) = post_triage(h.app, csv_request("file tickets for accuracy issues")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicates_skipped"], json!(1));
    assert_eq!(body["tickets_created"], json!(1));
    assert_eq!(h.tracker.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsupported_extension_is_rejected_before_the_pipeline() {
    let h = harness(
        ScenarioGenerator {
            contract: contract(0.6, true, false),
            verdicts: verdicts(),
        },
        CountingChat::ok(),
    )
    .await;

    let body = json!({
        "instruction": "filter issues",
        "file_name": "issues.xlsx",
        "file_content_base64": base64::engine::general_purpose::STANDARD.encode("bytes"),
    });
    let (status, response) = post_triage(h.app, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response["error"].as_str().unwrap().contains("xlsx"));
    assert_eq!(h.chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_health_reports_version() {
    let h = harness(
        ScenarioGenerator {
            contract: contract(0.6, true, false),
            verdicts: verdicts(),
        },
        CountingChat::ok(),
    )
    .await;

    let response = h
        .app
        .oneshot(
            Request::builder()
                .uri("/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
