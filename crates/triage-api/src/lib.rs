//! Triage API: the HTTP front door for the pipeline.
//!
//! `POST /v1/triage` runs the full graph; `GET /v1/health` and
//! `GET /metrics` cover liveness and Prometheus exposition.
pub mod decode;
pub mod handlers;
pub mod local;
pub mod metrics;
pub mod pipeline;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use triage_core::config::TriageConfig;
use triage_core::graph::PipelineGraph;
use triage_retrieval::{InMemoryVectorStore, StubEmbedding};

use crate::metrics::ApiMetrics;
use crate::pipeline::Collaborators;

pub struct AppState {
    pub graph: PipelineGraph,
    pub metrics: ApiMetrics,
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/triage", post(handlers::triage))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the server with local in-process collaborators and serve until
/// shutdown. Deployments with real backends assemble their own
/// [`Collaborators`] and call [`create_app`] directly.
pub async fn run(addr: &str) -> anyhow::Result<()> {
    let config = TriageConfig::from_env();
    let collaborators = Collaborators {
        generator: Arc::new(local::LocalGenerator),
        embeddings: Arc::new(StubEmbedding::default()),
        store: Arc::new(InMemoryVectorStore::new()),
        chat: Arc::new(local::LogChat),
        tracker: Arc::new(local::MemoryTracker::new()),
        source: Arc::new(decode::FileDecoder),
    };
    let state = Arc::new(AppState {
        graph: pipeline::build_graph(collaborators, config)?,
        metrics: ApiMetrics::new()?,
    });

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("triage API listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
