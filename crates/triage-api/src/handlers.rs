//! API handlers: request validation, pipeline invocation, and the mapping
//! from run results to HTTP statuses.
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, warn};
use uuid::Uuid;

use triage_core::contract::FileKind;
use triage_core::state::{PipelineState, RawFile};
use triage_core::TRIAGE_VERSION;
use triage_stages::BuildResponseStage;
use triage_core::stage::Stage;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TriageRequest {
    pub instruction: String,
    pub file_name: Option<String>,
    pub file_content_base64: Option<String>,
}

fn reject(message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

/// Validate the upload before the pipeline starts. Unknown extensions and
/// undecodable content are request rejections, not pipeline errors.
fn decode_upload(request: &TriageRequest) -> Result<Option<RawFile>, (StatusCode, Json<Value>)> {
    let Some(name) = &request.file_name else {
        return Ok(None);
    };

    let extension = std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let Some(kind) = FileKind::from_extension(extension) else {
        return Err(reject(format!(
            "unsupported file type '{extension}'; accepted: .csv, .tsv, .md, .txt"
        )));
    };

    let Some(content) = &request.file_content_base64 else {
        return Err(reject("file_name given without file_content_base64"));
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(content)
        .map_err(|e| reject(format!("file content is not valid base64: {e}")))?;

    Ok(Some(RawFile {
        name: name.clone(),
        kind,
        bytes,
    }))
}

pub async fn triage(
    State(app): State<Arc<AppState>>,
    Json(request): Json<TriageRequest>,
) -> (StatusCode, Json<Value>) {
    app.metrics.requests_total.inc();

    if request.instruction.trim().is_empty() {
        return reject("instruction must not be empty");
    }
    let file = match decode_upload(&request) {
        Ok(file) => file,
        Err(rejection) => return rejection,
    };

    let mut state = PipelineState::new(Uuid::new_v4().to_string(), request.instruction);
    if let Some(file) = file {
        state = state.with_file(file);
    }

    match app.graph.run(state).await {
        Ok(state) => {
            app.metrics.record_run(&state);
            match &state.response {
                Some(response) => (
                    StatusCode::OK,
                    Json(serde_json::to_value(response).unwrap_or_default()),
                ),
                None => {
                    error!(request_id = %state.request_id, "terminal stage left no response");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({ "error": "pipeline produced no response" })),
                    )
                }
            }
        }
        Err(failure) => {
            app.metrics.request_failures_total.inc();
            if failure.error.is_request_rejection() {
                return reject(failure.error.to_string());
            }

            // Surface the partial state: the response assembler is pure and
            // infallible, so a failed run still reports what it got to.
            warn!(stage = %failure.stage, error = %failure.error, "run aborted");
            let mut state = *failure.state;
            let _ = BuildResponseStage.run(&mut state).await;
            app.metrics.record_run(&state);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::to_value(&state.response).unwrap_or_default()),
            )
        }
    }
}

pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "version": TRIAGE_VERSION,
            "time": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

pub async fn metrics(State(app): State<Arc<AppState>>) -> (StatusCode, String) {
    match app.metrics.encode() {
        Ok(text) => (StatusCode::OK, text),
        Err(error) => {
            error!(%error, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}
