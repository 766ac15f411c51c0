// HTTP route handlers for the interactive run API

use std::sync::Arc;

use arbiter_common::types::Language;
use arbiter_engine::harness::{self, DEFAULT_RUN_TIMEOUT_MS};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default = "default_language")]
    pub language: Language,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub input: String,
}

fn default_language() -> Language {
    Language::Cpp
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSuccess {
    pub success: bool,
    pub output: String,
    pub time_ms: f64,
    pub memory_kb: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    pub success: bool,
    pub error: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub time_ms: f64,
    pub memory_kb: Option<u64>,
}

/// POST /api/v1/run - compile and run code once against caller-supplied
/// stdin. No verdict, no persistence, no queue; the request blocks until
/// the run finishes or hits the fixed timeout.
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunRequest>,
) -> impl IntoResponse {
    if payload.code.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Code body is required"
            })),
        )
            .into_response();
    }

    match harness::run_once(
        &state.scratch_root,
        payload.language,
        &payload.code,
        &payload.input,
        DEFAULT_RUN_TIMEOUT_MS,
    )
    .await
    {
        Ok(run) => {
            info!(
                language = %payload.language,
                time_ms = run.time_ms,
                "Run complete"
            );
            (
                StatusCode::OK,
                Json(RunSuccess {
                    success: true,
                    output: run.stdout.trim().to_string(),
                    time_ms: run.time_ms,
                    memory_kb: run.memory_kb,
                }),
            )
                .into_response()
        }
        Err(failure) => {
            error!(
                language = %payload.language,
                kind = failure.kind(),
                "Run failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RunError {
                    success: false,
                    error: failure.stderr(),
                    kind: failure.kind(),
                    time_ms: failure.time_ms().unwrap_or(0.0),
                    memory_kb: failure.memory_kb(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /health - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
