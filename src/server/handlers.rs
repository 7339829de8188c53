//! HTTP request handlers for API endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::error::ApiError;
use super::state::AppState;
use crate::analysis::AnalysisType;
use crate::engine::{ProcessReport, TaskOutcome};
use crate::registry::ParameterInfo;
use crate::result::MergedResponse;

/// Health check endpoint
///
/// Returns a simple status response to verify the server is running
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "backend": state.engine.backend_name(),
    }))
}

/// Response for analysis listing
#[derive(Debug, Serialize)]
pub struct AnalysesResponse {
    pub analyses: Vec<AnalysisInfo>,
}

/// Information about one supported analysis type
#[derive(Debug, Serialize)]
pub struct AnalysisInfo {
    #[serde(rename = "type")]
    pub analysis_type: AnalysisType,
    pub description: &'static str,
    pub parameters: &'static [ParameterInfo],
}

/// GET /analyses - List supported analysis types and their parameters
pub async fn list_analyses(State(state): State<Arc<AppState>>) -> Json<AnalysesResponse> {
    let analyses = state
        .compiler
        .registry()
        .definitions()
        .into_iter()
        .map(|definition| AnalysisInfo {
            analysis_type: definition.analysis_type(),
            description: definition.description(),
            parameters: definition.parameters(),
        })
        .collect();

    Json(AnalysesResponse { analyses })
}

/// Outcome of one top-level task
#[derive(Debug, Serialize)]
pub struct OutcomeBody {
    pub analysis_type: AnalysisType,
    pub index: usize,
    pub position: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MergedResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TaskOutcome> for OutcomeBody {
    fn from(outcome: TaskOutcome) -> Self {
        let (data, error) = match outcome.result {
            Ok(merged) => (Some(merged), None),
            Err(err) => (None, Some(err.to_string())),
        };
        OutcomeBody {
            analysis_type: outcome.analysis_type,
            index: outcome.index,
            position: outcome.position,
            data,
            error,
        }
    }
}

/// Response for a processed configuration
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub run_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_ms: u64,
    pub outcomes: Vec<OutcomeBody>,
}

impl From<ProcessReport> for ProcessResponse {
    fn from(report: ProcessReport) -> Self {
        ProcessResponse {
            run_id: report.summary.run_id,
            succeeded: report.summary.succeeded,
            failed: report.summary.failed,
            elapsed_ms: report.summary.elapsed.as_millis() as u64,
            outcomes: report.outcomes.into_iter().map(OutcomeBody::from).collect(),
        }
    }
}

/// POST /process - Compile a configuration and run every task
///
/// Unreadable bodies and validation failures are rejected before anything is
/// dispatched; task failures are reported per outcome.
pub async fn process(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let Json(config) = payload?;
    let graph = state.compiler.compile(&config)?;
    tracing::debug!(tasks = graph.len(), "Processing configuration");

    let report = state.engine.process_all(&graph).await;
    Ok(Json(ProcessResponse::from(report)))
}
