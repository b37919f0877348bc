use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use scoutarr_core::{CycleError, CycleResult, SchedulerError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::ErrorResponse;
use crate::state::AppState;

/// Body of a manual trigger request. An empty body means defaults.
#[derive(Debug, Default, Deserialize)]
pub struct TriggerCycleRequest {
    /// Compute the allocation without submitting anything.
    #[serde(default)]
    pub dry_run: bool,
}

/// Error body for a cycle that ended early, with what it got done.
#[derive(Debug, Serialize)]
pub struct CycleErrorResponse {
    pub error: String,
    pub aborted: bool,
    pub result: CycleResult,
}

/// Run a manual cycle and respond with its result.
///
/// Waits behind an active cycle if the queue slot is free.
pub async fn trigger_cycle(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: TriggerCycleRequest = if body.is_empty() {
        TriggerCycleRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(format!("Invalid request body: {}", e))),
                )
                    .into_response();
            }
        }
    };

    match state.scheduler().run_manual(request.dry_run).await {
        Ok(result) => Json(result).into_response(),
        Err(SchedulerError::Busy) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("A manual cycle is already queued")),
        )
            .into_response(),
        Err(e @ (SchedulerError::NotRunning | SchedulerError::Cancelled)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
        Err(SchedulerError::Cycle(e)) => cycle_error_response(e),
    }
}

fn cycle_error_response(error: CycleError) -> Response {
    let status = if error.is_aborted() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    let body = CycleErrorResponse {
        error: error.to_string(),
        aborted: error.is_aborted(),
        result: error.into_result(),
    };
    (status, Json(body)).into_response()
}

/// Most recent cycle result, if any cycle has run since startup.
pub async fn last_cycle(State(state): State<Arc<AppState>>) -> Response {
    match state.automation().last_cycle().await {
        Some(result) => Json(result).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("No cycle has run yet")),
        )
            .into_response(),
    }
}
