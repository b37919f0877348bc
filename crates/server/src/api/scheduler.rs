use axum::{extract::State, Json};
use scoutarr_core::SchedulerStatus;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

/// Response for scheduler start/stop
#[derive(Debug, Serialize)]
pub struct SchedulerActionResponse {
    pub message: String,
    pub status: SchedulerStatus,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler().status())
}

pub async fn start(State(state): State<Arc<AppState>>) -> Json<SchedulerActionResponse> {
    let message = if state.scheduler().start() {
        "Scheduler started"
    } else {
        "Scheduler already running"
    };
    Json(SchedulerActionResponse {
        message: message.to_string(),
        status: state.scheduler().status(),
    })
}

/// Stop the timer. A cycle already running is left to finish.
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<SchedulerActionResponse> {
    let message = if state.scheduler().stop() {
        "Scheduler stopped"
    } else {
        "Scheduler already stopped"
    };
    Json(SchedulerActionResponse {
        message: message.to_string(),
        status: state.scheduler().status(),
    })
}
