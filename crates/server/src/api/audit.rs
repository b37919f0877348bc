//! Read side of the audit log: raw event queries and per-cycle history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use scoutarr_core::{AuditError, AuditFilter, AuditRecord, CycleSummary, Page, SearchCategory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::handlers::ErrorResponse;
use crate::state::AppState;

const MAX_EVENTS: i64 = 1000;
const DEFAULT_EVENTS: i64 = 100;
const MAX_CYCLES: i64 = 200;
const DEFAULT_CYCLES: i64 = 20;

/// Query parameters for `GET /audit`
#[derive(Debug, Deserialize)]
pub struct AuditQueryParams {
    pub cycle_id: Option<String>,
    pub server_id: Option<String>,
    /// e.g. `missing-movies`
    pub category: Option<SearchCategory>,
    pub event_type: Option<String>,
    /// ISO 8601, inclusive
    pub from: Option<DateTime<Utc>>,
    /// ISO 8601, inclusive
    pub to: Option<DateTime<Utc>>,
    /// Default 100, max 1000
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditQueryParams {
    fn filter(&self) -> AuditFilter {
        AuditFilter {
            cycle_id: self.cycle_id.clone(),
            server_id: self.server_id.clone(),
            category: self.category,
            event_type: self.event_type.clone(),
            from: self.from,
            to: self.to,
        }
    }

    fn page(&self) -> Page {
        Page {
            limit: self.limit.unwrap_or(DEFAULT_EVENTS).clamp(1, MAX_EVENTS),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditQueryResponse {
    pub events: Vec<AuditRecord>,
    /// Matching events across all pages
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Query audit events, newest first
pub async fn query_audit(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuditQueryParams>,
) -> Response {
    let filter = params.filter();
    let page = params.page();
    let store = state.audit_store();

    let events = match store.query(&filter, page) {
        Ok(events) => events,
        Err(e) => return store_failure("query audit events", e),
    };
    let total = match store.count(&filter) {
        Ok(total) => total,
        Err(e) => return store_failure("count audit events", e),
    };

    Json(AuditQueryResponse {
        events,
        total,
        limit: page.limit,
        offset: page.offset,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CycleHistoryParams {
    /// Default 20, max 200
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CycleHistoryResponse {
    pub cycles: Vec<CycleSummary>,
}

/// Recently finished cycles, newest first
pub async fn cycle_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CycleHistoryParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_CYCLES).clamp(1, MAX_CYCLES);
    match state.audit_store().recent_cycles(limit) {
        Ok(cycles) => Json(CycleHistoryResponse { cycles }).into_response(),
        Err(e) => store_failure("read cycle history", e),
    }
}

#[derive(Debug, Serialize)]
pub struct CycleTimelineResponse {
    pub cycle_id: String,
    /// Oldest first
    pub events: Vec<AuditRecord>,
    /// Present once the cycle has finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<CycleSummary>,
}

/// Everything one cycle recorded, in the order it happened
pub async fn cycle_timeline(
    State(state): State<Arc<AppState>>,
    Path(cycle_id): Path<String>,
) -> Response {
    let events = match state.audit_store().cycle_timeline(&cycle_id) {
        Ok(events) => events,
        Err(e) => return store_failure("read cycle events", e),
    };
    if events.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "No audit events for cycle {}",
                cycle_id
            ))),
        )
            .into_response();
    }

    let summary = events.last().and_then(CycleSummary::from_record);
    Json(CycleTimelineResponse {
        cycle_id,
        events,
        summary,
    })
    .into_response()
}

fn store_failure(action: &str, error: AuditError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(format!("Failed to {}: {}", action, error))),
    )
        .into_response()
}
