use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::{AuditEvent, AuditRecord};
use crate::remote::SearchCategory;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Which records an audit query matches. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub cycle_id: Option<String>,
    pub server_id: Option<String>,
    pub category: Option<SearchCategory>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditFilter {
    /// Everything recorded during one cycle.
    pub fn for_cycle(cycle_id: impl Into<String>) -> Self {
        Self {
            cycle_id: Some(cycle_id.into()),
            ..Default::default()
        }
    }

    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }

    pub fn with_category(mut self, category: SearchCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }
}

/// Slice of a newest-first result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// How a finished cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Success,
    /// Every submission went through, but some server failed detection.
    Degraded,
    Failed,
    Aborted,
}

/// A finished cycle as its closing audit record describes it.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub finished_at: DateTime<Utc>,
    pub outcome: CycleOutcome,
    pub total_searches: usize,
    pub total_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CycleSummary {
    /// Summarise a `cycle_completed` or `cycle_failed` record.
    pub fn from_record(record: &AuditRecord) -> Option<Self> {
        match record.data {
            AuditEvent::CycleCompleted {
                ref cycle_id,
                success,
                degraded,
                total_searches,
                total_failures,
                duration_ms,
            } => Some(Self {
                cycle_id: cycle_id.clone(),
                finished_at: record.timestamp,
                outcome: match (success, degraded) {
                    (false, _) => CycleOutcome::Failed,
                    (true, true) => CycleOutcome::Degraded,
                    (true, false) => CycleOutcome::Success,
                },
                total_searches,
                total_failures,
                duration_ms: Some(duration_ms),
                error: None,
            }),
            AuditEvent::CycleFailed {
                ref cycle_id,
                ref error,
                aborted,
            } => Some(Self {
                cycle_id: cycle_id.clone(),
                finished_at: record.timestamp,
                outcome: if aborted {
                    CycleOutcome::Aborted
                } else {
                    CycleOutcome::Failed
                },
                total_searches: 0,
                total_failures: 0,
                duration_ms: None,
                error: Some(error.clone()),
            }),
            _ => None,
        }
    }
}

/// Persistent audit storage
pub trait AuditStore: Send + Sync {
    /// Persist records atomically, in order.
    fn insert_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError>;

    /// Matching records, newest first.
    fn query(&self, filter: &AuditFilter, page: Page) -> Result<Vec<AuditRecord>, AuditError>;

    /// Matching records, ignoring pagination.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;

    /// Every record of one cycle, oldest first.
    fn cycle_timeline(&self, cycle_id: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let filter = AuditFilter::for_cycle(cycle_id);
        let page = Page {
            limit: self.count(&filter)?,
            offset: 0,
        };
        let mut records = self.query(&filter, page)?;
        records.reverse();
        Ok(records)
    }

    /// The most recently finished cycles, newest first.
    fn recent_cycles(&self, limit: i64) -> Result<Vec<CycleSummary>, AuditError> {
        let mut summaries = Vec::new();
        for event_type in ["cycle_completed", "cycle_failed"] {
            let filter = AuditFilter::default().with_event_type(event_type);
            let page = Page { limit, offset: 0 };
            summaries.extend(
                self.query(&filter, page)?
                    .iter()
                    .filter_map(CycleSummary::from_record),
            );
        }
        summaries.sort_by(|a, b| b.finished_at.cmp(&a.finished_at));
        summaries.truncate(limit.max(0) as usize);
        Ok(summaries)
    }
}
