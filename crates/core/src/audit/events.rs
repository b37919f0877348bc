use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::SearchCategory;

/// Audit event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Scheduler lifecycle
    SchedulerStarted {
        interval_secs: u64,
    },
    SchedulerStopped,

    // Cycle lifecycle
    CycleStarted {
        cycle_id: String,
        manual: bool,
        dry_run: bool,
    },
    /// One server answered both wanted-list queries.
    DetectionCompleted {
        cycle_id: String,
        server_id: String,
        server_name: String,
        missing: usize,
        cutoff_unmet: usize,
    },
    DetectionFailed {
        cycle_id: String,
        server_id: String,
        server_name: String,
        error: String,
    },
    /// A batched search command was accepted (or planned, in dry-run).
    SearchTriggered {
        cycle_id: String,
        server_id: String,
        category: SearchCategory,
        count: usize,
        dry_run: bool,
    },
    SearchFailed {
        cycle_id: String,
        server_id: String,
        category: SearchCategory,
        count: usize,
        error: String,
    },
    RateLimited {
        cycle_id: String,
        server_id: String,
        category: SearchCategory,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_ms: Option<u64>,
    },
    CycleCompleted {
        cycle_id: String,
        success: bool,
        degraded: bool,
        total_searches: usize,
        total_failures: usize,
        duration_ms: u64,
    },
    /// The cycle ended early (configuration failure or shutdown).
    CycleFailed {
        cycle_id: String,
        error: String,
        aborted: bool,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::SchedulerStarted { .. } => "scheduler_started",
            Self::SchedulerStopped => "scheduler_stopped",
            Self::CycleStarted { .. } => "cycle_started",
            Self::DetectionCompleted { .. } => "detection_completed",
            Self::DetectionFailed { .. } => "detection_failed",
            Self::SearchTriggered { .. } => "search_triggered",
            Self::SearchFailed { .. } => "search_failed",
            Self::RateLimited { .. } => "rate_limited",
            Self::CycleCompleted { .. } => "cycle_completed",
            Self::CycleFailed { .. } => "cycle_failed",
        }
    }

    /// Extract cycle_id if this event belongs to a cycle
    pub fn cycle_id(&self) -> Option<&str> {
        match self {
            Self::CycleStarted { cycle_id, .. }
            | Self::DetectionCompleted { cycle_id, .. }
            | Self::DetectionFailed { cycle_id, .. }
            | Self::SearchTriggered { cycle_id, .. }
            | Self::SearchFailed { cycle_id, .. }
            | Self::RateLimited { cycle_id, .. }
            | Self::CycleCompleted { cycle_id, .. }
            | Self::CycleFailed { cycle_id, .. } => Some(cycle_id),
            _ => None,
        }
    }

    /// Extract server_id if this event concerns a single media manager
    pub fn server_id(&self) -> Option<&str> {
        match self {
            Self::DetectionCompleted { server_id, .. }
            | Self::DetectionFailed { server_id, .. }
            | Self::SearchTriggered { server_id, .. }
            | Self::SearchFailed { server_id, .. }
            | Self::RateLimited { server_id, .. } => Some(server_id),
            _ => None,
        }
    }

    /// Search category, for submission and rate-limit events
    pub fn category(&self) -> Option<SearchCategory> {
        match self {
            Self::SearchTriggered { category, .. }
            | Self::SearchFailed { category, .. }
            | Self::RateLimited { category, .. } => Some(*category),
            _ => None,
        }
    }

    /// True for the last event a cycle emits.
    pub fn ends_cycle(&self) -> bool {
        matches!(self, Self::CycleCompleted { .. } | Self::CycleFailed { .. })
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub cycle_id: Option<String>,
    pub server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SearchCategory>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// Build an unsaved record, deriving the indexed columns from the event.
    pub fn from_event(timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            cycle_id: event.cycle_id().map(String::from),
            server_id: event.server_id().map(String::from),
            category: event.category(),
            data: event,
        }
    }
}
