//! Emitting side of the audit log.

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;

use super::{AuditEvent, AuditRecord};
use crate::automation::CycleResult;
use crate::detector::DetectionResults;
use crate::trigger::TriggerResults;

/// Sends records to the [`AuditWriter`](super::AuditWriter). Cheap to clone.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditRecord>) -> Self {
        Self { tx }
    }

    /// Record an event, waiting for channel capacity.
    ///
    /// A closed log drops the event; the caller is never failed.
    pub async fn emit(&self, event: AuditEvent) {
        let record = AuditRecord::from_event(Utc::now(), event);
        if let Err(e) = self.tx.send(record).await {
            warn!(event_type = %e.0.event_type, "Audit log closed, event dropped");
        }
    }

    /// Record without waiting. Returns false if the event was dropped.
    pub fn try_emit(&self, event: AuditEvent) -> bool {
        let record = AuditRecord::from_event(Utc::now(), event);
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    event_type = %e.into_inner().event_type,
                    "Audit log unavailable, event dropped"
                );
                false
            }
        }
    }

    /// Recorder for the events of one cycle.
    pub fn cycle(&self, cycle_id: &str) -> CycleAudit {
        CycleAudit {
            handle: Some(self.clone()),
            cycle_id: cycle_id.to_string(),
        }
    }
}

/// The audit trail of a single cycle.
///
/// Every event it writes carries the cycle id. A detached recorder drops
/// everything, for engines running without an audit log.
pub struct CycleAudit {
    handle: Option<AuditHandle>,
    cycle_id: String,
}

impl CycleAudit {
    pub fn detached(cycle_id: &str) -> Self {
        Self {
            handle: None,
            cycle_id: cycle_id.to_string(),
        }
    }

    pub async fn started(&self, manual: bool, dry_run: bool) {
        self.emit(AuditEvent::CycleStarted {
            cycle_id: self.cycle_id.clone(),
            manual,
            dry_run,
        })
        .await;
    }

    /// One event per server, in detection order.
    pub async fn detection(&self, detection: &DetectionResults) {
        for server in &detection.results {
            let event = match server.error {
                None => AuditEvent::DetectionCompleted {
                    cycle_id: self.cycle_id.clone(),
                    server_id: server.server_id.clone(),
                    server_name: server.server_name.clone(),
                    missing: server.missing.len(),
                    cutoff_unmet: server.cutoff_unmet.len(),
                },
                Some(ref error) => AuditEvent::DetectionFailed {
                    cycle_id: self.cycle_id.clone(),
                    server_id: server.server_id.clone(),
                    server_name: server.server_name.clone(),
                    error: error.clone(),
                },
            };
            self.emit(event).await;
        }
    }

    /// Rate-limit notices, then one event per (server, category) batch.
    pub async fn submissions(&self, triggers: &TriggerResults) {
        for notice in &triggers.rate_limits {
            self.emit(AuditEvent::RateLimited {
                cycle_id: self.cycle_id.clone(),
                server_id: notice.server_id.clone(),
                category: notice.category,
                retry_after_ms: notice.retry_after.map(|d| d.as_millis() as u64),
            })
            .await;
        }

        for submission in &triggers.results {
            let event = if submission.success {
                AuditEvent::SearchTriggered {
                    cycle_id: self.cycle_id.clone(),
                    server_id: submission.server_id.clone(),
                    category: submission.category,
                    count: submission.count,
                    dry_run: triggers.dry_run,
                }
            } else {
                AuditEvent::SearchFailed {
                    cycle_id: self.cycle_id.clone(),
                    server_id: submission.server_id.clone(),
                    category: submission.category,
                    count: submission.count,
                    error: submission.error.clone().unwrap_or_default(),
                }
            };
            self.emit(event).await;
        }
    }

    pub async fn completed(&self, result: &CycleResult) {
        self.emit(AuditEvent::CycleCompleted {
            cycle_id: self.cycle_id.clone(),
            success: result.success,
            degraded: result.degraded,
            total_searches: result.total_searches,
            total_failures: result.total_failures,
            duration_ms: result.duration_ms,
        })
        .await;
    }

    pub async fn failed(&self, error: &str, aborted: bool) {
        self.emit(AuditEvent::CycleFailed {
            cycle_id: self.cycle_id.clone(),
            error: error.to_string(),
            aborted,
        })
        .await;
    }

    async fn emit(&self, event: AuditEvent) {
        if let Some(ref handle) = self.handle {
            handle.emit(event).await;
        }
    }
}
