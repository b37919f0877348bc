use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::{AuditHandle, AuditRecord, AuditStore};

/// Records written per store transaction, at most.
const MAX_BATCH: usize = 64;

/// Background task persisting audit records.
///
/// Records that queue up while a write is in progress are written together,
/// so a cycle's burst of detection and submission events costs one
/// transaction rather than one per event.
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditRecord>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    /// Consume records until every [`AuditHandle`] has been dropped.
    pub async fn run(mut self) {
        info!("Audit writer started");

        let mut batch = Vec::with_capacity(MAX_BATCH);
        while self.rx.recv_many(&mut batch, MAX_BATCH).await > 0 {
            match self.store.insert_batch(&batch) {
                Ok(()) => {
                    for record in batch.iter().filter(|r| r.data.ends_cycle()) {
                        debug!(
                            cycle_id = record.cycle_id.as_deref().unwrap_or_default(),
                            "Cycle audit trail persisted"
                        );
                    }
                }
                Err(e) => error!(records = batch.len(), "Failed to write audit records: {}", e),
            }
            batch.clear();
        }

        info!("Audit writer shutting down");
    }
}

/// Create the audit channel.
///
/// Spawn the writer with `tokio::spawn(writer.run())`; hand clones of the
/// handle to the scheduler and automation.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    buffer_size: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AuditHandle::new(tx), AuditWriter { rx, store })
}
