//! Runs one automation cycle end to end.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditHandle, CycleAudit};
use crate::clock::Clock;
use crate::config::{AutomationConfig, ConfigError, ConfigStore, TriggerConfig};
use crate::detector::{DetectError, DetectionResults, Detector};
use crate::metrics;
use crate::remote::MediaManagerClient;
use crate::scheduler::{CycleRunner, CycleTrigger};
use crate::trigger::{SearchTrigger, TriggerError, TriggerResults};

use super::types::{CycleError, CycleResult};

/// Drives detection and search submission for one cycle at a time.
pub struct Automation {
    config_store: Arc<dyn ConfigStore>,
    detector: Detector,
    trigger: SearchTrigger,
    clock: Arc<dyn Clock>,
    /// Forces every cycle into dry-run.
    force_dry_run: bool,
    audit: Option<AuditHandle>,
    /// Cancels cycles started through [`CycleRunner`].
    shutdown: CancellationToken,
    last_cycle: RwLock<Option<CycleResult>>,
}

impl Automation {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        client: Arc<dyn MediaManagerClient>,
        clock: Arc<dyn Clock>,
        trigger_config: TriggerConfig,
        automation_config: &AutomationConfig,
    ) -> Self {
        Self {
            detector: Detector::new(Arc::clone(&config_store), Arc::clone(&client)),
            trigger: SearchTrigger::new(client, Arc::clone(&clock), trigger_config),
            config_store,
            clock,
            force_dry_run: automation_config.dry_run,
            audit: None,
            shutdown: CancellationToken::new(),
            last_cycle: RwLock::new(None),
        }
    }

    /// Attach an audit handle.
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Use the given token to abort scheduler-driven cycles.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The most recent cycle's result, whatever its outcome.
    pub async fn last_cycle(&self) -> Option<CycleResult> {
        self.last_cycle.read().await.clone()
    }

    /// Run one cycle.
    ///
    /// Per-server detection failures and per-submission failures are reported
    /// inside the returned result. Only an unreadable configuration, an
    /// unplannable detection output or cancellation produce an error, and the
    /// error carries the unsuccessful result.
    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
        is_manual: bool,
        dry_run: bool,
    ) -> Result<CycleResult, CycleError> {
        let cycle_id = Uuid::new_v4().to_string();
        let mut result = CycleResult::begin(cycle_id.clone(), is_manual, dry_run, self.clock.now());

        info!(cycle_id = %cycle_id, manual = is_manual, dry_run, "Cycle started");
        let audit = self.cycle_audit(&cycle_id);
        audit.started(is_manual, dry_run).await;

        let limits = match self.config_store.search_limits() {
            Ok(limits) => limits,
            Err(source) => return Err(self.config_failure(result, source).await),
        };

        let detection = match self.detector.detect_all(cancel).await {
            Ok(detection) => detection,
            Err(DetectError::Config(source)) => return Err(self.config_failure(result, source).await),
            Err(DetectError::Aborted) => return Err(self.aborted(result).await),
        };
        report_detection(&cycle_id, &detection);
        audit.detection(&detection).await;

        result.degraded = detection.failure_count > 0;
        for failed in detection.failures() {
            result.errors.push(format!(
                "{}: detection failed: {}",
                failed.server_name,
                failed.error.as_deref().unwrap_or("unknown error")
            ));
        }
        result.detection = detection;

        let triggers = match self
            .trigger
            .trigger(cancel, &result.detection, &limits, dry_run)
            .await
        {
            Ok(triggers) => triggers,
            Err(TriggerError::Aborted { partial }) => {
                report_triggers(&cycle_id, &partial);
                audit.submissions(&partial).await;
                result.triggers = *partial;
                return Err(self.aborted(result).await);
            }
            Err(TriggerError::InvalidInput(message)) => {
                result.errors.push(message.clone());
                self.conclude_failure(&mut result, &message, false).await;
                return Err(CycleError::InvalidInput {
                    message,
                    result: Box::new(result),
                });
            }
        };
        report_triggers(&cycle_id, &triggers);
        audit.submissions(&triggers).await;

        for failed in triggers.results.iter().filter(|r| !r.success) {
            result.errors.push(format!(
                "{} {}: search failed: {}",
                failed.server_name,
                failed.category,
                failed.error.as_deref().unwrap_or("unknown error")
            ));
        }
        result.total_searches = triggers.total_triggered();
        result.total_failures = triggers.failure_count;
        result.success = triggers.failure_count == 0;
        result.triggers = triggers;
        result.duration_ms = self.elapsed_ms(&result);

        let outcome = if !result.success {
            "failed"
        } else if result.degraded {
            "degraded"
        } else {
            "success"
        };
        record_cycle_metrics(&result, outcome);

        info!(
            cycle_id = %cycle_id,
            success = result.success,
            degraded = result.degraded,
            total_searches = result.total_searches,
            total_failures = result.total_failures,
            duration_ms = result.duration_ms,
            "Cycle completed"
        );
        audit.completed(&result).await;

        *self.last_cycle.write().await = Some(result.clone());
        Ok(result)
    }

    async fn config_failure(&self, mut result: CycleResult, source: ConfigError) -> CycleError {
        let message = format!("configuration unavailable: {}", source);
        result.errors.push(message.clone());
        self.conclude_failure(&mut result, &message, false).await;
        CycleError::Config {
            source,
            result: Box::new(result),
        }
    }

    async fn aborted(&self, mut result: CycleResult) -> CycleError {
        result.errors.push("cycle aborted".to_string());
        self.conclude_failure(&mut result, "cycle aborted", true).await;
        CycleError::Aborted {
            result: Box::new(result),
        }
    }

    async fn conclude_failure(&self, result: &mut CycleResult, error: &str, aborted: bool) {
        result.success = false;
        result.total_searches = result.triggers.total_triggered();
        result.total_failures = result.triggers.failure_count;
        result.duration_ms = self.elapsed_ms(result);
        record_cycle_metrics(result, if aborted { "aborted" } else { "failed" });

        if aborted {
            info!(cycle_id = %result.cycle_id, "Cycle aborted");
        } else {
            warn!(cycle_id = %result.cycle_id, error = %error, "Cycle failed");
        }
        self.cycle_audit(&result.cycle_id).failed(error, aborted).await;

        *self.last_cycle.write().await = Some(result.clone());
    }

    fn elapsed_ms(&self, result: &CycleResult) -> u64 {
        (self.clock.now() - result.started_at)
            .num_milliseconds()
            .max(0) as u64
    }

    fn cycle_audit(&self, cycle_id: &str) -> CycleAudit {
        match self.audit {
            Some(ref audit) => audit.cycle(cycle_id),
            None => CycleAudit::detached(cycle_id),
        }
    }
}

/// Logs and metrics for the detection phase.
fn report_detection(cycle_id: &str, detection: &DetectionResults) {
    for server in &detection.results {
        match server.error {
            None => {
                debug!(
                    cycle_id = %cycle_id,
                    server = %server.server_id,
                    missing = server.missing.len(),
                    cutoff_unmet = server.cutoff_unmet.len(),
                    "Detection completed"
                );
                metrics::WANTED_ITEMS
                    .with_label_values(&[server.server_id.as_str(), "missing"])
                    .set(server.missing.len() as i64);
                metrics::WANTED_ITEMS
                    .with_label_values(&[server.server_id.as_str(), "cutoff"])
                    .set(server.cutoff_unmet.len() as i64);
            }
            Some(ref error) => {
                warn!(
                    cycle_id = %cycle_id,
                    server = %server.server_id,
                    error = %error,
                    "Detection failed"
                );
                metrics::DETECTION_FAILURES
                    .with_label_values(&[server.server_id.as_str()])
                    .inc();
            }
        }
    }
}

/// Logs and metrics for the search phase.
fn report_triggers(cycle_id: &str, triggers: &TriggerResults) {
    for notice in &triggers.rate_limits {
        warn!(
            cycle_id = %cycle_id,
            server = %notice.server_id,
            category = %notice.category,
            consecutive = notice.consecutive,
            "Rate limited"
        );
        metrics::RATE_LIMITS
            .with_label_values(&[notice.server_id.as_str()])
            .inc();
    }

    for submission in &triggers.results {
        let category = submission.category.as_str();
        if submission.success {
            info!(
                cycle_id = %cycle_id,
                server = %submission.server_id,
                category = %category,
                count = submission.count,
                dry_run = triggers.dry_run,
                "Search triggered"
            );
            let status = if triggers.dry_run { "dry_run" } else { "success" };
            metrics::SEARCH_COMMANDS
                .with_label_values(&[category, status])
                .inc();
            if !triggers.dry_run {
                metrics::ITEMS_SEARCHED
                    .with_label_values(&[category])
                    .inc_by(submission.count as u64);
            }
        } else {
            let error = submission.error.clone().unwrap_or_default();
            warn!(
                cycle_id = %cycle_id,
                server = %submission.server_id,
                category = %category,
                count = submission.count,
                error = %error,
                "Search failed"
            );
            metrics::SEARCH_COMMANDS
                .with_label_values(&[category, "failed"])
                .inc();
        }
    }
}

fn record_cycle_metrics(result: &CycleResult, outcome: &str) {
    let trigger = if result.manual { "manual" } else { "scheduled" };
    metrics::CYCLES_TOTAL
        .with_label_values(&[trigger, outcome])
        .inc();
    metrics::CYCLE_DURATION
        .with_label_values(&[trigger])
        .observe(result.duration_ms as f64 / 1000.0);
}

#[async_trait]
impl CycleRunner for Automation {
    async fn execute(&self, trigger: CycleTrigger) -> Result<CycleResult, CycleError> {
        match trigger {
            CycleTrigger::Scheduled => {
                self.run_cycle(&self.shutdown, false, self.force_dry_run)
                    .await
            }
            CycleTrigger::Manual { dry_run } => {
                self.run_cycle(&self.shutdown, true, dry_run || self.force_dry_run)
                    .await
            }
        }
    }
}
