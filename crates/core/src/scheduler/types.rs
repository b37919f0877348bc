//! Types for the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::automation::{CycleError, CycleResult};

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    Scheduled,
    Manual { dry_run: bool },
}

/// The work the scheduler runs for each cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn execute(&self, trigger: CycleTrigger) -> Result<CycleResult, CycleError>;
}

/// Errors returned by the manual-trigger path.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is not running")]
    NotRunning,

    /// A manual cycle is already queued behind the active one.
    #[error("a manual cycle is already queued")]
    Busy,

    /// The queued request was discarded by `stop()`.
    #[error("queued manual cycle was cancelled")]
    Cancelled,

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Externally visible scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    /// Armed, waiting for the timer.
    Idle,
    CycleActive,
}

/// Point-in-time snapshot of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub running: bool,
    pub cycle_active: bool,
    pub manual_queued: bool,
    /// Start time of the most recent cycle.
    pub last_run: Option<DateTime<Utc>>,
    /// When the timer fires next; unset while stopped or mid-cycle.
    pub next_run: Option<DateTime<Utc>>,
    pub interval_secs: u64,
}

pub(crate) type CycleOutcome = Result<CycleResult, CycleError>;

/// Receipt for an accepted manual trigger.
#[derive(Debug)]
pub struct ManualTicket {
    pub(crate) queued: bool,
    pub(crate) rx: oneshot::Receiver<CycleOutcome>,
}

impl ManualTicket {
    /// True if the request waits behind an active cycle.
    pub fn is_queued(&self) -> bool {
        self.queued
    }

    /// Wait for the cycle to finish.
    pub async fn wait(self) -> Result<CycleResult, SchedulerError> {
        match self.rx.await {
            Ok(outcome) => outcome.map_err(SchedulerError::from),
            Err(_) => Err(SchedulerError::Cancelled),
        }
    }
}
