//! Types for the automation cycle.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::detector::DetectionResults;
use crate::trigger::TriggerResults;

/// Full outcome of one automation cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleResult {
    pub cycle_id: String,
    pub manual: bool,
    pub dry_run: bool,
    /// False when a search submission failed or the cycle ended early.
    ///
    /// Servers that failed detection do not clear this flag; they set
    /// `degraded` and appear in `errors`, since the remaining servers were
    /// still searched.
    pub success: bool,
    /// At least one server failed detection. Independent of `success`.
    pub degraded: bool,
    /// Items submitted for search (planned, in dry-run).
    pub total_searches: usize,
    /// Failed (server, category) submissions.
    pub total_failures: usize,
    /// Human-readable problems, detection failures first.
    pub errors: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub detection: DetectionResults,
    pub triggers: TriggerResults,
}

impl CycleResult {
    pub(crate) fn begin(cycle_id: String, manual: bool, dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id,
            manual,
            dry_run,
            success: false,
            degraded: false,
            total_searches: 0,
            total_failures: 0,
            errors: Vec::new(),
            started_at,
            duration_ms: 0,
            detection: DetectionResults::default(),
            triggers: TriggerResults {
                dry_run,
                ..Default::default()
            },
        }
    }
}

/// Errors that end a cycle early.
///
/// Every variant carries the unsuccessful [`CycleResult`] assembled so far.
#[derive(Debug, Error)]
pub enum CycleError {
    /// Server list or limits could not be read.
    #[error("configuration unavailable: {source}")]
    Config {
        source: ConfigError,
        result: Box<CycleResult>,
    },

    /// Detection output could not be planned against.
    #[error("invalid cycle input: {message}")]
    InvalidInput {
        message: String,
        result: Box<CycleResult>,
    },

    /// Cancelled by shutdown.
    #[error("cycle aborted")]
    Aborted { result: Box<CycleResult> },
}

impl CycleError {
    pub fn result(&self) -> &CycleResult {
        match self {
            Self::Config { result, .. }
            | Self::InvalidInput { result, .. }
            | Self::Aborted { result } => result,
        }
    }

    pub fn into_result(self) -> CycleResult {
        match self {
            Self::Config { result, .. }
            | Self::InvalidInput { result, .. }
            | Self::Aborted { result } => *result,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}
