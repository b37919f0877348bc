//! Types for the search trigger.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::remote::{SearchCategory, SearchReason};

/// Errors that stop the search phase as a whole.
///
/// Per-submission failures never surface here; they are recorded in
/// [`TriggerResult`]s.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The detection input cannot be planned against.
    #[error("invalid trigger input: {0}")]
    InvalidInput(String),

    /// Cancelled mid-way. Carries whatever was recorded before cancellation.
    #[error("search phase aborted")]
    Aborted { partial: Box<TriggerResults> },
}

impl TriggerError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

/// Outcome of one batched submission for a (server, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerResult {
    pub server_id: String,
    pub server_name: String,
    pub category: SearchCategory,
    /// Items in the batch.
    pub count: usize,
    /// Item ids in the batch, in detection order.
    pub item_ids: Vec<i64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A rate-limited response seen during the search phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitNotice {
    pub server_id: String,
    pub category: SearchCategory,
    /// Server-supplied delay, if any.
    #[serde(serialize_with = "serialize_millis")]
    pub retry_after: Option<Duration>,
    /// Consecutive rate-limited responses from this server so far.
    pub consecutive: u32,
}

fn serialize_millis<S: serde::Serializer>(
    value: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
        None => serializer.serialize_none(),
    }
}

/// Aggregate of the search phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TriggerResults {
    /// Items in successful missing-category submissions.
    pub missing_triggered: usize,
    /// Items in successful cutoff-category submissions.
    pub cutoff_triggered: usize,
    pub failure_count: usize,
    pub results: Vec<TriggerResult>,
    pub rate_limits: Vec<RateLimitNotice>,
    pub dry_run: bool,
}

impl TriggerResults {
    pub fn from_results(
        results: Vec<TriggerResult>,
        rate_limits: Vec<RateLimitNotice>,
        dry_run: bool,
    ) -> Self {
        let mut aggregate = Self {
            dry_run,
            rate_limits,
            ..Default::default()
        };
        for result in &results {
            if !result.success {
                aggregate.failure_count += 1;
                continue;
            }
            match result.category.reason() {
                SearchReason::Missing => aggregate.missing_triggered += result.count,
                SearchReason::Cutoff => aggregate.cutoff_triggered += result.count,
            }
        }
        aggregate.results = results;
        aggregate
    }

    /// Items submitted (or planned, in dry-run) across every category.
    pub fn total_triggered(&self) -> usize {
        self.missing_triggered + self.cutoff_triggered
    }

    /// Items allocated for one category on one server, successful or not.
    pub fn allocated(&self, server_id: &str, category: SearchCategory) -> usize {
        self.results
            .iter()
            .filter(|r| r.server_id == server_id && r.category == category)
            .map(|r| r.count)
            .sum()
    }
}
