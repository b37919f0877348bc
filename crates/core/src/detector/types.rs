//! Types for the detector.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::remote::{MediaItem, MediaKind, SearchReason, Server};

/// Errors that abort a whole detection pass.
///
/// Per-server failures never surface here; they live in [`DetectionResult::error`].
#[derive(Debug, Error)]
pub enum DetectError {
    /// The server list could not be read.
    #[error("configuration unavailable: {0}")]
    Config(#[from] ConfigError),

    /// Cancelled before every server answered.
    #[error("detection aborted")]
    Aborted,
}

impl DetectError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Outcome of detection for one server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Connection details used for the search phase.
    #[serde(skip)]
    pub server: Server,
    pub server_id: String,
    pub server_name: String,
    pub kind: MediaKind,
    /// Missing items in the order the server reported them.
    pub missing: Vec<MediaItem>,
    /// Cutoff-unmet items in the order the server reported them.
    pub cutoff_unmet: Vec<MediaItem>,
    /// Set when either list query failed; both lists are then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectionResult {
    pub fn success(server: &Server, missing: Vec<MediaItem>, cutoff_unmet: Vec<MediaItem>) -> Self {
        Self {
            server: server.clone(),
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            kind: server.kind,
            missing,
            cutoff_unmet,
            error: None,
        }
    }

    pub fn failure(server: &Server, error: String) -> Self {
        Self {
            server: server.clone(),
            server_id: server.id.clone(),
            server_name: server.name.clone(),
            kind: server.kind,
            missing: Vec::new(),
            cutoff_unmet: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Items wanted for the given reason.
    pub fn items(&self, reason: SearchReason) -> &[MediaItem] {
        match reason {
            SearchReason::Missing => &self.missing,
            SearchReason::Cutoff => &self.cutoff_unmet,
        }
    }
}

/// Aggregate of one detection pass, in server-list order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionResults {
    pub total_missing: usize,
    pub total_cutoff: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<DetectionResult>,
}

impl DetectionResults {
    /// Aggregate per-server results, keeping their order.
    pub fn from_results(results: Vec<DetectionResult>) -> Self {
        let mut aggregate = Self::default();
        for result in &results {
            if result.is_success() {
                aggregate.success_count += 1;
                aggregate.total_missing += result.missing.len();
                aggregate.total_cutoff += result.cutoff_unmet.len();
            } else {
                aggregate.failure_count += 1;
            }
        }
        aggregate.results = results;
        aggregate
    }

    /// Results whose detection failed.
    pub fn failures(&self) -> impl Iterator<Item = &DetectionResult> {
        self.results.iter().filter(|r| !r.is_success())
    }
}
