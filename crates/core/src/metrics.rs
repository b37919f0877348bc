//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Cycles (runs, outcome, duration)
//! - Detection (wanted items per server, failures)
//! - Search submission (commands, items, rate limits)
//! - Remote media manager requests

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts};

// =============================================================================
// Cycle Metrics
// =============================================================================

/// Cycles run total by trigger and outcome.
pub static CYCLES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scoutarr_cycles_total", "Total automation cycles"),
        &["trigger", "result"], // trigger: "scheduled", "manual"; result: "success", "degraded", "failed", "aborted"
    )
    .unwrap()
});

/// Cycle duration in seconds.
pub static CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("scoutarr_cycle_duration_seconds", "Duration of automation cycles")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["trigger"],
    )
    .unwrap()
});

// =============================================================================
// Detection Metrics
// =============================================================================

/// Wanted items reported by each server in the latest cycle.
pub static WANTED_ITEMS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "scoutarr_wanted_items",
            "Wanted items per server at the last detection",
        ),
        &["server", "reason"], // reason: "missing", "cutoff"
    )
    .unwrap()
});

/// Per-server detection failures total.
pub static DETECTION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "scoutarr_detection_failures_total",
            "Total servers that failed detection",
        ),
        &["server"],
    )
    .unwrap()
});

// =============================================================================
// Search Submission Metrics
// =============================================================================

/// Search commands by category and status.
pub static SEARCH_COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scoutarr_search_commands_total", "Total search commands"),
        &["category", "status"], // status: "success", "failed", "dry_run"
    )
    .unwrap()
});

/// Items included in accepted search commands.
pub static ITEMS_SEARCHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scoutarr_items_searched_total", "Total items submitted for search"),
        &["category"],
    )
    .unwrap()
});

/// Rate-limited responses by server.
pub static RATE_LIMITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "scoutarr_rate_limits_total",
            "Total rate-limited responses from media managers",
        ),
        &["server"],
    )
    .unwrap()
});

// =============================================================================
// Remote Request Metrics
// =============================================================================

/// Remote request duration.
pub static REMOTE_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "scoutarr_remote_request_duration_seconds",
            "Duration of media manager API calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Cycles
        Box::new(CYCLES_TOTAL.clone()),
        Box::new(CYCLE_DURATION.clone()),
        // Detection
        Box::new(WANTED_ITEMS.clone()),
        Box::new(DETECTION_FAILURES.clone()),
        // Submission
        Box::new(SEARCH_COMMANDS.clone()),
        Box::new(ITEMS_SEARCHED.clone()),
        Box::new(RATE_LIMITS.clone()),
        // Remote
        Box::new(REMOTE_REQUEST_DURATION.clone()),
    ]
}
