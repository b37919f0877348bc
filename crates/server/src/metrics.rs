//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Scoutarr server:
//! - HTTP request metrics (latency, counts, errors)
//! - Scheduler status (collected dynamically)
//! - Core cycle, detection and submission metrics (registered from `scoutarr_core`)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "scoutarr_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("scoutarr_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "scoutarr_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Scheduler Metrics (collected dynamically)
// =============================================================================

/// Scheduler running state (1 = running, 0 = stopped).
pub static SCHEDULER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "scoutarr_scheduler_running",
        "Whether the scheduler timer is armed (1) or stopped (0)",
    )
    .unwrap()
});

/// Cycle in progress (1) or not (0).
pub static SCHEDULER_CYCLE_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "scoutarr_scheduler_cycle_active",
        "Whether a cycle is currently executing",
    )
    .unwrap()
});

/// Manual request waiting behind the active cycle.
pub static SCHEDULER_MANUAL_QUEUED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "scoutarr_scheduler_manual_queued",
        "Whether a manual cycle is queued",
    )
    .unwrap()
});

static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static NUMERIC_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").unwrap());

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Scheduler
    registry
        .register(Box::new(SCHEDULER_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_CYCLE_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(SCHEDULER_MANUAL_QUEUED.clone()))
        .unwrap();

    // Core metrics (cycles, detection, submission, remote calls)
    for metric in scoutarr_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Update gauges from the current scheduler snapshot.
///
/// Called before encoding; never blocks on a running cycle.
pub fn collect_dynamic_metrics(state: &AppState) {
    let status = state.scheduler().status();
    SCHEDULER_RUNNING.set(status.running as i64);
    SCHEDULER_CYCLE_ACTIVE.set(status.cycle_active as i64);
    SCHEDULER_MANUAL_QUEUED.set(status.manual_queued as i64);
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_REGEX.replace_all(path, "{id}");
    let result = NUMERIC_REGEX.replace_all(&result, "/{id}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/cycles/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/cycles/{id}");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/servers/12345";
        assert_eq!(normalize_path(path), "/api/v1/servers/{id}");
    }

    #[test]
    fn test_normalize_path_numeric_middle() {
        let path = "/api/v1/servers/12/items/3";
        assert_eq!(normalize_path(path), "/api/v1/servers/{id}/items/{id}");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("scoutarr_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_server_and_core_metrics() {
        // Vec metrics only appear once a label set has been touched
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        scoutarr_core::metrics::CYCLES_TOTAL
            .with_label_values(&["manual", "success"])
            .inc();
        SCHEDULER_RUNNING.set(1);

        let output = encode_metrics().unwrap();

        assert!(output.contains("scoutarr_http_request_duration_seconds"));
        assert!(output.contains("scoutarr_http_requests_in_flight"));
        assert!(output.contains("scoutarr_scheduler_running"));
        assert!(output.contains("scoutarr_scheduler_cycle_active"));
        assert!(output.contains("scoutarr_cycles_total"));
    }
}
