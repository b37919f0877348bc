//! API tests driving the router in-process.

#[macro_use]
mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{fixtures, send, TestConfig, TestFixture, TestResponse};
use scoutarr_core::{ClientError, MediaKind, SearchLimits};

fn movie_servers() -> TestConfig {
    TestConfig {
        servers: vec![
            fixtures::server_config("a", MediaKind::MovieManager),
            fixtures::server_config("b", MediaKind::MovieManager),
            fixtures::server_config("c", MediaKind::MovieManager),
        ],
        limits: SearchLimits {
            missing_movies: 10,
            missing_episodes: 0,
            cutoff_movies: 0,
            cutoff_episodes: 0,
        },
        ..Default::default()
    }
}

// =============================================================================
// Health & Config
// =============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_config_hides_api_keys() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);

    let servers = response.body["servers"].as_array().unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0]["id"], "radarr");
    assert_eq!(servers[0]["api_key_configured"], true);
    assert!(!response.text.contains("radarr-key"));
    assert!(!response.text.contains("sonarr-key"));
}

// =============================================================================
// Scheduler
// =============================================================================

#[tokio::test]
async fn test_scheduler_status() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/scheduler/status").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "state", json!("idle"));
    assert_json_path!(response.body, "running", json!(true));
    assert_json_path!(response.body, "cycle_active", json!(false));
    assert_json_path!(response.body, "interval_secs", json!(900));
}

#[tokio::test]
async fn test_scheduler_stop_and_start() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/scheduler/stop").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "message", json!("Scheduler stopped"));
    assert_eq!(response.body["status"]["state"], "stopped");

    let response = fixture.post_empty("/api/v1/scheduler/stop").await;
    assert_json_path!(response.body, "message", json!("Scheduler already stopped"));

    let response = fixture.post_empty("/api/v1/scheduler/start").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "message", json!("Scheduler started"));
    assert_eq!(response.body["status"]["running"], true);

    let response = fixture.post_empty("/api/v1/scheduler/start").await;
    assert_json_path!(response.body, "message", json!("Scheduler already running"));
}

#[tokio::test]
async fn test_trigger_requires_running_scheduler() {
    let fixture = TestFixture::with_config(TestConfig {
        start_scheduler: false,
        ..Default::default()
    })
    .await;

    let response = fixture.post("/api/v1/cycles/trigger", json!({})).await;
    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
    assert_json_path!(response.body, "error", json!("scheduler is not running"));
}

#[tokio::test]
async fn test_scheduled_tick_runs_a_cycle() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    fixture.client.set_missing("a", fixtures::movies(1, 2)).await;

    fixture.timer_clock.wait_for_sleepers(1).await;
    fixture.timer_clock.advance(Duration::from_secs(900));

    for _ in 0..500 {
        let response = fixture.get("/api/v1/cycles/last").await;
        if response.status == StatusCode::OK {
            assert_json_path!(response.body, "manual", json!(false));
            assert_json_path!(response.body, "total_searches", json!(2));
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scheduled cycle never completed");
}

// =============================================================================
// Cycles
// =============================================================================

#[tokio::test]
async fn test_trigger_distributes_limit() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    fixture.client.set_missing("a", fixtures::movies(1, 90)).await;
    fixture.client.set_missing("b", fixtures::movies(1000, 10)).await;

    let response = fixture.post("/api/v1/cycles/trigger", json!({})).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "success", json!(true));
    assert_json_path!(response.body, "manual", json!(true));
    assert_json_path!(response.body, "dry_run", json!(false));
    assert_json_path!(response.body, "total_searches", json!(10));
    assert_json_path!(response.body, "total_failures", json!(0));

    let results = response.body["triggers"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["server_id"], "a");
    assert_eq!(results[0]["count"], 9);
    assert_eq!(results[0]["category"], "missing-movies");
    assert_eq!(results[1]["server_id"], "b");
    assert_eq!(results[1]["count"], 1);

    assert_eq!(fixture.client.recorded_searches().await.len(), 2);
}

#[tokio::test]
async fn test_trigger_dry_run_submits_nothing() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    fixture.client.set_missing("a", fixtures::movies(1, 90)).await;
    fixture.client.set_missing("b", fixtures::movies(1000, 10)).await;

    let response = fixture
        .post("/api/v1/cycles/trigger", json!({ "dry_run": true }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "dry_run", json!(true));
    assert_json_path!(response.body, "total_searches", json!(10));
    assert_eq!(response.body["triggers"]["dry_run"], true);

    assert!(fixture.client.recorded_searches().await.is_empty());
}

#[tokio::test]
async fn test_configured_dry_run_overrides_request() {
    let fixture = TestFixture::with_config(TestConfig {
        force_dry_run: true,
        ..movie_servers()
    })
    .await;
    fixture.client.set_missing("a", fixtures::movies(1, 3)).await;

    let response = fixture
        .post("/api/v1/cycles/trigger", json!({ "dry_run": false }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "dry_run", json!(true));
    assert!(fixture.client.recorded_searches().await.is_empty());
}

#[tokio::test]
async fn test_trigger_accepts_empty_body() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_empty("/api/v1/cycles/trigger").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total_searches", json!(0));
    assert_json_path!(response.body, "success", json!(true));
}

#[tokio::test]
async fn test_trigger_rejects_malformed_body() {
    let fixture = TestFixture::new().await;

    let response = fixture.post_raw("/api/v1/cycles/trigger", "{not json").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request body"));
}

#[tokio::test]
async fn test_unreachable_server_degrades_cycle() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    fixture.client.set_missing("a", fixtures::movies(1, 4)).await;
    fixture
        .client
        .fail_lists("b", ClientError::Connection("connection refused".to_string()))
        .await;
    fixture.client.set_missing("c", fixtures::movies(500, 2)).await;

    let response = fixture.post("/api/v1/cycles/trigger", json!({})).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "success", json!(true));
    assert_json_path!(response.body, "degraded", json!(true));
    assert_json_path!(response.body, "total_searches", json!(6));
    assert_eq!(response.body["detection"]["failure_count"], 1);
    assert_eq!(response.body["detection"]["success_count"], 2);
    assert_eq!(response.body["errors"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_last_cycle() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/cycles/last").await;
    assert_status!(response, StatusCode::NOT_FOUND);

    let triggered = fixture.post_empty("/api/v1/cycles/trigger").await;
    assert_status!(triggered, StatusCode::OK);

    let response = fixture.get("/api/v1/cycles/last").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cycle_id"], triggered.body["cycle_id"]);
}

#[tokio::test]
async fn test_second_queued_trigger_is_busy() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    fixture.client.hang_lists("a").await;

    let first = tokio::spawn(send(
        fixture.router.clone(),
        "POST",
        "/api/v1/cycles/trigger",
        Some(json!({})),
    ));
    fixture.wait_for_status(|s| s.cycle_active).await;

    let queued = tokio::spawn(send(
        fixture.router.clone(),
        "POST",
        "/api/v1/cycles/trigger",
        Some(json!({})),
    ));
    fixture.wait_for_status(|s| s.manual_queued).await;

    let response = fixture.post("/api/v1/cycles/trigger", json!({})).await;
    assert_status!(response, StatusCode::CONFLICT);

    // Shutdown aborts the active cycle; the queued one then aborts at once
    fixture.shutdown.cancel();

    let first = first.await.unwrap();
    assert_status!(first, StatusCode::SERVICE_UNAVAILABLE);
    assert_json_path!(first.body, "aborted", json!(true));
    assert_eq!(first.body["result"]["success"], false);

    let queued = queued.await.unwrap();
    assert_status!(queued, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_stop_discards_queued_trigger() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    fixture.client.hang_lists("a").await;

    let first = tokio::spawn(send(
        fixture.router.clone(),
        "POST",
        "/api/v1/cycles/trigger",
        Some(json!({})),
    ));
    fixture.wait_for_status(|s| s.cycle_active).await;

    let queued = tokio::spawn(send(
        fixture.router.clone(),
        "POST",
        "/api/v1/cycles/trigger",
        Some(json!({})),
    ));
    fixture.wait_for_status(|s| s.manual_queued).await;

    let response = fixture.post_empty("/api/v1/scheduler/stop").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["status"]["state"], "cycle_active");

    let queued = queued.await.unwrap();
    assert_status!(queued, StatusCode::SERVICE_UNAVAILABLE);
    assert_json_path!(
        queued.body,
        "error",
        json!("queued manual cycle was cancelled")
    );

    fixture.shutdown.cancel();
    let first = first.await.unwrap();
    assert_status!(first, StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Audit & Metrics
// =============================================================================

/// Poll `path` until `done` holds; audit records are persisted asynchronously.
async fn poll_until(
    fixture: &TestFixture,
    path: &str,
    done: impl Fn(&Value) -> bool,
) -> TestResponse {
    let mut response = fixture.get(path).await;
    for _ in 0..200 {
        if done(&response.body) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        response = fixture.get(path).await;
    }
    response
}

/// Trigger a cycle where only `a` has wanted items and return its id.
async fn run_single_search_cycle(fixture: &TestFixture) -> String {
    fixture.client.set_missing("a", fixtures::movies(1, 3)).await;
    let triggered = fixture.post("/api/v1/cycles/trigger", json!({})).await;
    assert_status!(triggered, StatusCode::OK);
    triggered.body["cycle_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_audit_query_by_cycle() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    let cycle_id = run_single_search_cycle(&fixture).await;

    // started, 3 detections, 1 search, completed
    let path = format!("/api/v1/audit?cycle_id={}", cycle_id);
    let response = poll_until(&fixture, &path, |body| body["total"] == 6).await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "total", json!(6));

    // Newest first
    let events = response.body["events"].as_array().unwrap();
    assert_eq!(events[0]["event_type"], "cycle_completed");
    assert_eq!(events[5]["event_type"], "cycle_started");

    let response = fixture
        .get(&format!(
            "/api/v1/audit?cycle_id={}&event_type=search_triggered",
            cycle_id
        ))
        .await;
    assert_json_path!(response.body, "total", json!(1));
    assert_eq!(response.body["events"][0]["server_id"], "a");
    assert_eq!(response.body["events"][0]["data"]["count"], 3);
}

#[tokio::test]
async fn test_audit_query_by_category() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    let cycle_id = run_single_search_cycle(&fixture).await;

    let path = format!("/api/v1/audit?cycle_id={}&category=missing-movies", cycle_id);
    let response = poll_until(&fixture, &path, |body| body["total"] == 1).await;
    assert_json_path!(response.body, "total", json!(1));
    assert_eq!(response.body["events"][0]["category"], "missing-movies");

    let response = fixture
        .get(&format!("/api/v1/audit?cycle_id={}&category=cutoff-movies", cycle_id))
        .await;
    assert_json_path!(response.body, "total", json!(0));

    let response = fixture.get("/api/v1/audit?category=everything").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cycle_history_lists_finished_cycles() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    let cycle_id = run_single_search_cycle(&fixture).await;

    let response = poll_until(&fixture, "/api/v1/cycles", |body| {
        body["cycles"].as_array().is_some_and(|c| !c.is_empty())
    })
    .await;
    assert_status!(response, StatusCode::OK);

    let cycles = response.body["cycles"].as_array().unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0]["cycle_id"], cycle_id.as_str());
    assert_eq!(cycles[0]["outcome"], "success");
    assert_eq!(cycles[0]["total_searches"], 3);
    assert_eq!(cycles[0]["total_failures"], 0);
}

#[tokio::test]
async fn test_cycle_timeline_is_chronological() {
    let fixture = TestFixture::with_config(movie_servers()).await;
    fixture
        .client
        .fail_lists("c", ClientError::Connection("connection refused".to_string()))
        .await;
    let cycle_id = run_single_search_cycle(&fixture).await;

    let path = format!("/api/v1/cycles/{}/events", cycle_id);
    let response = poll_until(&fixture, &path, |body| !body["summary"].is_null()).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["cycle_id"], cycle_id.as_str());

    let events = response.body["events"].as_array().unwrap();
    assert_eq!(events.len(), 6);
    assert_eq!(events[0]["event_type"], "cycle_started");
    assert_eq!(events[5]["event_type"], "cycle_completed");
    assert!(events
        .iter()
        .any(|e| e["event_type"] == "detection_failed" && e["server_id"] == "c"));

    assert_eq!(response.body["summary"]["outcome"], "degraded");
}

#[tokio::test]
async fn test_cycle_timeline_unknown_cycle() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/cycles/no-such-cycle/events").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_audit_limit_is_capped() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/audit?limit=5000&offset=-3").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "limit", json!(1000));
    assert_json_path!(response.body, "offset", json!(0));
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let response = fixture.get("/metrics").await;
    assert_status!(response, StatusCode::OK);
    assert!(response.text.contains("scoutarr_scheduler_running 1"));
    assert!(response.text.contains("scoutarr_http_requests_total"));
}
