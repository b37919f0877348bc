//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the full router in-process
//! with a mock media manager client injected, so cycles can be triggered
//! through HTTP without real servers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use scoutarr_core::{
    config::{MediaServerConfig, TriggerConfig},
    create_audit_system, load_config_from_str,
    testing::{ManualClock, MockMediaClient},
    AuditStore, Automation, Config, MemoryConfigStore, Scheduler, SearchLimits,
    SqliteAuditStore,
};
use scoutarr_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use scoutarr_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_trigger() {
///     let fixture = TestFixture::new().await;
///     fixture.client.set_missing("radarr", fixtures::movies(1, 3)).await;
///
///     let response = fixture.post("/api/v1/cycles/trigger", json!({})).await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock media manager - configure wanted items and search responses
    pub client: Arc<MockMediaClient>,
    /// Scheduler behind the router; its timer only fires when `timer_clock` is advanced
    pub scheduler: Scheduler,
    pub timer_clock: Arc<ManualClock>,
    pub audit_store: Arc<dyn AuditStore>,
    /// Cancels in-flight cycles
    pub shutdown: CancellationToken,
    /// Temporary directory for the audit database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub servers: Vec<MediaServerConfig>,
    pub limits: SearchLimits,
    /// Start the scheduler before returning the fixture
    pub start_scheduler: bool,
    /// Force every cycle into dry-run
    pub force_dry_run: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                fixtures::server_config("radarr", scoutarr_core::MediaKind::MovieManager),
                fixtures::server_config("sonarr", scoutarr_core::MediaKind::EpisodeManager),
            ],
            limits: fixtures::uniform_limits(10),
            start_scheduler: true,
            force_dry_run: false,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config: Config = load_config_from_str(&format!(
            r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
path = "{}"

[automation]
dry_run = {}
"#,
            db_path.display(),
            test_config.force_dry_run
        ))
        .expect("Failed to build config");
        config.servers = test_config.servers.clone();
        config.limits = test_config.limits;

        // Create audit system
        let audit_store: Arc<dyn AuditStore> =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));
        let (audit_handle, audit_writer) = create_audit_system(Arc::clone(&audit_store), 100);
        tokio::spawn(audit_writer.run());

        let client = Arc::new(MockMediaClient::new());
        let config_store = Arc::new(MemoryConfigStore::new(
            test_config.servers,
            test_config.limits,
        ));
        let shutdown = CancellationToken::new();

        // Pacing and backoff sleeps return at once
        let automation = Arc::new(
            Automation::new(
                config_store,
                client.clone(),
                Arc::new(ManualClock::auto_advance()),
                TriggerConfig::default(),
                &config.automation,
            )
            .with_audit(audit_handle.clone())
            .with_shutdown(shutdown.clone()),
        );

        let timer_clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::new(
            automation.clone(),
            timer_clock.clone(),
            Duration::from_secs(config.scheduler.interval_secs),
            Some(audit_handle),
        );
        if test_config.start_scheduler {
            scheduler.start();
        }

        let state = Arc::new(AppState::new(
            config,
            automation,
            scheduler.clone(),
            Arc::clone(&audit_store),
        ));

        Self {
            router: create_router(state),
            client,
            scheduler,
            timer_clock,
            audit_store,
            shutdown,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        send(self.router.clone(), "GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        send(self.router.clone(), "POST", path, Some(body)).await
    }

    /// Send a POST request with no body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        send(self.router.clone(), "POST", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        execute(self.router.clone(), request).await
    }

    /// Poll until the scheduler reports the given predicate.
    pub async fn wait_for_status(&self, check: impl Fn(&scoutarr_core::SchedulerStatus) -> bool) {
        for _ in 0..500 {
            if check(&self.scheduler.status()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("scheduler never reached the expected status");
    }
}

/// Send a request to a router. Usable from spawned tasks.
pub async fn send(router: Router, method: &str, path: &str, body: Option<Value>) -> TestResponse {
    let mut request_builder = Request::builder().method(method).uri(path);

    let body = if let Some(json_body) = body {
        request_builder = request_builder.header("Content-Type", "application/json");
        Body::from(serde_json::to_vec(&json_body).unwrap())
    } else {
        Body::empty()
    };

    execute(router, request_builder.body(body).unwrap()).await
}

async fn execute(router: Router, request: Request<Body>) -> TestResponse {
    let response = router
        .oneshot(request)
        .await
        .expect("Failed to send request");

    let status = response.status();
    let body_bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes();

    let text = String::from_utf8_lossy(&body_bytes).into_owned();
    let body: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    TestResponse { status, body, text }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
