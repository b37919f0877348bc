use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scoutarr_core::{
    create_audit_system, load_config, validate_config, ArrClient, AuditEvent, AuditStore,
    Automation, MediaManagerClient, MemoryConfigStore, Scheduler, SqliteAuditStore, SystemClock,
};

use scoutarr_server::api::create_router;
use scoutarr_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

/// How long shutdown waits for an in-flight cycle to wind down
const CYCLE_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("SCOUTARR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!(
        "Media servers: {} configured, {} enabled",
        config.servers.len(),
        config.servers.iter().filter(|s| s.enabled).count()
    );
    if config.automation.dry_run {
        warn!("Dry-run forced by configuration: no searches will be submitted");
    }

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Emit ServiceStarted event
    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;

    // Engine
    let config_store = Arc::new(MemoryConfigStore::from_config(&config));
    let client: Arc<dyn MediaManagerClient> =
        Arc::new(ArrClient::new(&config.remote).context("Failed to create media manager client")?);
    let clock = Arc::new(SystemClock);
    let shutdown = CancellationToken::new();

    let automation = Arc::new(
        Automation::new(
            config_store,
            client,
            clock.clone(),
            config.trigger.clone(),
            &config.automation,
        )
        .with_audit(audit_handle.clone())
        .with_shutdown(shutdown.clone()),
    );

    let scheduler = Scheduler::new(
        automation.clone(),
        clock,
        Duration::from_secs(config.scheduler.interval_secs),
        Some(audit_handle.clone()),
    );

    if config.scheduler.enabled {
        scheduler.start();
    } else {
        info!("Scheduler disabled in config; start it through the API");
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        automation,
        scheduler.clone(),
        audit_store,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Stop cycles as soon as the signal arrives: open trigger requests are
    // waiting on the in-flight cycle and serve only returns once they answer.
    let stop_engine = {
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping scheduler...");
            scheduler.stop();
            shutdown.cancel();
        }
    };

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(stop_engine)
        .await
        .context("Server error")?;

    // Serve can also end on its own; make sure nothing is left running
    scheduler.stop();
    shutdown.cancel();
    if tokio::time::timeout(CYCLE_SHUTDOWN_TIMEOUT, scheduler.wait_for_idle())
        .await
        .is_err()
    {
        warn!(
            "In-flight cycle did not finish within {}s",
            CYCLE_SHUTDOWN_TIMEOUT.as_secs()
        );
    }
    info!("Scheduler stopped");

    // Emit ServiceStopped event
    info!("Server shutting down...");
    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop all holders of AuditHandle so the writer's channel closes.
    // The scheduler owns the automation, which holds its own clone.
    drop(scheduler);
    drop(audit_handle);

    // Wait for writer to finish processing remaining events
    if tokio::time::timeout(Duration::from_secs(5), writer_handle)
        .await
        .is_err()
    {
        warn!("Audit writer did not drain in time");
    }
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
