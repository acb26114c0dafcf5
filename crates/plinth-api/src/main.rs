//! plinth-api - HTTP API server for the plinth content backend

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plinth_api::config::AppConfig;
use plinth_api::email::{build_mailer, EmailService};
use plinth_api::handlers::{
    MediaCleanupHandler, SearchIndexHandler, SearchReindexHandler, SearchRemoveHandler,
    SendEmailHandler,
};
use plinth_api::services::Services;
use plinth_api::{build_rate_limiter, build_router, AppState};
use plinth_db::{Database, FilesystemBackend, PoolConfig};
use plinth_jobs::{JobWorker, WorkerConfig, WorkerEvent};
use plinth_search::{HybridSearchEngine, SearchConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "plinth_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "plinth_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("plinth-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = Arc::new(AppConfig::from_env());
    info!(
        "Rate limiting: {} ({} requests per {} seconds)",
        if config.rate_limit_enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.rate_limit_requests,
        config.rate_limit_period_secs
    );

    // Connect to database
    info!("Connecting to database...");
    let pool_config = PoolConfig::from_env().max_connections(config.db_max_connections);
    let db = Database::connect_with_config(&config.database_url, pool_config).await?;
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Initialize file storage
    let storage = FilesystemBackend::new(&config.file_storage_path);
    storage.validate().await?;
    let db = db.with_file_storage(storage);
    info!("File storage initialized at {}", config.file_storage_path);

    // Search: engine when configured, SQL fallback always
    let search = HybridSearchEngine::new(db.clone(), SearchConfig::from_env().build_index()?);
    match search.engine_status().await {
        None => info!("No search engine configured, using SQL search"),
        Some(true) => info!("Search engine available"),
        Some(false) => warn!("Search engine unreachable, falling back to SQL search until it recovers"),
    }

    // Email
    let mailer = build_mailer(&config.email)?;
    let email = EmailService::new(mailer.clone(), db.clone(), config.public_base_url.clone());

    // Create and start job worker
    let worker_config = WorkerConfig::from_env();
    let worker_handle = if worker_config.enabled {
        info!("Starting job worker...");
        let worker = JobWorker::new(db.clone(), worker_config);
        worker
            .register_handler(SendEmailHandler::new(mailer.clone()))
            .await;
        worker
            .register_handler(SearchIndexHandler::new(search.clone()))
            .await;
        worker
            .register_handler(SearchRemoveHandler::new(search.clone()))
            .await;
        worker
            .register_handler(SearchReindexHandler::new(search.clone()))
            .await;
        worker
            .register_handler(MediaCleanupHandler::new(db.clone()))
            .await;

        let handle = worker.start();
        tokio::spawn(log_worker_events(handle.events()));
        info!("Job worker started");
        Some(handle)
    } else {
        info!("Job worker disabled");
        None
    };

    // Create app state
    let services = Arc::new(Services::new(db.clone(), search.clone(), email, &config));
    let state = AppState {
        db,
        services,
        search,
        rate_limiter: build_rate_limiter(&config),
        config: config.clone(),
    };

    let app = build_router(state);

    // Start server
    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = worker_handle {
        info!("Stopping job worker...");
        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Job worker did not acknowledge shutdown");
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Mirror worker events into the log.
async fn log_worker_events(mut events: broadcast::Receiver<WorkerEvent>) {
    loop {
        match events.recv().await {
            Ok(WorkerEvent::JobStarted { job_id, job_type }) => {
                debug!(%job_id, %job_type, "Job started");
            }
            Ok(WorkerEvent::JobCompleted { job_id, job_type }) => {
                debug!(%job_id, %job_type, "Job completed");
            }
            Ok(WorkerEvent::JobFailed {
                job_id,
                job_type,
                error,
                will_retry,
            }) => {
                warn!(%job_id, %job_type, will_retry, error = %error, "Job failed");
            }
            Ok(WorkerEvent::WorkerStarted) => debug!("Worker started"),
            Ok(WorkerEvent::WorkerStopped) => {
                debug!("Worker stopped");
                break;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Worker event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
