//! Import Tagger - Main Entry Point
//! Queue worker: leases import-tag requests and tags the imported projects

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use import_tagger_core::application::{shutdown_channel, LifecycleEngine, QueueDriver};
use import_tagger_core::port::time_provider::SystemTimeProvider;
use import_tagger_infra_http::ProjectApiClient;
use import_tagger_infra_sqlite::{create_pool, run_migrations, SqliteQueue};
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (+ optional OpenTelemetry layer)
    let (otel_layer, telemetry_error) = match telemetry::init_telemetry() {
        Ok(layer) => (layer, None),
        Err(e) => (None, Some(e)),
    };
    init_logging(otel_layer)?;
    if let Some(e) = telemetry_error {
        warn!(error = %e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    info!("Import Tagger v{} starting...", VERSION);

    // 2. Load configuration
    let settings = Settings::from_env().context("Configuration error")?;
    info!(
        storage_account = %settings.storage_account_name,
        queue = %settings.queue_name,
        max_attempts = settings.engine.max_attempts,
        max_processing_secs = settings.engine.max_processing.as_secs(),
        "Configuration loaded"
    );

    // 3. Initialize queue store
    tokio::fs::create_dir_all(&settings.data_dir)
        .await
        .with_context(|| format!("Failed to create {}", settings.data_dir.display()))?;
    let db_path = settings.queue_db_path();
    info!(db_path = %db_path.display(), "Opening queue store...");

    let pool = create_pool(&db_path.to_string_lossy())
        .await
        .map_err(|e| anyhow::anyhow!("Queue store pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let queue = Arc::new(SqliteQueue::new(
        pool,
        settings.queue_name.clone(),
        settings.worker.visibility_timeout,
        time_provider,
    ));
    let api = Arc::new(
        ProjectApiClient::new(settings.api.clone())
            .map_err(|e| anyhow::anyhow!("API client setup failed: {}", e))?,
    );
    let engine = Arc::new(LifecycleEngine::new(api.clone(), api, settings.engine));

    // 5. Start queue driver
    info!("Starting queue driver...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let driver = QueueDriver::new(queue, engine, settings.worker);

    let driver_handle = tokio::spawn(async move {
        if let Err(e) = driver.run(shutdown_rx).await {
            error!(error = ?e, "Queue driver failed");
        }
    });

    info!("System ready. Waiting for messages...");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, driver_handle).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Queue driver did not stop in time; in-flight lease will expire"
        );
    }
    telemetry::shutdown_telemetry();

    info!("Shutdown complete.");

    Ok(())
}

/// JSON for production (`IMPORT_TAGGER_LOG_FORMAT=json`), pretty otherwise
fn init_logging(otel_layer: Option<telemetry::TelemetryLayer>) -> Result<()> {
    let log_format =
        std::env::var("IMPORT_TAGGER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("import_tagger=info"))
        .context("Failed to create env filter")?;

    let registry = tracing_subscriber::registry().with(otel_layer).with(env_filter);

    match log_format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init()?,
        _ => registry.with(fmt::layer().pretty()).try_init()?,
    }

    Ok(())
}
