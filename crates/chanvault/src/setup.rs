//! Process wiring: database, storage, source client, and the three
//! background services, with a coordinated shutdown on ctrl-c.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use chanvault_core::Config;
use chanvault_db::{ChannelRepository, FileRepository, SessionRepository};
use chanvault_pipeline::{
    reset_stale_inflight, AuthFlow, AuthPhase, Scanner, ScannerConfig, Verifier, Worker,
    WorkerConfig,
};
use chanvault_source::GatewaySource;
use chanvault_storage::create_sink;

pub async fn run(config: Config) -> Result<()> {
    let pool = setup_database(&config).await?;

    let files = Arc::new(FileRepository::new(pool.clone()));
    let channels = Arc::new(ChannelRepository::new(pool.clone()));
    let sessions = Arc::new(SessionRepository::new(pool.clone()));

    let sink = create_sink(&config)
        .await
        .context("Failed to initialize object storage")?;

    let source = Arc::new(
        GatewaySource::new(config.gateway_url.clone(), config.gateway_token.clone())
            .context("Failed to build source gateway client")?,
    );

    let auth = Arc::new(AuthFlow::new(
        source.clone(),
        sessions.clone(),
        config.session_slot.clone(),
        config.source_phone.clone(),
    ));
    if !auth.restore().await? {
        tracing::warn!(
            "No valid credential session; the pipeline idles until the operator authenticates"
        );
        if auth.phase().await == AuthPhase::SignedOut && config.source_phone.is_some() {
            auth.request_code().await?;
            tracing::info!("Login code requested, submit it to resume");
        }
    }

    // Anything left in flight by the previous process goes back to the
    // queue before the worker starts.
    reset_stale_inflight(files.as_ref()).await?;

    tokio::fs::create_dir_all(&config.staging_dir)
        .await
        .with_context(|| format!("Failed to create staging dir {}", config.staging_dir))?;

    let scanner = Arc::new(Scanner::new(
        files.clone(),
        channels.clone(),
        source.clone(),
        auth.clone(),
        ScannerConfig {
            interval: config.scan_interval,
            page_size: config.scan_page_size,
            audio_bucket: config.audio_bucket.clone(),
            document_bucket: config.document_bucket.clone(),
        },
    ));

    let worker = Arc::new(Worker::new(
        files.clone(),
        sink.clone(),
        source.clone(),
        auth.clone(),
        WorkerConfig {
            poll_interval: config.worker_poll_interval,
            staging_dir: config.staging_dir.clone().into(),
            retry: config.retry,
        },
    ));

    let verifier = Arc::new(Verifier::new(
        files.clone(),
        sink.clone(),
        config.verify_interval,
    ));

    let (scanner_tx, scanner_rx) = mpsc::channel(1);
    let (worker_tx, worker_rx) = mpsc::channel(1);
    let (verifier_tx, verifier_rx) = mpsc::channel(1);

    let scanner_handle = tokio::spawn(scanner.run(scanner_rx));
    let worker_handle = tokio::spawn(worker.run(worker_rx));
    let verifier_handle = tokio::spawn(verifier.run(verifier_rx));

    tracing::info!("ChanVault pipeline running");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, stopping services");

    // The worker finishes its in-progress transfer before exiting.
    let _ = scanner_tx.send(()).await;
    let _ = worker_tx.send(()).await;
    let _ = verifier_tx.send(()).await;

    let _ = scanner_handle.await;
    let _ = worker_handle.await;
    let _ = verifier_handle.await;

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn setup_database(config: &Config) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    // Workspace migrations/ relative to this crate.
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
