//! Dealer Import Worker - bulk import of bookings, enquiries and quotations
//!
//! This worker connects to NATS and handles import requests from the frontend.

mod auth;
mod cli;
mod config;
mod defaults;
mod db;
mod handlers;
mod services;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::cli::{Cli, Command};
use crate::config::{Config, ImportConfig, QueueBackend};
use crate::db::{ImportStore, MemoryStore, PgImportStore};
use crate::services::import_processor::{ImportProcessor, ImportTask, Upload};
use crate::services::job_queue::{InProcessQueue, JetStreamNames, JetStreamQueue, JobQueue};
use crate::types::{ImportKind, ImportSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dealer_import_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Migrate => {
            let config = Config::from_env()?;
            let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
            db::run_migrations(&pool).await
        }
        Command::Import {
            file,
            kind,
            dealership,
            user,
            batch_size,
        } => import_offline(&file, kind, dealership, user, batch_size).await,
        Command::Preview { file, kind } => preview_offline(&file, kind).await,
    }
}

async fn serve() -> Result<()> {
    info!("Starting Dealer Import Worker...");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    info!("Connected to PostgreSQL");

    // Run migrations
    db::run_migrations(&pool).await?;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (std::env::var("NATS_USER"), std::env::var("NATS_PASSWORD")) {
        (Ok(user), Ok(password)) if !user.is_empty() => {
            async_nats::ConnectOptions::new()
                .user_and_password(user, password)
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let queue: Arc<dyn JobQueue<ImportTask>> = match config.import.queue_backend {
        QueueBackend::Memory => Arc::new(InProcessQueue::new(config.import.workers)),
        QueueBackend::JetStream => {
            let names = JetStreamNames {
                stream: "DEALER_IMPORT_JOBS".to_string(),
                consumer: "dealer_import_workers".to_string(),
                subject: "dealer.jobs.import".to_string(),
                status_prefix: "dealer.job.import.status".to_string(),
            };
            Arc::new(JetStreamQueue::new(nats_client.clone(), names, config.import.workers).await?)
        }
    };
    info!(
        "Import queue: {:?} with {} workers",
        config.import.queue_backend, config.import.workers
    );

    let store: Arc<dyn ImportStore> = Arc::new(PgImportStore::new(pool));
    let processor = ImportProcessor::new(store, queue, config.import.clone());
    processor.start().await?;

    // Start message handlers
    let handler_result = handlers::start_handlers(nats_client, processor, &config).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Processor over an in-memory store, for runs without PostgreSQL or NATS
async fn offline_processor(config: ImportConfig) -> Result<Arc<ImportProcessor>> {
    let store: Arc<dyn ImportStore> = Arc::new(MemoryStore::new());
    let queue: Arc<dyn JobQueue<ImportTask>> = Arc::new(InProcessQueue::new(config.workers));
    let processor = ImportProcessor::new(store, queue, config);
    processor.start().await?;
    Ok(processor)
}

fn offline_config() -> Result<ImportConfig> {
    Ok(ImportConfig {
        upload_dir: std::env::temp_dir().join("dealer-import-uploads"),
        queue_backend: QueueBackend::Memory,
        wait_for_completion: true,
        ..ImportConfig::from_env()?
    })
}

fn read_upload(file: &Path, kind: ImportKind, settings: ImportSettings) -> Result<Upload> {
    let content = std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .context("file path has no file name")?
        .to_string();
    Ok(Upload {
        kind,
        filename,
        content,
        settings,
    })
}

async fn import_offline(
    file: &Path,
    kind: ImportKind,
    dealership: Option<Uuid>,
    user: Option<Uuid>,
    batch_size: Option<usize>,
) -> Result<()> {
    let processor = offline_processor(offline_config()?).await?;
    let auth = AuthContext {
        user_id: user.unwrap_or_else(Uuid::new_v4),
        dealership_id: dealership.unwrap_or_else(Uuid::new_v4),
        role: "admin".to_string(),
    };
    let settings = ImportSettings {
        batch_size,
        ..ImportSettings::default()
    };

    let summary = processor
        .submit(&auth, read_upload(file, kind, settings)?)
        .await?;
    let detail = processor
        .get_job(&auth, summary.job_id, 1, 500)
        .await?;

    let output = serde_json::json!({
        "summary": summary,
        "errorSummary": detail.job.error_summary,
        "errors": detail.errors,
        "totalErrors": detail.total_errors,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn preview_offline(file: &Path, kind: ImportKind) -> Result<()> {
    let processor = offline_processor(offline_config()?).await?;
    let preview = processor
        .preview(read_upload(file, kind, ImportSettings::default())?)
        .await?;
    println!("{}", serde_json::to_string_pretty(&preview)?);
    Ok(())
}
