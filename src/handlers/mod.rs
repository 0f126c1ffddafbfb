//! NATS message handlers

pub mod import;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tracing::{error, info};

use crate::config::Config;
use crate::services::import_processor::ImportProcessor;

/// Subscribe to every import subject and serve until one loop ends
pub async fn start_handlers(
    client: Client,
    processor: Arc<ImportProcessor>,
    config: &Config,
) -> Result<()> {
    info!("Starting message handlers...");

    let jwt_secret = Arc::new(config.jwt_secret.clone());

    let submit_sub = client.subscribe("dealer.import.submit").await?;
    let preview_sub = client.subscribe("dealer.import.preview").await?;
    let job_get_sub = client.subscribe("dealer.import.job.get").await?;
    let errors_download_sub = client.subscribe("dealer.import.errors.download").await?;
    let cancel_sub = client.subscribe("dealer.import.cancel").await?;
    let queue_list_sub = client.subscribe("dealer.import.queue.list").await?;

    info!("Subscribed to dealer.import.* subjects");

    let submit_handle = tokio::spawn(import::handle_submit(
        client.clone(),
        submit_sub,
        jwt_secret.clone(),
        processor.clone(),
    ));
    let preview_handle = tokio::spawn(import::handle_preview(
        client.clone(),
        preview_sub,
        jwt_secret.clone(),
        processor.clone(),
    ));
    let job_get_handle = tokio::spawn(import::handle_get_job(
        client.clone(),
        job_get_sub,
        jwt_secret.clone(),
        processor.clone(),
    ));
    let errors_download_handle = tokio::spawn(import::handle_download_errors(
        client.clone(),
        errors_download_sub,
        jwt_secret.clone(),
        processor.clone(),
    ));
    let cancel_handle = tokio::spawn(import::handle_cancel(
        client.clone(),
        cancel_sub,
        jwt_secret.clone(),
        processor.clone(),
    ));
    let queue_list_handle = tokio::spawn(import::handle_queue_list(
        client,
        queue_list_sub,
        jwt_secret,
        processor,
    ));

    info!("All handlers started, waiting for messages...");

    select! {
        result = submit_handle => {
            error!("Import submit handler finished: {:?}", result);
        }
        result = preview_handle => {
            error!("Import preview handler finished: {:?}", result);
        }
        result = job_get_handle => {
            error!("Import job get handler finished: {:?}", result);
        }
        result = errors_download_handle => {
            error!("Import errors download handler finished: {:?}", result);
        }
        result = cancel_handle => {
            error!("Import cancel handler finished: {:?}", result);
        }
        result = queue_list_handle => {
            error!("Import queue list handler finished: {:?}", result);
        }
    }

    Ok(())
}
