//! Import job processor
//!
//! Orchestrates one upload end to end:
//! submit -> job PENDING -> enqueue -> parse -> validate -> resolve ->
//! persist in batches -> COMPLETED | FAILED -> uploaded file removed.
//!
//! Also serves previews (parse and validate only), job status with paged
//! errors, error-report downloads, cancellation and queue introspection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use chrono::{NaiveDate, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::batch_persister::{BatchPersister, PersistContext};
use super::error_log::{ErrorLog, ExportError};
use super::file_parser::{apply_column_mapping, ParseError, RowReader};
use super::job_queue::{JobFn, JobQueue, ProgressReporter, QueueError, QueueJobRecord, QueuePayload, QueueState};
use super::reference_resolver::ReferenceResolver;
use super::row_validator::RowValidator;
use crate::auth::AuthContext;
use crate::config::ImportConfig;
use crate::db::{ImportStore, StoreError};
use crate::types::{
    CancelImportResponse, DownloadErrorsResponse, FileType, ImportJob, ImportJobDetailResponse,
    ImportJobStatus, ImportKind, ImportSettings, ImportSummary, JobErrorSummary, NewImportError,
    NewImportJob, PreviewError, PreviewResponse, SubmitImportRequest, SummaryKind, ValidatedRow,
};

/// Job-level failure
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("file is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("file content is not valid base64")]
    InvalidEncoding,
    #[error("import job {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Cancel(#[from] CancelError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(String),
}

impl ImportError {
    /// Stable code for error replies
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            ImportError::UnsupportedFileType(_) => "UNSUPPORTED_FILE_TYPE",
            ImportError::InvalidEncoding => "INVALID_REQUEST",
            ImportError::NotFound(_) => "NOT_FOUND",
            ImportError::Cancel(CancelError::NotOwner) => "FORBIDDEN",
            ImportError::Cancel(CancelError::NotPending(_)) => "CONFLICT",
            ImportError::Parse(_) => "PARSE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CancelError {
    #[error("only the user who submitted the import can cancel it")]
    NotOwner,
    #[error("import job is {} and can no longer be cancelled", .0.as_str())]
    NotPending(ImportJobStatus),
}

/// Queue payload of one import job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTask {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub dealership_id: Uuid,
}

impl QueuePayload for ImportTask {
    fn job_id(&self) -> Uuid {
        self.job_id
    }

    fn owner_id(&self) -> Uuid {
        self.user_id
    }
}

/// A decoded upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub kind: ImportKind,
    pub filename: String,
    pub content: Vec<u8>,
    pub settings: ImportSettings,
}

/// Parse + validate result for a whole file
#[derive(Debug, Default)]
struct ScanResult {
    total_rows: usize,
    valid: Vec<ValidatedRow>,
    rejected: Vec<NewImportError>,
    parse_rejected: u32,
    validation_rejected: u32,
}

pub struct ImportProcessor {
    store: Arc<dyn ImportStore>,
    queue: Arc<dyn JobQueue<ImportTask>>,
    errors: ErrorLog,
    config: ImportConfig,
}

impl ImportProcessor {
    pub fn new(
        store: Arc<dyn ImportStore>,
        queue: Arc<dyn JobQueue<ImportTask>>,
        config: ImportConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            errors: ErrorLog::new(store.clone()),
            store,
            queue,
            config,
        })
    }

    /// Register the processor as the queue's unit of work
    pub async fn start(self: &Arc<Self>) -> Result<(), QueueError> {
        std::fs::create_dir_all(&self.config.upload_dir).map_err(|e| {
            QueueError::Broker(format!(
                "cannot create upload dir {}: {}",
                self.config.upload_dir.display(),
                e
            ))
        })?;

        let processor = Arc::downgrade(self);
        let handler: JobFn<ImportTask> = Arc::new(move |task: ImportTask, progress: ProgressReporter| {
            let processor = processor.clone();
            async move {
                let processor = processor
                    .upgrade()
                    .ok_or_else(|| anyhow::anyhow!("import processor has shut down"))?;
                let summary = processor.process(task, progress).await?;
                Ok::<_, anyhow::Error>(serde_json::to_value(summary)?)
            }
            .boxed()
        });
        self.queue.process(handler).await
    }

    // ==========================================================================
    // Submit
    // ==========================================================================

    /// Decode a base64 upload, rejecting oversize content before decoding
    pub fn decode_upload(&self, request: SubmitImportRequest) -> Result<Upload, ImportError> {
        let encoded = request.content_base64.trim();
        let estimated = (encoded.len() as u64 / 4) * 3;
        // Padding can shave at most two bytes off the estimate
        if estimated.saturating_sub(2) > self.config.max_file_size_bytes {
            return Err(ImportError::FileTooLarge {
                size: estimated,
                limit: self.config.max_file_size_bytes,
            });
        }

        let content = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ImportError::InvalidEncoding)?;

        Ok(Upload {
            kind: request.kind,
            filename: request.filename,
            content,
            settings: request.settings,
        })
    }

    /// Accept an upload, create its job and enqueue it
    pub async fn submit(&self, auth: &AuthContext, upload: Upload) -> Result<ImportSummary, ImportError> {
        let (file_type, file_size) = self.check_upload(&upload)?;

        let extension = extension_of(&upload.filename).unwrap_or("bin");
        let stored_filename = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.config.upload_dir.join(&stored_filename);
        tokio::fs::create_dir_all(&self.config.upload_dir).await?;
        tokio::fs::write(&path, &upload.content).await?;

        let job = ImportJob::new_pending(NewImportJob {
            user_id: auth.user_id,
            dealership_id: auth.dealership_id,
            import_kind: upload.kind,
            original_filename: upload.filename,
            stored_filename,
            file_size: file_size as i64,
            file_type,
            settings: upload.settings,
        });

        if let Err(e) = self.store.create_job(&job).await {
            remove_upload(&path).await;
            return Err(e.into());
        }
        info!(
            "Import job {} created: {} {} ({} bytes)",
            job.id,
            job.import_kind,
            job.original_filename,
            file_size
        );

        let task = ImportTask {
            job_id: job.id,
            user_id: job.user_id,
            dealership_id: job.dealership_id,
        };
        let handle = match self.queue.add(task).await {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to enqueue import job {}: {}", job.id, e);
                let summary = [JobErrorSummary::fatal(format!("could not enqueue job: {}", e))];
                if let Err(mark) = self.store.mark_failed(job.id, &summary).await {
                    error!("Failed to mark import job {} as failed: {}", job.id, mark);
                }
                remove_upload(&path).await;
                return Err(e.into());
            }
        };

        if !self.config.wait_for_completion {
            return Ok(job.summary());
        }

        let record = handle.wait().await;
        debug!("Import job {} finished in queue as {:?}", job.id, record.state);
        let finished = self
            .store
            .get_job(job.id)
            .await?
            .ok_or(ImportError::NotFound(job.id))?;
        Ok(finished.summary())
    }

    fn check_upload(&self, upload: &Upload) -> Result<(FileType, u64), ImportError> {
        let size = upload.content.len() as u64;
        if size > self.config.max_file_size_bytes {
            return Err(ImportError::FileTooLarge {
                size,
                limit: self.config.max_file_size_bytes,
            });
        }
        let file_type = FileType::from_filename(&upload.filename)
            .ok_or_else(|| ImportError::UnsupportedFileType(upload.filename.clone()))?;
        Ok((file_type, size))
    }

    // ==========================================================================
    // Processing (queue unit of work)
    // ==========================================================================

    /// Run one job. Jobs that are no longer PENDING are skipped, which makes
    /// redelivery harmless.
    pub async fn process(
        &self,
        task: ImportTask,
        progress: ProgressReporter,
    ) -> Result<ImportSummary, ImportError> {
        let job = self
            .store
            .get_job(task.job_id)
            .await?
            .ok_or(ImportError::NotFound(task.job_id))?;
        if job.status != ImportJobStatus::Pending {
            info!("Skipping import job {} ({})", job.id, job.status.as_str());
            return Ok(job.summary());
        }

        let job = match self.store.mark_processing(job.id).await {
            Ok(job) => job,
            Err(StoreError::InvalidTransition { from, .. }) => {
                info!("Import job {} already {}", task.job_id, from.as_str());
                return self.current_summary(task.job_id).await;
            }
            Err(e) => return Err(e.into()),
        };

        let start_time = Instant::now();
        let path = self.config.upload_dir.join(&job.stored_filename);
        info!("Processing import job {} ({})", job.id, job.import_kind);

        let result = self.run(&job, &path, &progress).await;
        remove_upload(&path).await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(summary) => {
                info!(
                    "Import job {} completed in {}ms: {} total, {} ok, {} failed, {} rejected",
                    job.id,
                    duration_ms,
                    summary.total_rows,
                    summary.successful_rows,
                    summary.failed_rows,
                    summary.rejected_rows
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("Import job {} failed after {}ms: {}", job.id, duration_ms, e);
                let summary = [JobErrorSummary::fatal(e.to_string())];
                if let Err(mark) = self.store.mark_failed(job.id, &summary).await {
                    error!("Failed to mark import job {} as failed: {}", job.id, mark);
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        job: &ImportJob,
        path: &Path,
        progress: &ProgressReporter,
    ) -> Result<ImportSummary, ImportError> {
        let scan = self
            .scan(path.to_path_buf(), job.file_type, job.import_kind, job.settings.clone())
            .await?;
        progress.report(20);

        self.errors.append(job.id, &scan.rejected).await?;
        let rejected = scan.parse_rejected + scan.validation_rejected;
        self.store
            .set_row_totals(job.id, scan.total_rows as i32, rejected as i32)
            .await?;

        let valid_count = scan.valid.len().max(1);
        let batch_size = job
            .settings
            .batch_size
            .filter(|size| *size > 0)
            .unwrap_or(self.config.batch_size);
        let resolver = ReferenceResolver::new(
            self.store.clone(),
            job.dealership_id,
            job.settings.default_assignee.clone(),
        );
        let mut persister = BatchPersister::new(
            self.store.clone(),
            resolver,
            PersistContext {
                job_id: job.id,
                dealership_id: job.dealership_id,
                user_id: job.user_id,
                batch_size,
            },
        );
        let outcome = persister
            .persist(scan.valid, |processed| {
                progress.report(20 + (80 * processed / valid_count) as u32);
            })
            .await?;

        let mut summary = Vec::new();
        if scan.parse_rejected > 0 {
            summary.push(JobErrorSummary::rows(SummaryKind::Parse, scan.parse_rejected));
        }
        if scan.validation_rejected > 0 {
            summary.push(JobErrorSummary::rows(SummaryKind::Validation, scan.validation_rejected));
        }
        if outcome.failed > 0 {
            summary.push(JobErrorSummary::rows(SummaryKind::Processing, outcome.failed));
        }

        let completed = self.store.mark_completed(job.id, &summary).await?;
        progress.report(100);
        Ok(completed.summary())
    }

    /// Parse and validate a file off the async runtime
    async fn scan(
        &self,
        path: PathBuf,
        file_type: FileType,
        kind: ImportKind,
        settings: ImportSettings,
    ) -> Result<ScanResult, ImportError> {
        let today = Utc::now().date_naive();
        tokio::task::spawn_blocking(move || scan_file(&path, file_type, kind, &settings, today))
            .await
            .map_err(|e| ImportError::Task(e.to_string()))?
            .map_err(ImportError::from)
    }

    async fn current_summary(&self, job_id: Uuid) -> Result<ImportSummary, ImportError> {
        self.store
            .get_job(job_id)
            .await?
            .map(|job| job.summary())
            .ok_or(ImportError::NotFound(job_id))
    }

    // ==========================================================================
    // Preview, status, download, cancel
    // ==========================================================================

    /// Parse and validate without persisting anything
    pub async fn preview(&self, upload: Upload) -> Result<PreviewResponse, ImportError> {
        let (file_type, _) = self.check_upload(&upload)?;

        let extension = extension_of(&upload.filename).unwrap_or("bin");
        let path = std::env::temp_dir().join(format!("preview-{}.{}", Uuid::new_v4(), extension));
        tokio::fs::write(&path, &upload.content).await?;

        let result = self
            .scan(path.clone(), file_type, upload.kind, upload.settings)
            .await;
        remove_upload(&path).await;
        let scan = result?;

        let errors = scan
            .rejected
            .into_iter()
            .take(self.config.preview_error_limit)
            .map(|e| PreviewError {
                row_number: e.row_number,
                error_message: e.error_message,
                field_errors: e.field_errors,
            })
            .collect();

        Ok(PreviewResponse {
            total_rows: scan.total_rows as i32,
            valid_rows: scan.valid.len() as i32,
            rejected_rows: (scan.parse_rejected + scan.validation_rejected) as i32,
            errors,
        })
    }

    /// Job visible to the caller's dealership
    async fn visible_job(&self, auth: &AuthContext, job_id: Uuid) -> Result<ImportJob, ImportError> {
        match self.store.get_job(job_id).await? {
            Some(job) if job.dealership_id == auth.dealership_id => Ok(job),
            // Other tenants' jobs are reported as missing
            _ => Err(ImportError::NotFound(job_id)),
        }
    }

    pub async fn get_job(
        &self,
        auth: &AuthContext,
        job_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<ImportJobDetailResponse, ImportError> {
        let job = self.visible_job(auth, job_id).await?;
        let errors = self.errors.page(job_id, page, per_page).await?;
        Ok(ImportJobDetailResponse {
            job,
            errors: errors.errors,
            total_errors: errors.total,
            page: errors.page,
            per_page: errors.per_page,
        })
    }

    pub async fn download_errors(
        &self,
        auth: &AuthContext,
        job_id: Uuid,
    ) -> Result<DownloadErrorsResponse, ImportError> {
        let job = self.visible_job(auth, job_id).await?;
        let (bytes, error_count) = self.errors.export_csv(job.id).await?;
        Ok(DownloadErrorsResponse {
            filename: format!("import-errors-{}.csv", job.id),
            content_type: "text/csv".to_string(),
            content_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            error_count,
        })
    }

    /// Cancel a job that has not been claimed yet. The job is marked FAILED
    /// with a `cancelled` summary; PROCESSING jobs are never interrupted.
    pub async fn cancel(
        &self,
        auth: &AuthContext,
        job_id: Uuid,
    ) -> Result<CancelImportResponse, ImportError> {
        let job = self.visible_job(auth, job_id).await?;
        if job.user_id != auth.user_id {
            return Err(CancelError::NotOwner.into());
        }
        if job.status != ImportJobStatus::Pending {
            return Err(CancelError::NotPending(job.status).into());
        }

        match self.queue.remove(job_id, auth.user_id) {
            Ok(_) => {}
            Err(QueueError::NotOwner) => return Err(CancelError::NotOwner.into()),
            Err(QueueError::NotWaiting(_)) => {
                return Err(CancelError::NotPending(ImportJobStatus::Processing).into())
            }
            Err(e) => return Err(e.into()),
        }

        // Conditional on PENDING: another instance may have claimed the job
        // since it was read. The processor skips jobs that are no longer
        // PENDING, so this also covers payloads still sitting in a broker.
        match self.store.mark_cancelled(job_id, &[JobErrorSummary::cancelled()]).await {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                return Err(CancelError::NotPending(from).into())
            }
            Err(e) => return Err(e.into()),
        }
        remove_upload(&self.config.upload_dir.join(&job.stored_filename)).await;
        info!("Import job {} cancelled by {}", job_id, auth.user_id);

        Ok(CancelImportResponse {
            job_id,
            cancelled: true,
            message: "Import job cancelled".to_string(),
        })
    }

    /// Queue records of the caller's own jobs
    pub fn list_queue(&self, auth: &AuthContext, state: Option<QueueState>) -> Vec<QueueJobRecord> {
        let states = match state {
            Some(state) => vec![state],
            None => vec![
                QueueState::Waiting,
                QueueState::Active,
                QueueState::Completed,
                QueueState::Failed,
            ],
        };
        states
            .into_iter()
            .flat_map(|state| self.queue.list(state))
            .filter(|record| record.owner_id == auth.user_id)
            .collect()
    }
}

/// Stream a file through the parser and validator
fn scan_file(
    path: &Path,
    file_type: FileType,
    kind: ImportKind,
    settings: &ImportSettings,
    today: NaiveDate,
) -> Result<ScanResult, ParseError> {
    let validator = RowValidator::new(kind, today);
    let mut scan = ScanResult::default();

    for parsed in RowReader::open(path, file_type)? {
        let parsed = parsed?;
        scan.total_rows += 1;
        match parsed.outcome {
            Ok(raw) => {
                // Error records keep the row under the file's own headers
                let mapped = apply_column_mapping(raw.clone(), &settings.column_mapping);
                match validator.validate(&mapped) {
                    Ok(row) => scan.valid.push(ValidatedRow {
                        row_number: parsed.row_number,
                        raw,
                        row,
                    }),
                    Err(field_errors) => {
                        scan.validation_rejected += 1;
                        scan.rejected
                            .push(NewImportError::validation(parsed.row_number, raw, field_errors));
                    }
                }
            }
            Err(bad) => {
                scan.parse_rejected += 1;
                scan.rejected
                    .push(NewImportError::parse(parsed.row_number, bad.raw, bad.message));
            }
        }
    }

    Ok(scan)
}

fn extension_of(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
}

async fn remove_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove upload {}: {}", path.display(), e);
        }
    }
}

// ==========================================================================
// Tests
// ==========================================================================
