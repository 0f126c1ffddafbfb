//! Import job types for queue-based async processing
//!
//! These types cover:
//! - The persistent import job record and its state machine
//! - Submit / preview / status / download message payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

use super::import::{FileType, ImportErrorRecord, ImportKind, ImportSettings};

// ==========================================================================
// Tests First (TDD)
// ==========================================================================


// ==========================================================================
// Import Job State Machine
// ==========================================================================

/// Lifecycle status of an import job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "import_job_status", rename_all = "lowercase")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportJobStatus {
    /// Created, not yet claimed by a worker
    Pending,
    /// Claimed; `started_at` is set
    Processing,
    /// All batches attempted (row failures allowed)
    Completed,
    /// Fatal job-level error
    Failed,
}

impl ImportJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportJobStatus::Pending => "pending",
            ImportJobStatus::Processing => "processing",
            ImportJobStatus::Completed => "completed",
            ImportJobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportJobStatus::Completed | ImportJobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: ImportJobStatus) -> bool {
        matches!(
            (self, next),
            (ImportJobStatus::Pending, ImportJobStatus::Processing)
                | (ImportJobStatus::Pending, ImportJobStatus::Failed)
                | (ImportJobStatus::Processing, ImportJobStatus::Completed)
                | (ImportJobStatus::Processing, ImportJobStatus::Failed)
        )
    }
}

/// Category of a job error summary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    Parse,
    Validation,
    Processing,
    /// Fatal job-level failure
    Job,
    /// Removed from the queue before processing
    Cancelled,
}

/// One entry of the typed error summary stored on the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobErrorSummary {
    pub kind: SummaryKind,
    pub count: u32,
    pub message: String,
}

impl JobErrorSummary {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: SummaryKind::Job,
            count: 1,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: SummaryKind::Cancelled,
            count: 0,
            message: "Import was cancelled before processing started".to_string(),
        }
    }

    pub fn rows(kind: SummaryKind, count: u32) -> Self {
        let label = match kind {
            SummaryKind::Parse => "rows could not be parsed",
            SummaryKind::Validation => "rows failed validation",
            SummaryKind::Processing => "rows failed to persist",
            SummaryKind::Job | SummaryKind::Cancelled => "rows affected",
        };
        Self {
            kind,
            count,
            message: format!("{} {}", count, label),
        }
    }
}

/// Persistent record tracking one upload
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub dealership_id: Uuid,
    pub import_kind: ImportKind,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub status: ImportJobStatus,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub successful_rows: i32,
    pub failed_rows: i32,
    /// Rows rejected at parse or validation stage
    pub rejected_rows: i32,
    #[sqlx(json)]
    pub error_summary: Vec<JobErrorSummary>,
    #[sqlx(json)]
    pub settings: ImportSettings,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when an upload is accepted
#[derive(Debug, Clone)]
pub struct NewImportJob {
    pub user_id: Uuid,
    pub dealership_id: Uuid,
    pub import_kind: ImportKind,
    pub original_filename: String,
    pub stored_filename: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub settings: ImportSettings,
}

impl ImportJob {
    /// Build a PENDING job with zeroed counters
    pub fn new_pending(new: NewImportJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            dealership_id: new.dealership_id,
            import_kind: new.import_kind,
            original_filename: new.original_filename,
            stored_filename: new.stored_filename,
            file_size: new.file_size,
            file_type: new.file_type,
            status: ImportJobStatus::Pending,
            total_rows: 0,
            processed_rows: 0,
            successful_rows: 0,
            failed_rows: 0,
            rejected_rows: 0,
            error_summary: vec![],
            settings: new.settings,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            job_id: self.id,
            status: self.status,
            total_rows: self.total_rows,
            processed_rows: self.processed_rows,
            successful_rows: self.successful_rows,
            failed_rows: self.failed_rows,
            rejected_rows: self.rejected_rows,
        }
    }
}

/// Counter increments applied after one persisted chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub processed: i32,
    pub successful: i32,
    pub failed: i32,
}

// ==========================================================================
// Message payloads
// ==========================================================================

/// Aggregate counters returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub job_id: Uuid,
    pub status: ImportJobStatus,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub successful_rows: i32,
    pub failed_rows: i32,
    pub rejected_rows: i32,
}

/// Upload request (submit and preview)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitImportRequest {
    pub kind: ImportKind,
    pub filename: String,
    pub content_base64: String,
    #[serde(default)]
    pub settings: ImportSettings,
}

/// Dry-run result: counts plus the first validation errors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub total_rows: i32,
    pub valid_rows: i32,
    pub rejected_rows: i32,
    pub errors: Vec<PreviewError>,
}

/// Validation error shown in a preview
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewError {
    pub row_number: i32,
    pub error_message: String,
    pub field_errors: Vec<super::import::FieldError>,
}

/// Request for job status with a page of its errors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetImportJobRequest {
    pub job_id: Uuid,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    50
}

/// Job status, counters and one page of error records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobDetailResponse {
    pub job: ImportJob,
    pub errors: Vec<ImportErrorRecord>,
    pub total_errors: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Request addressing a single job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJobIdRequest {
    pub job_id: Uuid,
}

/// Error report as a delimited file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadErrorsResponse {
    pub filename: String,
    pub content_type: String,
    pub content_base64: String,
    pub error_count: usize,
}

/// Result of cancelling a pending job
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelImportResponse {
    pub job_id: Uuid,
    pub cancelled: bool,
    pub message: String,
}
