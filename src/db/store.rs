//! Persistence seam used by the import pipeline
//!
//! `PgImportStore` is the production implementation; `MemoryStore`
//! (see `memory.rs`) backs the offline CLI and tests.

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::queries;
use crate::types::{
    Advisor, CanonicalRow, CounterDelta, Dealer, ImportErrorRecord, ImportJob, ImportJobStatus,
    JobErrorSummary, NewDealer, NewImportError,
};

/// Storage failure
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated ({0})")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("import job cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        from: ImportJobStatus,
        to: ImportJobStatus,
    },
    #[error("import job {0} is not processing; counters are frozen")]
    Frozen(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, surfacing unique violations as `Conflict`
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.constraint().unwrap_or("unique").to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Resolved identifiers attached to a created business record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRefs {
    pub dealership_id: Uuid,
    pub created_by: Uuid,
    pub import_job_id: Uuid,
    pub dealer_id: Option<Uuid>,
    pub advisor_id: Option<Uuid>,
}

/// Generic persistence interface for jobs, error records, references and rows
#[async_trait]
pub trait ImportStore: Send + Sync {
    async fn create_job(&self, job: &ImportJob) -> Result<(), StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, StoreError>;

    /// PENDING -> PROCESSING, sets `started_at`
    async fn mark_processing(&self, job_id: Uuid) -> Result<ImportJob, StoreError>;

    /// Record parser totals; only while PROCESSING
    async fn set_row_totals(&self, job_id: Uuid, total: i32, rejected: i32) -> Result<(), StoreError>;

    /// Atomically add one chunk's counters; only while PROCESSING
    async fn increment_counters(&self, job_id: Uuid, delta: CounterDelta) -> Result<(), StoreError>;

    /// PROCESSING -> COMPLETED, sets `completed_at`
    async fn mark_completed(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError>;

    /// PENDING | PROCESSING -> FAILED, sets `completed_at`
    async fn mark_failed(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError>;

    /// PENDING -> FAILED only; a job already claimed by a worker is refused
    async fn mark_cancelled(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError>;

    async fn insert_errors(&self, job_id: Uuid, errors: &[NewImportError]) -> Result<(), StoreError>;

    async fn list_errors(
        &self,
        job_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ImportErrorRecord>, StoreError>;

    async fn count_errors(&self, job_id: Uuid) -> Result<i64, StoreError>;

    async fn find_dealer_by_code(&self, code: &str) -> Result<Option<Dealer>, StoreError>;

    /// Insert unless the code exists; either way return the stored dealer
    async fn create_dealer_if_absent(&self, dealer: &NewDealer) -> Result<Dealer, StoreError>;

    async fn get_advisor(&self, user_id: Uuid) -> Result<Option<Advisor>, StoreError>;

    /// Active advisors of a tenant whose login/email contains `term` or whose name equals it
    async fn search_advisors(&self, dealership_id: Uuid, term: &str) -> Result<Vec<Advisor>, StoreError>;

    async fn create_record(&self, refs: &RecordRefs, row: &CanonicalRow) -> Result<Uuid, StoreError>;
}

/// PostgreSQL-backed store; the pool is created once at startup and injected
#[derive(Clone)]
pub struct PgImportStore {
    pool: PgPool,
}

impl PgImportStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn transition_error(&self, job_id: Uuid, to: ImportJobStatus) -> StoreError {
        match queries::import_job::get_job(&self.pool, job_id).await {
            Ok(Some(job)) => StoreError::InvalidTransition {
                from: job.status,
                to,
            },
            Ok(None) => StoreError::NotFound(format!("import job {}", job_id)),
            Err(e) => StoreError::from_sqlx(e),
        }
    }
}

#[async_trait]
impl ImportStore for PgImportStore {
    async fn create_job(&self, job: &ImportJob) -> Result<(), StoreError> {
        queries::import_job::create_job(&self.pool, job)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, StoreError> {
        queries::import_job::get_job(&self.pool, job_id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<ImportJob, StoreError> {
        match queries::import_job::mark_processing(&self.pool, job_id)
            .await
            .map_err(StoreError::from_sqlx)?
        {
            Some(job) => Ok(job),
            None => Err(self.transition_error(job_id, ImportJobStatus::Processing).await),
        }
    }

    async fn set_row_totals(&self, job_id: Uuid, total: i32, rejected: i32) -> Result<(), StoreError> {
        let updated = queries::import_job::set_row_totals(&self.pool, job_id, total, rejected)
            .await
            .map_err(StoreError::from_sqlx)?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::Frozen(job_id))
        }
    }

    async fn increment_counters(&self, job_id: Uuid, delta: CounterDelta) -> Result<(), StoreError> {
        let updated = queries::import_job::increment_counters(&self.pool, job_id, delta)
            .await
            .map_err(StoreError::from_sqlx)?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::Frozen(job_id))
        }
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError> {
        match queries::import_job::mark_completed(&self.pool, job_id, summary)
            .await
            .map_err(StoreError::from_sqlx)?
        {
            Some(job) => Ok(job),
            None => Err(self.transition_error(job_id, ImportJobStatus::Completed).await),
        }
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError> {
        match queries::import_job::mark_failed(&self.pool, job_id, summary)
            .await
            .map_err(StoreError::from_sqlx)?
        {
            Some(job) => Ok(job),
            None => Err(self.transition_error(job_id, ImportJobStatus::Failed).await),
        }
    }

    async fn mark_cancelled(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError> {
        match queries::import_job::mark_cancelled(&self.pool, job_id, summary)
            .await
            .map_err(StoreError::from_sqlx)?
        {
            Some(job) => Ok(job),
            None => Err(self.transition_error(job_id, ImportJobStatus::Failed).await),
        }
    }

    async fn insert_errors(&self, job_id: Uuid, errors: &[NewImportError]) -> Result<(), StoreError> {
        queries::import_error::insert_errors(&self.pool, job_id, errors)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn list_errors(
        &self,
        job_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ImportErrorRecord>, StoreError> {
        queries::import_error::list_errors(&self.pool, job_id, offset, limit)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn count_errors(&self, job_id: Uuid) -> Result<i64, StoreError> {
        queries::import_error::count_errors(&self.pool, job_id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn find_dealer_by_code(&self, code: &str) -> Result<Option<Dealer>, StoreError> {
        queries::dealer::find_dealer_by_code(&self.pool, code)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn create_dealer_if_absent(&self, dealer: &NewDealer) -> Result<Dealer, StoreError> {
        if let Some(created) = queries::dealer::insert_dealer_if_absent(&self.pool, dealer)
            .await
            .map_err(StoreError::from_sqlx)?
        {
            return Ok(created);
        }
        // Lost the race (or the code already existed): re-read the winner
        self.find_dealer_by_code(&dealer.code)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("dealer {}", dealer.code)))
    }

    async fn get_advisor(&self, user_id: Uuid) -> Result<Option<Advisor>, StoreError> {
        queries::advisor::get_advisor(&self.pool, user_id)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn search_advisors(&self, dealership_id: Uuid, term: &str) -> Result<Vec<Advisor>, StoreError> {
        queries::advisor::search_advisors(&self.pool, dealership_id, term)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn create_record(&self, refs: &RecordRefs, row: &CanonicalRow) -> Result<Uuid, StoreError> {
        let result = match row {
            CanonicalRow::Booking(booking) => {
                queries::records::insert_booking(&self.pool, refs, booking).await
            }
            CanonicalRow::Enquiry(enquiry) => {
                queries::records::insert_enquiry(&self.pool, refs, enquiry).await
            }
            CanonicalRow::Quotation(quotation) => {
                queries::records::insert_quotation(&self.pool, refs, quotation).await
            }
        };
        result.map_err(StoreError::from_sqlx)
    }
}
