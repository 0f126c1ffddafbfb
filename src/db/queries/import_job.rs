//! Import job database queries
//!
//! Every mutation is a single conditional UPDATE so the state machine and
//! the counter freeze are enforced by the database, not by callers.

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{CounterDelta, ImportJob, JobErrorSummary};

const JOB_COLUMNS: &str = r#"
    id, user_id, dealership_id, import_kind, original_filename, stored_filename,
    file_size, file_type, status, total_rows, processed_rows, successful_rows,
    failed_rows, rejected_rows, error_summary, settings, created_at, started_at,
    completed_at
"#;

/// Insert a new PENDING job
pub async fn create_job(pool: &PgPool, job: &ImportJob) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO import_jobs (
            id, user_id, dealership_id, import_kind, original_filename, stored_filename,
            file_size, file_type, status, total_rows, processed_rows, successful_rows,
            failed_rows, rejected_rows, error_summary, settings, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, 0, 0, 0, 0, $10, $11, $12)
        "#,
    )
    .bind(job.id)
    .bind(job.user_id)
    .bind(job.dealership_id)
    .bind(job.import_kind)
    .bind(&job.original_filename)
    .bind(&job.stored_filename)
    .bind(job.file_size)
    .bind(job.file_type)
    .bind(job.status)
    .bind(Json(&job.error_summary))
    .bind(Json(&job.settings))
    .bind(job.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!("SELECT {} FROM import_jobs WHERE id = $1", JOB_COLUMNS);
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .fetch_optional(pool)
        .await
}

/// Claim a pending job. Returns `None` when the job is not PENDING.
pub async fn mark_processing(pool: &PgPool, job_id: Uuid) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!(
        r#"
        UPDATE import_jobs
        SET status = 'processing', started_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {}
        "#,
        JOB_COLUMNS
    );
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .fetch_optional(pool)
        .await
}

/// Store parser totals. Returns false when the job is not PROCESSING.
pub async fn set_row_totals(
    pool: &PgPool,
    job_id: Uuid,
    total: i32,
    rejected: i32,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET total_rows = $2, rejected_rows = $3
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(total)
    .bind(rejected)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Add one chunk's counters in a single statement
pub async fn increment_counters(
    pool: &PgPool,
    job_id: Uuid,
    delta: CounterDelta,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE import_jobs
        SET processed_rows = processed_rows + $2,
            successful_rows = successful_rows + $3,
            failed_rows = failed_rows + $4
        WHERE id = $1 AND status = 'processing'
        "#,
    )
    .bind(job_id)
    .bind(delta.processed)
    .bind(delta.successful)
    .bind(delta.failed)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Finish a processing job
pub async fn mark_completed(
    pool: &PgPool,
    job_id: Uuid,
    summary: &[JobErrorSummary],
) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!(
        r#"
        UPDATE import_jobs
        SET status = 'completed', completed_at = NOW(), error_summary = $2
        WHERE id = $1 AND status = 'processing'
        RETURNING {}
        "#,
        JOB_COLUMNS
    );
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .bind(Json(summary))
        .fetch_optional(pool)
        .await
}

/// Fail a pending or processing job
pub async fn mark_failed(
    pool: &PgPool,
    job_id: Uuid,
    summary: &[JobErrorSummary],
) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!(
        r#"
        UPDATE import_jobs
        SET status = 'failed', completed_at = NOW(), error_summary = $2
        WHERE id = $1 AND status IN ('pending', 'processing')
        RETURNING {}
        "#,
        JOB_COLUMNS
    );
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .bind(Json(summary))
        .fetch_optional(pool)
        .await
}

/// Fail a job that no worker has claimed yet
pub async fn mark_cancelled(
    pool: &PgPool,
    job_id: Uuid,
    summary: &[JobErrorSummary],
) -> sqlx::Result<Option<ImportJob>> {
    let sql = format!(
        r#"
        UPDATE import_jobs
        SET status = 'failed', completed_at = NOW(), error_summary = $2
        WHERE id = $1 AND status = 'pending'
        RETURNING {}
        "#,
        JOB_COLUMNS
    );
    sqlx::query_as::<_, ImportJob>(&sql)
        .bind(job_id)
        .bind(Json(summary))
        .fetch_optional(pool)
        .await
}
