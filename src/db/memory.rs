//! In-memory `ImportStore`
//!
//! Mirrors the PostgreSQL guards (status-conditional updates, unique dealer
//! codes, per-tenant unique booking references and quotation numbers) so the
//! offline CLI and tests exercise the same failure paths as production.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::store::{ImportStore, RecordRefs, StoreError};
use crate::types::{
    Advisor, CanonicalRow, CounterDelta, Dealer, ImportErrorRecord, ImportJob, ImportJobStatus,
    JobErrorSummary, NewDealer, NewImportError,
};

/// A persisted business record
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: Uuid,
    pub refs: RecordRefs,
    pub row: CanonicalRow,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    jobs: HashMap<Uuid, ImportJob>,
    errors: Vec<ImportErrorRecord>,
    /// Keyed by upper-case code
    dealers: HashMap<String, Dealer>,
    advisors: HashMap<Uuid, Advisor>,
    records: Vec<StoredRecord>,
    record_writes_unavailable: bool,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user into the directory
    pub fn add_advisor(&self, advisor: Advisor) {
        self.state.lock().advisors.insert(advisor.id, advisor);
    }

    /// Seed an existing dealer
    pub fn add_dealer(&self, dealer: Dealer) {
        self.state
            .lock()
            .dealers
            .insert(dealer.code.to_uppercase(), dealer);
    }

    pub fn dealers(&self) -> Vec<Dealer> {
        let mut dealers: Vec<Dealer> = self.state.lock().dealers.values().cloned().collect();
        dealers.sort_by(|a, b| a.code.cmp(&b.code));
        dealers
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.state.lock().records.clone()
    }

    pub fn records_for_job(&self, job_id: Uuid) -> Vec<StoredRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.refs.import_job_id == job_id)
            .cloned()
            .collect()
    }

    /// Make every record insert fail as if the database were unreachable
    pub fn set_record_writes_unavailable(&self, unavailable: bool) {
        self.state.lock().record_writes_unavailable = unavailable;
    }

    fn transition(
        &self,
        job_id: Uuid,
        to: ImportJobStatus,
        apply: impl FnOnce(&mut ImportJob),
    ) -> Result<ImportJob, StoreError> {
        let mut state = self.state.lock();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("import job {}", job_id)))?;
        if !job.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to,
            });
        }
        job.status = to;
        apply(job);
        Ok(job.clone())
    }

    fn processing_job_mut<'a>(
        state: &'a mut MemoryState,
        job_id: Uuid,
    ) -> Result<&'a mut ImportJob, StoreError> {
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status == ImportJobStatus::Processing => Ok(job),
            Some(_) => Err(StoreError::Frozen(job_id)),
            None => Err(StoreError::NotFound(format!("import job {}", job_id))),
        }
    }
}

fn same_key(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

#[async_trait]
impl ImportStore for MemoryStore {
    async fn create_job(&self, job: &ImportJob) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict("import_jobs_pkey".to_string()));
        }
        state.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ImportJob>, StoreError> {
        Ok(self.state.lock().jobs.get(&job_id).cloned())
    }

    async fn mark_processing(&self, job_id: Uuid) -> Result<ImportJob, StoreError> {
        self.transition(job_id, ImportJobStatus::Processing, |job| {
            job.started_at = Some(Utc::now());
        })
    }

    async fn set_row_totals(&self, job_id: Uuid, total: i32, rejected: i32) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let job = Self::processing_job_mut(&mut state, job_id)?;
        job.total_rows = total;
        job.rejected_rows = rejected;
        Ok(())
    }

    async fn increment_counters(&self, job_id: Uuid, delta: CounterDelta) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let job = Self::processing_job_mut(&mut state, job_id)?;
        job.processed_rows += delta.processed;
        job.successful_rows += delta.successful;
        job.failed_rows += delta.failed;
        Ok(())
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError> {
        self.transition(job_id, ImportJobStatus::Completed, |job| {
            job.completed_at = Some(Utc::now());
            job.error_summary = summary.to_vec();
        })
    }

    async fn mark_failed(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError> {
        self.transition(job_id, ImportJobStatus::Failed, |job| {
            job.completed_at = Some(Utc::now());
            job.error_summary = summary.to_vec();
        })
    }

    async fn mark_cancelled(
        &self,
        job_id: Uuid,
        summary: &[JobErrorSummary],
    ) -> Result<ImportJob, StoreError> {
        let mut state = self.state.lock();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StoreError::NotFound(format!("import job {}", job_id)))?;
        if job.status != ImportJobStatus::Pending {
            return Err(StoreError::InvalidTransition {
                from: job.status,
                to: ImportJobStatus::Failed,
            });
        }
        job.status = ImportJobStatus::Failed;
        job.completed_at = Some(Utc::now());
        job.error_summary = summary.to_vec();
        Ok(job.clone())
    }

    async fn insert_errors(&self, job_id: Uuid, errors: &[NewImportError]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound(format!("import job {}", job_id)));
        }
        let now = Utc::now();
        state.errors.extend(errors.iter().map(|e| ImportErrorRecord {
            id: Uuid::new_v4(),
            job_id,
            row_number: e.row_number,
            raw_row: e.raw_row.clone(),
            error_message: e.error_message.clone(),
            error_type: e.error_type,
            field_errors: e.field_errors.clone(),
            created_at: now,
        }));
        Ok(())
    }

    async fn list_errors(
        &self,
        job_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ImportErrorRecord>, StoreError> {
        let state = self.state.lock();
        let mut errors: Vec<&ImportErrorRecord> =
            state.errors.iter().filter(|e| e.job_id == job_id).collect();
        // Stable sort keeps insertion order within a row
        errors.sort_by_key(|e| e.row_number);
        Ok(errors
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_errors(&self, job_id: Uuid) -> Result<i64, StoreError> {
        let state = self.state.lock();
        Ok(state.errors.iter().filter(|e| e.job_id == job_id).count() as i64)
    }

    async fn find_dealer_by_code(&self, code: &str) -> Result<Option<Dealer>, StoreError> {
        Ok(self.state.lock().dealers.get(&code.to_uppercase()).cloned())
    }

    async fn create_dealer_if_absent(&self, dealer: &NewDealer) -> Result<Dealer, StoreError> {
        let code = dealer.code.to_uppercase();
        let mut state = self.state.lock();
        let stored = state.dealers.entry(code.clone()).or_insert_with(|| Dealer {
            id: Uuid::new_v4(),
            dealership_id: dealer.dealership_id,
            code,
            name: dealer.name.clone(),
            zone: dealer.zone.clone(),
            region: dealer.region.clone(),
            dealer_type: dealer.dealer_type,
            auto_created: true,
            created_at: Utc::now(),
        });
        Ok(stored.clone())
    }

    async fn get_advisor(&self, user_id: Uuid) -> Result<Option<Advisor>, StoreError> {
        Ok(self.state.lock().advisors.get(&user_id).cloned())
    }

    async fn search_advisors(&self, dealership_id: Uuid, term: &str) -> Result<Vec<Advisor>, StoreError> {
        let needle = term.to_lowercase();
        let state = self.state.lock();
        let mut matches: Vec<Advisor> = state
            .advisors
            .values()
            .filter(|a| a.dealership_id == dealership_id && a.is_active)
            .filter(|a| {
                a.login.to_lowercase().contains(&needle)
                    || a
                        .email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(&needle))
                    || a.display_name.to_lowercase() == needle
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(matches)
    }

    async fn create_record(&self, refs: &RecordRefs, row: &CanonicalRow) -> Result<Uuid, StoreError> {
        let mut state = self.state.lock();
        if state.record_writes_unavailable {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let duplicate = state.records.iter().find(|existing| {
            existing.refs.dealership_id == refs.dealership_id
                && match (&existing.row, row) {
                    (CanonicalRow::Booking(a), CanonicalRow::Booking(b)) => {
                        same_key(&a.booking_reference, &b.booking_reference)
                    }
                    (CanonicalRow::Quotation(a), CanonicalRow::Quotation(b)) => {
                        same_key(&a.quotation_number, &b.quotation_number)
                    }
                    _ => false,
                }
        });
        if let Some(existing) = duplicate {
            let constraint = match existing.row {
                CanonicalRow::Quotation(_) => "quotations_number_unique",
                _ => "bookings_reference_unique",
            };
            return Err(StoreError::Conflict(constraint.to_string()));
        }

        let id = Uuid::new_v4();
        state.records.push(StoredRecord {
            id,
            refs: *refs,
            row: row.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DealerType, FileType, ImportKind, ImportSettings, NewImportJob,
    };

    fn pending_job() -> ImportJob {
        ImportJob::new_pending(NewImportJob {
            user_id: Uuid::new_v4(),
            dealership_id: Uuid::new_v4(),
            import_kind: ImportKind::Booking,
            original_filename: "bookings.csv".to_string(),
            stored_filename: "x.csv".to_string(),
            file_size: 10,
            file_type: FileType::Csv,
            settings: ImportSettings::default(),
        })
    }

    #[tokio::test]
    async fn test_terminal_job_rejects_transitions() {
        let store = MemoryStore::new();
        let job = pending_job();
        store.create_job(&job).await.unwrap();
        store.mark_processing(job.id).await.unwrap();
        store.mark_completed(job.id, &[]).await.unwrap();

        let err = store.mark_failed(job.id, &[]).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ImportJobStatus::Completed,
                to: ImportJobStatus::Failed
            }
        ));
        let err = store
            .increment_counters(job.id, CounterDelta { processed: 1, successful: 1, failed: 0 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Frozen(_)));
    }

    #[tokio::test]
    async fn test_pending_job_can_fail_directly() {
        let store = MemoryStore::new();
        let job = pending_job();
        store.create_job(&job).await.unwrap();

        let failed = store
            .mark_failed(job.id, &[JobErrorSummary::cancelled()])
            .await
            .unwrap();
        assert_eq!(failed.status, ImportJobStatus::Failed);
        assert!(failed.completed_at.is_some());
        assert!(failed.started_at.is_none());
    }

    #[tokio::test]
    async fn test_cancel_refused_once_processing() {
        let store = MemoryStore::new();
        let job = pending_job();
        store.create_job(&job).await.unwrap();
        store.mark_processing(job.id).await.unwrap();

        let err = store
            .mark_cancelled(job.id, &[JobErrorSummary::cancelled()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ImportJobStatus::Processing,
                to: ImportJobStatus::Failed
            }
        ));
        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, ImportJobStatus::Processing);
        assert!(job.error_summary.is_empty());
    }

    #[tokio::test]
    async fn test_create_dealer_if_absent_is_idempotent() {
        let store = MemoryStore::new();
        let new = NewDealer {
            dealership_id: Uuid::new_v4(),
            code: "md001".to_string(),
            name: "Main".to_string(),
            zone: None,
            region: None,
            dealer_type: DealerType::MainDealer,
        };
        let a = store.create_dealer_if_absent(&new).await.unwrap();
        let b = store.create_dealer_if_absent(&new).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.code, "MD001");
        assert_eq!(store.dealers().len(), 1);
    }

    #[tokio::test]
    async fn test_search_advisors_scoped_to_active_tenant_users() {
        let store = MemoryStore::new();
        let tenant = Uuid::new_v4();
        let advisor = |login: &str, dealership_id: Uuid, is_active: bool| Advisor {
            id: Uuid::new_v4(),
            dealership_id,
            login: login.to_string(),
            email: Some(format!("{}@dealer.test", login)),
            display_name: login.to_uppercase(),
            is_active,
        };
        store.add_advisor(advisor("asha", tenant, true));
        store.add_advisor(advisor("ashok", tenant, false));
        store.add_advisor(advisor("asha.k", Uuid::new_v4(), true));

        let found = store.search_advisors(tenant, "ASH").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].login, "asha");
    }
}
