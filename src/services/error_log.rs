//! Import error log: append, page, export

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::db::{ImportStore, StoreError};
use crate::types::{ImportErrorRecord, NewImportError};

const MAX_PER_PAGE: i64 = 500;
const EXPORT_PAGE: i64 = 1_000;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One page of a job's error records
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub errors: Vec<ImportErrorRecord>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Clone)]
pub struct ErrorLog {
    store: Arc<dyn ImportStore>,
}

impl ErrorLog {
    pub fn new(store: Arc<dyn ImportStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, job_id: Uuid, errors: &[NewImportError]) -> Result<(), StoreError> {
        if errors.is_empty() {
            return Ok(());
        }
        self.store.insert_errors(job_id, errors).await
    }

    /// 1-based page of errors in row order
    pub async fn page(&self, job_id: Uuid, page: i64, per_page: i64) -> Result<ErrorPage, StoreError> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let total = self.store.count_errors(job_id).await?;
        let errors = self
            .store
            .list_errors(job_id, (page - 1) * per_page, per_page)
            .await?;
        Ok(ErrorPage {
            errors,
            total,
            page,
            per_page,
        })
    }

    /// CSV with columns `rowNumber,errorMessage,rawRow` (raw row as JSON)
    pub async fn export_csv(&self, job_id: Uuid) -> Result<(Vec<u8>, usize), ExportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["rowNumber", "errorMessage", "rawRow"])?;

        let mut offset = 0;
        let mut written = 0usize;
        loop {
            let batch = self.store.list_errors(job_id, offset, EXPORT_PAGE).await?;
            for error in &batch {
                let raw = serde_json::to_string(&error.raw_row)?;
                writer.write_record([
                    error.row_number.to_string().as_str(),
                    error.error_message.as_str(),
                    raw.as_str(),
                ])?;
            }
            written += batch.len();
            if (batch.len() as i64) < EXPORT_PAGE {
                break;
            }
            offset += EXPORT_PAGE;
        }

        let bytes = writer.into_inner().map_err(|e| e.into_error())?;
        Ok((bytes, written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::types::{
        FieldError, FileType, ImportJob, ImportKind, ImportSettings, NewImportJob, RawRow,
    };

    async fn job_with_errors(store: &Arc<MemoryStore>, count: i32) -> Uuid {
        let job = ImportJob::new_pending(NewImportJob {
            user_id: Uuid::new_v4(),
            dealership_id: Uuid::new_v4(),
            import_kind: ImportKind::Enquiry,
            original_filename: "e.csv".to_string(),
            stored_filename: "e.csv".to_string(),
            file_size: 1,
            file_type: FileType::Csv,
            settings: ImportSettings::default(),
        });
        store.create_job(&job).await.unwrap();

        let errors: Vec<NewImportError> = (1..=count)
            .rev()
            .map(|n| {
                let mut raw = RawRow::new();
                raw.insert("customer_name".to_string(), format!("Name, {}", n));
                NewImportError::validation(
                    n,
                    raw,
                    vec![FieldError::new("customer_contact", "is required")],
                )
            })
            .collect();
        ErrorLog::new(store.clone()).append(job.id, &errors).await.unwrap();
        job.id
    }

    #[tokio::test]
    async fn test_page_orders_by_row_number() {
        let store = Arc::new(MemoryStore::new());
        let job_id = job_with_errors(&store, 5).await;
        let log = ErrorLog::new(store);

        let page = log.page(job_id, 2, 2).await.unwrap();
        assert_eq!(page.total, 5);
        let rows: Vec<i32> = page.errors.iter().map(|e| e.row_number).collect();
        assert_eq!(rows, vec![3, 4]);

        let clamped = log.page(job_id, 0, 0).await.unwrap();
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.per_page, 1);
    }

    #[tokio::test]
    async fn test_export_csv_quotes_raw_row_json() {
        let store = Arc::new(MemoryStore::new());
        let job_id = job_with_errors(&store, 2).await;

        let (bytes, count) = ErrorLog::new(store).export_csv(job_id).await.unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("rowNumber,errorMessage,rawRow"));

        let mut reader = csv::Reader::from_reader(text.as_bytes());
        let first = reader.records().next().unwrap().unwrap();
        assert_eq!(&first[0], "1");
        assert_eq!(&first[1], "customer_contact: is required");
        assert_eq!(&first[2], r#"{"customer_name":"Name, 1"}"#);
    }
}
