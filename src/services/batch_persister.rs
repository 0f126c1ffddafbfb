//! Batch persistence
//!
//! Validated rows are written in fixed-size chunks, in file order. A failing
//! row becomes a processing error record and never aborts its chunk. After
//! each chunk the job counters are incremented in one atomic update.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use super::reference_resolver::ReferenceResolver;
use crate::db::{ImportStore, RecordRefs, StoreError};
use crate::defaults::DEFAULT_BATCH_SIZE;
use crate::types::{CounterDelta, NewImportError, ValidatedRow};

/// Identity of the job the rows belong to
#[derive(Debug, Clone, Copy)]
pub struct PersistContext {
    pub job_id: Uuid,
    pub dealership_id: Uuid,
    pub user_id: Uuid,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub batches: usize,
    pub successful: u32,
    pub failed: u32,
}

pub struct BatchPersister {
    store: Arc<dyn ImportStore>,
    resolver: ReferenceResolver,
    ctx: PersistContext,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn ImportStore>, resolver: ReferenceResolver, ctx: PersistContext) -> Self {
        let batch_size = if ctx.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            ctx.batch_size
        };
        Self {
            store,
            resolver,
            ctx: PersistContext { batch_size, ..ctx },
        }
    }

    /// Persist all rows. `on_chunk` receives the running count of processed
    /// rows after each chunk. Only storage failures on the job itself (error
    /// log, counters) are returned; row failures are recorded.
    pub async fn persist<F>(
        &mut self,
        rows: Vec<ValidatedRow>,
        mut on_chunk: F,
    ) -> Result<PersistOutcome, StoreError>
    where
        F: FnMut(usize),
    {
        let mut outcome = PersistOutcome::default();
        let mut processed = 0usize;

        for chunk in rows.chunks(self.ctx.batch_size) {
            let mut delta = CounterDelta::default();
            let mut errors = Vec::new();

            for validated in chunk {
                delta.processed += 1;
                match self.persist_row(validated).await {
                    Ok(_) => delta.successful += 1,
                    Err(error) => {
                        delta.failed += 1;
                        errors.push(error);
                    }
                }
            }

            if !errors.is_empty() {
                self.store.insert_errors(self.ctx.job_id, &errors).await?;
            }
            self.store.increment_counters(self.ctx.job_id, delta).await?;

            outcome.batches += 1;
            outcome.successful += delta.successful as u32;
            outcome.failed += delta.failed as u32;
            processed += chunk.len();

            debug!(
                "Job {} chunk {}: {} ok, {} failed",
                self.ctx.job_id, outcome.batches, delta.successful, delta.failed
            );
            on_chunk(processed);
        }

        Ok(outcome)
    }

    async fn persist_row(&mut self, validated: &ValidatedRow) -> Result<Uuid, NewImportError> {
        let resolved = self.resolver.resolve(&validated.row).await.map_err(|e| {
            NewImportError::processing(
                validated.row_number,
                validated.raw.clone(),
                e.to_string(),
                e.field(),
            )
        })?;

        let refs = RecordRefs {
            dealership_id: self.ctx.dealership_id,
            created_by: self.ctx.user_id,
            import_job_id: self.ctx.job_id,
            dealer_id: resolved.dealer_id,
            advisor_id: resolved.advisor_id,
        };

        self.store
            .create_record(&refs, &validated.row)
            .await
            .map_err(|e| {
                let field = conflict_field(&e);
                let message = match field {
                    Some(field) => format!("duplicate {}", field),
                    None => e.to_string(),
                };
                NewImportError::processing(validated.row_number, validated.raw.clone(), message, field)
            })
    }
}

fn conflict_field(err: &StoreError) -> Option<&'static str> {
    match err {
        StoreError::Conflict(constraint) if constraint.contains("reference") => {
            Some("booking_reference")
        }
        StoreError::Conflict(constraint) if constraint.contains("number") => {
            Some("quotation_number")
        }
        _ => None,
    }
}
