//! Import error log queries (append-only)

use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::types::{FieldError, ImportErrorRecord, NewImportError};

// 7 binds per row keeps a chunk well under the Postgres parameter limit
const INSERT_CHUNK: usize = 1_000;

/// Append error records for a job
pub async fn insert_errors(
    pool: &PgPool,
    job_id: Uuid,
    errors: &[NewImportError],
) -> sqlx::Result<()> {
    for chunk in errors.chunks(INSERT_CHUNK) {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO import_errors \
             (id, job_id, row_number, raw_row, error_message, error_type, field_errors) ",
        );
        builder.push_values(chunk, |mut b, err| {
            let err = storable(err);
            b.push_bind(Uuid::new_v4())
                .push_bind(job_id)
                .push_bind(err.row_number)
                .push_bind(Json(err.raw_row))
                .push_bind(err.error_message)
                .push_bind(err.error_type)
                .push_bind(Json(err.field_errors));
        });
        builder.build().execute(pool).await?;
    }
    Ok(())
}

/// Copy of an error record without NUL characters, which PostgreSQL text and
/// jsonb values cannot hold
fn storable(err: &NewImportError) -> NewImportError {
    NewImportError {
        row_number: err.row_number,
        raw_row: err
            .raw_row
            .iter()
            .map(|(key, value)| (strip_nul(key), strip_nul(value)))
            .collect(),
        error_message: strip_nul(&err.error_message),
        error_type: err.error_type,
        field_errors: err
            .field_errors
            .iter()
            .map(|f| FieldError {
                field: strip_nul(&f.field),
                message: strip_nul(&f.message),
            })
            .collect(),
    }
}

fn strip_nul(value: &str) -> String {
    value.replace('\0', "")
}

/// Page through a job's errors in row order
pub async fn list_errors(
    pool: &PgPool,
    job_id: Uuid,
    offset: i64,
    limit: i64,
) -> sqlx::Result<Vec<ImportErrorRecord>> {
    sqlx::query_as::<_, ImportErrorRecord>(
        r#"
        SELECT id, job_id, row_number, raw_row, error_message, error_type,
               field_errors, created_at
        FROM import_errors
        WHERE job_id = $1
        ORDER BY row_number ASC, created_at ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(job_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Count a job's errors
pub async fn count_errors(pool: &PgPool, job_id: Uuid) -> sqlx::Result<i64> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM import_errors WHERE job_id = $1")
        .bind(job_id)
        .fetch_one(pool)
        .await?;
    Ok(count.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImportErrorType, RawRow};

    #[test]
    fn test_storable_strips_nul_characters() {
        let mut raw = RawRow::new();
        raw.insert("customer_name".to_string(), "Asha\0 Rao".to_string());
        raw.insert("no\0te".to_string(), "\0".to_string());
        let err = NewImportError::validation(
            4,
            raw,
            vec![FieldError::new("customer_email", "'a\0@b' is not a valid email address")],
        );

        let stored = storable(&err);
        assert_eq!(stored.row_number, 4);
        assert_eq!(stored.error_type, ImportErrorType::Validation);
        assert_eq!(stored.raw_row.get("customer_name").map(String::as_str), Some("Asha Rao"));
        assert_eq!(stored.raw_row.get("note").map(String::as_str), Some(""));
        assert_eq!(stored.field_errors[0].message, "'a@b' is not a valid email address");
        assert!(!stored.error_message.contains('\0'));
        assert!(serde_json::to_string(&stored.raw_row).unwrap().find("\\u0000").is_none());
    }
}
