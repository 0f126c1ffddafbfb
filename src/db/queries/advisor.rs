//! Advisor (user directory) lookups

use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Advisor;

const MAX_CANDIDATES: i64 = 10;

/// Get a user by ID regardless of tenant (the caller applies the tenant guard)
pub async fn get_advisor(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Option<Advisor>> {
    sqlx::query_as::<_, Advisor>(
        r#"
        SELECT id, dealership_id, login, email, display_name, is_active
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Candidate advisors within one tenant for a free-text reference
pub async fn search_advisors(
    pool: &PgPool,
    dealership_id: Uuid,
    term: &str,
) -> sqlx::Result<Vec<Advisor>> {
    let pattern = format!("%{}%", escape_like(term));
    sqlx::query_as::<_, Advisor>(
        r#"
        SELECT id, dealership_id, login, email, display_name, is_active
        FROM users
        WHERE dealership_id = $1
          AND is_active
          AND (login ILIKE $2 OR email ILIKE $2 OR LOWER(display_name) = LOWER($3))
        ORDER BY display_name ASC
        LIMIT $4
        "#,
    )
    .bind(dealership_id)
    .bind(pattern)
    .bind(term)
    .bind(MAX_CANDIDATES)
    .fetch_all(pool)
    .await
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
