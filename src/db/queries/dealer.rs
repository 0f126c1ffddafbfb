//! Dealer database queries

use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Dealer, NewDealer};

/// Find dealer by code (codes are stored upper-case and unique across tenants)
pub async fn find_dealer_by_code(pool: &PgPool, code: &str) -> sqlx::Result<Option<Dealer>> {
    sqlx::query_as::<_, Dealer>(
        r#"
        SELECT id, dealership_id, code, name, zone, region, dealer_type,
               auto_created, created_at
        FROM dealers
        WHERE code = UPPER($1)
        "#,
    )
    .bind(code)
    .fetch_optional(pool)
    .await
}

/// Insert an auto-created dealer. Returns `None` when the code already exists.
pub async fn insert_dealer_if_absent(
    pool: &PgPool,
    dealer: &NewDealer,
) -> sqlx::Result<Option<Dealer>> {
    sqlx::query_as::<_, Dealer>(
        r#"
        INSERT INTO dealers (
            id, dealership_id, code, name, zone, region, dealer_type,
            auto_created, created_at
        )
        VALUES ($1, $2, UPPER($3), $4, $5, $6, $7, TRUE, NOW())
        ON CONFLICT (code) DO NOTHING
        RETURNING id, dealership_id, code, name, zone, region, dealer_type,
                  auto_created, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(dealer.dealership_id)
    .bind(&dealer.code)
    .bind(&dealer.name)
    .bind(&dealer.zone)
    .bind(&dealer.region)
    .bind(dealer.dealer_type)
    .fetch_optional(pool)
    .await
}
