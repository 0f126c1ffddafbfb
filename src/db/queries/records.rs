//! Business record inserts (bookings, enquiries, quotations)
//!
//! Status, category and source columns are TEXT with CHECK constraints;
//! values are already canonical by the time they reach this layer.

use sqlx::PgPool;
use uuid::Uuid;

use crate::db::RecordRefs;
use crate::types::{BookingRow, EnquiryRow, QuotationRow};

pub async fn insert_booking(
    pool: &PgPool,
    refs: &RecordRefs,
    row: &BookingRow,
) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO bookings (
            id, dealership_id, dealer_id, advisor_id, import_job_id, created_by,
            customer_name, customer_phone, customer_email, booking_reference,
            vehicle_model, variant, color, booking_date, expected_delivery_date,
            booking_amount, status, source, remarks, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, NOW())
        "#,
    )
    .bind(id)
    .bind(refs.dealership_id)
    .bind(refs.dealer_id)
    .bind(refs.advisor_id)
    .bind(refs.import_job_id)
    .bind(refs.created_by)
    .bind(&row.customer_name)
    .bind(&row.customer_phone)
    .bind(&row.customer_email)
    .bind(&row.booking_reference)
    .bind(&row.vehicle_model)
    .bind(&row.variant)
    .bind(&row.color)
    .bind(row.booking_date)
    .bind(row.expected_delivery_date)
    .bind(row.booking_amount)
    .bind(row.status.as_str())
    .bind(row.source.map(|s| s.as_str()))
    .bind(&row.remarks)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn insert_enquiry(
    pool: &PgPool,
    refs: &RecordRefs,
    row: &EnquiryRow,
) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO enquiries (
            id, dealership_id, dealer_id, advisor_id, import_job_id, created_by,
            customer_name, customer_contact, customer_email, enquiry_date,
            expected_date, vehicle_model, variant, category, source, status,
            remarks, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, NOW())
        "#,
    )
    .bind(id)
    .bind(refs.dealership_id)
    .bind(refs.dealer_id)
    .bind(refs.advisor_id)
    .bind(refs.import_job_id)
    .bind(refs.created_by)
    .bind(&row.customer_name)
    .bind(&row.customer_contact)
    .bind(&row.customer_email)
    .bind(row.enquiry_date)
    .bind(row.expected_date)
    .bind(&row.vehicle_model)
    .bind(&row.variant)
    .bind(row.category.as_str())
    .bind(row.source.map(|s| s.as_str()))
    .bind(row.status.as_str())
    .bind(&row.remarks)
    .execute(pool)
    .await?;

    Ok(id)
}

pub async fn insert_quotation(
    pool: &PgPool,
    refs: &RecordRefs,
    row: &QuotationRow,
) -> sqlx::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO quotations (
            id, dealership_id, dealer_id, advisor_id, import_job_id, created_by,
            customer_name, customer_phone, customer_email, quotation_number,
            vehicle_model, variant, quoted_price, discount, quotation_date,
            valid_until, status, remarks, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, NOW())
        "#,
    )
    .bind(id)
    .bind(refs.dealership_id)
    .bind(refs.dealer_id)
    .bind(refs.advisor_id)
    .bind(refs.import_job_id)
    .bind(refs.created_by)
    .bind(&row.customer_name)
    .bind(&row.customer_phone)
    .bind(&row.customer_email)
    .bind(&row.quotation_number)
    .bind(&row.vehicle_model)
    .bind(&row.variant)
    .bind(row.quoted_price)
    .bind(row.discount)
    .bind(row.quotation_date)
    .bind(row.valid_until)
    .bind(row.status.as_str())
    .bind(&row.remarks)
    .execute(pool)
    .await?;

    Ok(id)
}
