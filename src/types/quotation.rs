//! Quotation types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::import::{normalize_token, DealerRef};

/// Quotation status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotationStatus {
    #[default]
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

impl QuotationStatus {
    pub const ALLOWED: &'static [&'static str] =
        &["draft", "sent", "accepted", "rejected", "expired"];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationStatus::Draft => "draft",
            QuotationStatus::Sent => "sent",
            QuotationStatus::Accepted => "accepted",
            QuotationStatus::Rejected => "rejected",
            QuotationStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "draft" => Some(QuotationStatus::Draft),
            "sent" | "shared" | "issued" => Some(QuotationStatus::Sent),
            "accepted" | "approved" => Some(QuotationStatus::Accepted),
            "rejected" | "declined" => Some(QuotationStatus::Rejected),
            "expired" => Some(QuotationStatus::Expired),
            _ => None,
        }
    }
}

/// Canonical quotation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotationRow {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub dealer: DealerRef,
    pub quotation_number: Option<String>,
    pub vehicle_model: String,
    pub variant: Option<String>,
    /// Minor currency units
    pub quoted_price: i64,
    /// Minor currency units
    pub discount: Option<i64>,
    pub quotation_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub status: QuotationStatus,
    pub advisor: Option<String>,
    pub remarks: Option<String>,
}
