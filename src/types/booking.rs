//! Booking types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::import::{normalize_token, DealerRef, LeadSource};

/// Booking status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Allotted,
    Delivered,
    Cancelled,
}

impl BookingStatus {
    pub const ALLOWED: &'static [&'static str] =
        &["pending", "confirmed", "allotted", "delivered", "cancelled"];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Allotted => "allotted",
            BookingStatus::Delivered => "delivered",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "pending" | "booked" | "new" => Some(BookingStatus::Pending),
            "confirmed" => Some(BookingStatus::Confirmed),
            "allotted" | "alloted" | "allocated" => Some(BookingStatus::Allotted),
            "delivered" => Some(BookingStatus::Delivered),
            "cancelled" | "canceled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// Canonical booking row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRow {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub dealer: DealerRef,
    pub booking_reference: Option<String>,
    pub vehicle_model: Option<String>,
    pub variant: Option<String>,
    pub color: Option<String>,
    pub booking_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    /// Minor currency units
    pub booking_amount: Option<i64>,
    pub status: BookingStatus,
    pub source: Option<LeadSource>,
    pub advisor: Option<String>,
    pub remarks: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_status_parse_normalizes() {
        assert_eq!(BookingStatus::parse(" Confirmed "), Some(BookingStatus::Confirmed));
        assert_eq!(BookingStatus::parse("CANCELED"), Some(BookingStatus::Cancelled));
        assert_eq!(BookingStatus::parse("on hold"), None);
    }

    #[test]
    fn test_booking_status_defaults_to_pending() {
        assert_eq!(BookingStatus::default(), BookingStatus::Pending);
        assert_eq!(BookingStatus::default().as_str(), "pending");
    }
}
