//! Enquiry types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::import::{normalize_token, DealerRef, LeadSource};

/// Enquiry temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnquiryCategory {
    Hot,
    #[default]
    Warm,
    Cold,
}

impl EnquiryCategory {
    pub const ALLOWED: &'static [&'static str] = &["hot", "warm", "cold"];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryCategory::Hot => "hot",
            EnquiryCategory::Warm => "warm",
            EnquiryCategory::Cold => "cold",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "hot" => Some(EnquiryCategory::Hot),
            "warm" => Some(EnquiryCategory::Warm),
            "cold" => Some(EnquiryCategory::Cold),
            _ => None,
        }
    }
}

/// Enquiry status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnquiryStatus {
    #[default]
    Open,
    Contacted,
    FollowUp,
    Converted,
    Lost,
}

impl EnquiryStatus {
    pub const ALLOWED: &'static [&'static str] =
        &["open", "contacted", "follow_up", "converted", "lost"];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryStatus::Open => "open",
            EnquiryStatus::Contacted => "contacted",
            EnquiryStatus::FollowUp => "follow_up",
            EnquiryStatus::Converted => "converted",
            EnquiryStatus::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "open" | "new" => Some(EnquiryStatus::Open),
            "contacted" => Some(EnquiryStatus::Contacted),
            "follow_up" | "followup" => Some(EnquiryStatus::FollowUp),
            "converted" | "booked" => Some(EnquiryStatus::Converted),
            "lost" | "closed" => Some(EnquiryStatus::Lost),
            _ => None,
        }
    }
}

/// Canonical enquiry row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnquiryRow {
    pub customer_name: String,
    pub customer_contact: String,
    pub customer_email: Option<String>,
    pub enquiry_date: NaiveDate,
    pub expected_date: NaiveDate,
    pub dealer: Option<DealerRef>,
    pub vehicle_model: Option<String>,
    pub variant: Option<String>,
    pub category: EnquiryCategory,
    pub source: Option<LeadSource>,
    pub status: EnquiryStatus,
    pub advisor: Option<String>,
    pub remarks: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enquiry_status_accepts_spaced_values() {
        assert_eq!(EnquiryStatus::parse("Follow Up"), Some(EnquiryStatus::FollowUp));
        assert_eq!(EnquiryStatus::parse("follow-up"), Some(EnquiryStatus::FollowUp));
    }

    #[test]
    fn test_enquiry_category_rejects_unknown() {
        assert_eq!(EnquiryCategory::parse("HOT"), Some(EnquiryCategory::Hot));
        assert_eq!(EnquiryCategory::parse("lukewarm"), None);
    }
}
