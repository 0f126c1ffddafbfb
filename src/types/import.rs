//! Import types shared by the parser, validator and persister

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

use super::booking::BookingRow;
use super::enquiry::EnquiryRow;
use super::quotation::QuotationRow;

/// One parsed row: normalized header -> raw cell value, as received.
pub type RawRow = BTreeMap<String, String>;

/// Kind of business record carried by an import file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "import_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    Booking,
    Enquiry,
    Quotation,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Booking => "booking",
            ImportKind::Enquiry => "enquiry",
            ImportKind::Quotation => "quotation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "booking" | "bookings" => Some(ImportKind::Booking),
            "enquiry" | "enquiries" | "inquiry" | "inquiries" => Some(ImportKind::Enquiry),
            "quotation" | "quotations" | "quote" | "quotes" => Some(ImportKind::Quotation),
            _ => None,
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uploaded file format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "import_file_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// Delimited text (comma, semicolon or tab)
    Csv,
    /// First sheet of an xlsx/xls/xlsb/ods workbook
    Spreadsheet,
}

impl FileType {
    /// Detect the file type from the uploaded file name
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" | "tsv" => Some(FileType::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Some(FileType::Spreadsheet),
            _ => None,
        }
    }
}

/// Stage at which a row failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "import_error_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ImportErrorType {
    /// Structurally broken row (e.g. wrong column count)
    Parse,
    /// Row failed a field rule and never reached the persister
    Validation,
    /// Validated row failed at persistence time
    Processing,
}

impl ImportErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportErrorType::Parse => "parse",
            ImportErrorType::Validation => "validation",
            ImportErrorType::Processing => "processing",
        }
    }
}

/// A single field-level problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Joins field errors into the human-readable message stored on the error record
pub fn describe_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Persisted per-row error
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ImportErrorRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub row_number: i32,
    #[sqlx(json)]
    pub raw_row: RawRow,
    pub error_message: String,
    pub error_type: ImportErrorType,
    #[sqlx(json)]
    pub field_errors: Vec<FieldError>,
    pub created_at: DateTime<Utc>,
}

/// Error record before it is written
#[derive(Debug, Clone)]
pub struct NewImportError {
    pub row_number: i32,
    pub raw_row: RawRow,
    pub error_message: String,
    pub error_type: ImportErrorType,
    pub field_errors: Vec<FieldError>,
}

impl NewImportError {
    pub fn validation(row_number: i32, raw_row: RawRow, field_errors: Vec<FieldError>) -> Self {
        Self {
            row_number,
            raw_row,
            error_message: describe_field_errors(&field_errors),
            error_type: ImportErrorType::Validation,
            field_errors,
        }
    }

    pub fn parse(row_number: i32, raw_row: RawRow, message: impl Into<String>) -> Self {
        Self {
            row_number,
            raw_row,
            error_message: message.into(),
            error_type: ImportErrorType::Parse,
            field_errors: vec![],
        }
    }

    pub fn processing(
        row_number: i32,
        raw_row: RawRow,
        message: impl Into<String>,
        field: Option<&str>,
    ) -> Self {
        let message = message.into();
        let field_errors = field
            .map(|f| vec![FieldError::new(f, message.clone())])
            .unwrap_or_default();
        Self {
            row_number,
            raw_row,
            error_message: message,
            error_type: ImportErrorType::Processing,
            field_errors,
        }
    }
}

/// Free-form settings supplied with an upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportSettings {
    /// Source header -> canonical field name
    pub column_mapping: HashMap<String, String>,
    /// Advisor used when a row names none (user id, login, email or name)
    pub default_assignee: Option<String>,
    /// Overrides the configured persistence chunk size
    pub batch_size: Option<usize>,
}

/// Customer lead source, shared by bookings and enquiries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    WalkIn,
    Phone,
    Website,
    Referral,
    SocialMedia,
    Event,
    Other,
}

impl LeadSource {
    pub const ALLOWED: &'static [&'static str] = &[
        "walk_in", "phone", "website", "referral", "social_media", "event", "other",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::WalkIn => "walk_in",
            LeadSource::Phone => "phone",
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::SocialMedia => "social_media",
            LeadSource::Event => "event",
            LeadSource::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match normalize_token(s).as_str() {
            "walk_in" | "walkin" | "showroom" => Some(LeadSource::WalkIn),
            "phone" | "call" | "telephone" => Some(LeadSource::Phone),
            "website" | "web" | "online" => Some(LeadSource::Website),
            "referral" | "reference" => Some(LeadSource::Referral),
            "social_media" | "social" => Some(LeadSource::SocialMedia),
            "event" | "exhibition" | "camp" => Some(LeadSource::Event),
            "other" => Some(LeadSource::Other),
            _ => None,
        }
    }
}

/// Normalizes an enumerated cell value: trim, lower-case, spaces and hyphens to `_`
pub fn normalize_token(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Validated, typed representation of one input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CanonicalRow {
    Booking(BookingRow),
    Enquiry(EnquiryRow),
    Quotation(QuotationRow),
}

impl CanonicalRow {
    pub fn kind(&self) -> ImportKind {
        match self {
            CanonicalRow::Booking(_) => ImportKind::Booking,
            CanonicalRow::Enquiry(_) => ImportKind::Enquiry,
            CanonicalRow::Quotation(_) => ImportKind::Quotation,
        }
    }

    /// Dealer reference carried by the row, if any
    pub fn dealer_ref(&self) -> Option<&DealerRef> {
        match self {
            CanonicalRow::Booking(row) => Some(&row.dealer),
            CanonicalRow::Enquiry(row) => row.dealer.as_ref(),
            CanonicalRow::Quotation(row) => Some(&row.dealer),
        }
    }

    /// Advisor reference carried by the row, if any
    pub fn advisor_ref(&self) -> Option<&str> {
        match self {
            CanonicalRow::Booking(row) => row.advisor.as_deref(),
            CanonicalRow::Enquiry(row) => row.advisor.as_deref(),
            CanonicalRow::Quotation(row) => row.advisor.as_deref(),
        }
    }
}

/// Denormalized dealer fields carried by a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealerRef {
    pub code: String,
    pub name: Option<String>,
    pub zone: Option<String>,
    pub region: Option<String>,
}

/// A row that passed validation, with its origin kept for error reporting
#[derive(Debug, Clone)]
pub struct ValidatedRow {
    pub row_number: i32,
    pub raw: RawRow,
    pub row: CanonicalRow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_token_folds_case_and_separators() {
        assert_eq!(normalize_token("  Walk In "), "walk_in");
        assert_eq!(normalize_token("SOCIAL-MEDIA"), "social_media");
        assert_eq!(normalize_token("follow  up"), "follow_up");
    }

    #[test]
    fn test_lead_source_parse_accepts_aliases() {
        assert_eq!(LeadSource::parse("Walk-In"), Some(LeadSource::WalkIn));
        assert_eq!(LeadSource::parse("web"), Some(LeadSource::Website));
        assert_eq!(LeadSource::parse("billboard"), None);
    }

    #[test]
    fn test_file_type_from_filename() {
        assert_eq!(FileType::from_filename("bookings.CSV"), Some(FileType::Csv));
        assert_eq!(FileType::from_filename("q3.xlsx"), Some(FileType::Spreadsheet));
        assert_eq!(FileType::from_filename("legacy.ods"), Some(FileType::Spreadsheet));
        assert_eq!(FileType::from_filename("notes.pdf"), None);
        assert_eq!(FileType::from_filename("no_extension"), None);
    }

    #[test]
    fn test_import_kind_parse_and_display() {
        assert_eq!(ImportKind::parse("Enquiries"), Some(ImportKind::Enquiry));
        assert_eq!(ImportKind::parse("quote"), Some(ImportKind::Quotation));
        assert_eq!(ImportKind::Booking.to_string(), "booking");
    }

    #[test]
    fn test_validation_error_message_joins_fields() {
        let err = NewImportError::validation(
            3,
            RawRow::new(),
            vec![
                FieldError::new("customer_name", "is required"),
                FieldError::new("customer_phone", "must be in international format"),
            ],
        );
        assert_eq!(err.error_type, ImportErrorType::Validation);
        assert_eq!(
            err.error_message,
            "customer_name: is required; customer_phone: must be in international format"
        );
    }

    #[test]
    fn test_import_settings_deserializes_camel_case_with_defaults() {
        let json = r#"{"columnMapping":{"Mobile No":"customer_phone"}}"#;
        let settings: ImportSettings = serde_json::from_str(json).unwrap();
        assert_eq!(
            settings.column_mapping.get("Mobile No").map(String::as_str),
            Some("customer_phone")
        );
        assert!(settings.default_assignee.is_none());
        assert!(settings.batch_size.is_none());
    }
}
