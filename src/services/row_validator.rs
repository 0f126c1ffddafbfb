//! Per-row validation
//!
//! Pure and stateless: a raw row goes in, a canonical row or the full
//! list of field errors comes out. "Today" is injected so results do not
//! depend on the wall clock.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{
    BookingRow, BookingStatus, CanonicalRow, DealerRef, EnquiryCategory, EnquiryRow,
    EnquiryStatus, FieldError, ImportKind, LeadSource, QuotationRow, QuotationStatus, RawRow,
};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid static email pattern")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+[1-9]\d{9,14}$").expect("valid static phone pattern"));

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 255;
const TEXT_MAX: usize = 255;
/// zone, region and colour columns are VARCHAR(100)
const SHORT_TEXT_MAX: usize = 100;
const EMAIL_MAX: usize = 255;
const REFERENCE_MAX: usize = 64;
const DEALER_CODE_MAX: usize = 50;
const REMARKS_MAX: usize = 2000;

// Header aliases, canonical name first
const CUSTOMER_NAME: &[&str] = &["customer_name", "name", "customer"];
const CUSTOMER_PHONE: &[&str] = &[
    "customer_phone", "customer_contact", "phone", "mobile", "mobile_no", "contact",
];
const CUSTOMER_CONTACT: &[&str] = &[
    "customer_contact", "customer_phone", "phone", "mobile", "mobile_no", "contact",
];
const CUSTOMER_EMAIL: &[&str] = &["customer_email", "email"];
const DEALER_CODE: &[&str] = &["dealer_code", "dealer"];
const DEALER_NAME: &[&str] = &["dealer_name"];
const ZONE: &[&str] = &["zone"];
const REGION: &[&str] = &["region"];
const VEHICLE_MODEL: &[&str] = &["vehicle_model", "model"];
const VARIANT: &[&str] = &["variant"];
const COLOR: &[&str] = &["color", "colour"];
const SOURCE: &[&str] = &["source", "lead_source"];
const STATUS: &[&str] = &["status"];
const ADVISOR: &[&str] = &["advisor", "assigned_to", "sales_advisor", "advisor_id"];
const REMARKS: &[&str] = &["remarks", "notes"];
const BOOKING_REFERENCE: &[&str] = &["booking_reference", "booking_no", "booking_number"];
const BOOKING_DATE: &[&str] = &["booking_date", "date"];
const EXPECTED_DELIVERY: &[&str] = &["expected_delivery_date", "delivery_date"];
const BOOKING_AMOUNT: &[&str] = &["booking_amount", "amount"];
const ENQUIRY_DATE: &[&str] = &["date", "enquiry_date"];
const EXPECTED_DATE: &[&str] = &["expected_date", "expected_purchase_date", "follow_up_date"];
const CATEGORY: &[&str] = &["category"];
const QUOTATION_NUMBER: &[&str] = &["quotation_number", "quote_no", "quotation_no"];
const QUOTED_PRICE: &[&str] = &["quoted_price", "price", "amount"];
const DISCOUNT: &[&str] = &["discount"];
const QUOTATION_DATE: &[&str] = &["quotation_date", "date"];
const VALID_UNTIL: &[&str] = &["valid_until"];

/// Validator for one import kind
#[derive(Debug, Clone, Copy)]
pub struct RowValidator {
    kind: ImportKind,
    today: NaiveDate,
}

impl RowValidator {
    pub fn new(kind: ImportKind, today: NaiveDate) -> Self {
        Self { kind, today }
    }

    pub fn kind(&self) -> ImportKind {
        self.kind
    }

    /// Validate a raw row, collecting every field error
    pub fn validate(&self, raw: &RawRow) -> Result<CanonicalRow, Vec<FieldError>> {
        let mut fields = FieldReader::new(raw, self.today);
        let row = match self.kind {
            ImportKind::Booking => validate_booking(&mut fields).map(CanonicalRow::Booking),
            ImportKind::Enquiry => validate_enquiry(&mut fields).map(CanonicalRow::Enquiry),
            ImportKind::Quotation => validate_quotation(&mut fields).map(CanonicalRow::Quotation),
        };
        match row {
            Some(row) if fields.errors.is_empty() => Ok(row),
            _ => Err(fields.errors),
        }
    }
}

fn validate_booking(f: &mut FieldReader<'_>) -> Option<BookingRow> {
    let customer_name = f.name("customer_name", CUSTOMER_NAME);
    let customer_phone = f.phone("customer_phone", CUSTOMER_PHONE);
    let customer_email = f.email("customer_email", CUSTOMER_EMAIL);
    let dealer = f.dealer(true);
    let booking_reference = f.bounded_text("booking_reference", BOOKING_REFERENCE, REFERENCE_MAX);
    let vehicle_model = f.bounded_text("vehicle_model", VEHICLE_MODEL, TEXT_MAX);
    let variant = f.bounded_text("variant", VARIANT, TEXT_MAX);
    let color = f.bounded_text("color", COLOR, SHORT_TEXT_MAX);
    let booking_date = f.date("booking_date", BOOKING_DATE, false);
    let expected_delivery_date = f.date("expected_delivery_date", EXPECTED_DELIVERY, true);
    let booking_amount = f.money("booking_amount", BOOKING_AMOUNT, false);
    let status = f.enumerated("status", STATUS, BookingStatus::parse, BookingStatus::ALLOWED);
    let source = f.enumerated("source", SOURCE, LeadSource::parse, LeadSource::ALLOWED);
    let advisor = f.text(ADVISOR);
    let remarks = f.bounded_text("remarks", REMARKS, REMARKS_MAX);

    Some(BookingRow {
        customer_name: customer_name?,
        customer_phone: customer_phone?,
        customer_email,
        dealer: dealer?,
        booking_reference,
        vehicle_model,
        variant,
        color,
        booking_date,
        expected_delivery_date,
        booking_amount,
        status: status.unwrap_or_default(),
        source,
        advisor,
        remarks,
    })
}

fn validate_enquiry(f: &mut FieldReader<'_>) -> Option<EnquiryRow> {
    let customer_name = f.name("customer_name", CUSTOMER_NAME);
    let customer_contact = f.phone("customer_contact", CUSTOMER_CONTACT);
    let customer_email = f.email("customer_email", CUSTOMER_EMAIL);
    let enquiry_date = f.date("date", ENQUIRY_DATE, false);
    let expected_date = f.required_date("expected_date", EXPECTED_DATE, true);
    let dealer = f.dealer(false);
    let vehicle_model = f.bounded_text("vehicle_model", VEHICLE_MODEL, TEXT_MAX);
    let variant = f.bounded_text("variant", VARIANT, TEXT_MAX);
    let category = f.enumerated("category", CATEGORY, EnquiryCategory::parse, EnquiryCategory::ALLOWED);
    let source = f.enumerated("source", SOURCE, LeadSource::parse, LeadSource::ALLOWED);
    let status = f.enumerated("status", STATUS, EnquiryStatus::parse, EnquiryStatus::ALLOWED);
    let advisor = f.text(ADVISOR);
    let remarks = f.bounded_text("remarks", REMARKS, REMARKS_MAX);

    Some(EnquiryRow {
        customer_name: customer_name?,
        customer_contact: customer_contact?,
        customer_email,
        enquiry_date: enquiry_date.unwrap_or(f.today),
        expected_date: expected_date?,
        dealer,
        vehicle_model,
        variant,
        category: category.unwrap_or_default(),
        source,
        status: status.unwrap_or_default(),
        advisor,
        remarks,
    })
}

fn validate_quotation(f: &mut FieldReader<'_>) -> Option<QuotationRow> {
    let customer_name = f.name("customer_name", CUSTOMER_NAME);
    let customer_phone = f.phone("customer_phone", CUSTOMER_PHONE);
    let customer_email = f.email("customer_email", CUSTOMER_EMAIL);
    let dealer = f.dealer(true);
    let quotation_number = f.bounded_text("quotation_number", QUOTATION_NUMBER, REFERENCE_MAX);
    let vehicle_model = f.required_text("vehicle_model", VEHICLE_MODEL, TEXT_MAX);
    let variant = f.bounded_text("variant", VARIANT, TEXT_MAX);
    let quoted_price = f.money("quoted_price", QUOTED_PRICE, true);
    let discount = f.money("discount", DISCOUNT, false);
    let quotation_date = f.date("quotation_date", QUOTATION_DATE, false);
    let valid_until = f.date("valid_until", VALID_UNTIL, true);
    let status = f.enumerated("status", STATUS, QuotationStatus::parse, QuotationStatus::ALLOWED);
    let advisor = f.text(ADVISOR);
    let remarks = f.bounded_text("remarks", REMARKS, REMARKS_MAX);

    if let Some(price) = quoted_price {
        if price == 0 {
            f.error("quoted_price", "must be greater than zero");
        }
        if let Some(discount) = discount {
            if discount > price {
                f.error("discount", "must not exceed quoted_price");
            }
        }
    }

    Some(QuotationRow {
        customer_name: customer_name?,
        customer_phone: customer_phone?,
        customer_email,
        dealer: dealer?,
        quotation_number,
        vehicle_model: vehicle_model?,
        variant,
        quoted_price: quoted_price?,
        discount,
        quotation_date,
        valid_until,
        status: status.unwrap_or_default(),
        advisor,
        remarks,
    })
}

/// Reads fields from a raw row and accumulates errors
struct FieldReader<'a> {
    raw: &'a RawRow,
    today: NaiveDate,
    errors: Vec<FieldError>,
}

impl<'a> FieldReader<'a> {
    fn new(raw: &'a RawRow, today: NaiveDate) -> Self {
        Self {
            raw,
            today,
            errors: Vec::new(),
        }
    }

    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// First non-blank value among the aliases
    fn text(&self, aliases: &[&str]) -> Option<String> {
        aliases
            .iter()
            .filter_map(|key| self.raw.get(*key))
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn bounded_text(&mut self, field: &str, aliases: &[&str], max: usize) -> Option<String> {
        let value = self.text(aliases)?;
        if value.chars().count() > max {
            self.error(field, format!("must be at most {} characters", max));
            return None;
        }
        Some(value)
    }

    fn required_text(&mut self, field: &str, aliases: &[&str], max: usize) -> Option<String> {
        if self.text(aliases).is_none() {
            self.error(field, "is required");
            return None;
        }
        self.bounded_text(field, aliases, max)
    }

    fn name(&mut self, field: &str, aliases: &[&str]) -> Option<String> {
        let Some(value) = self.text(aliases) else {
            self.error(field, "is required");
            return None;
        };
        let len = value.chars().count();
        if !(NAME_MIN..=NAME_MAX).contains(&len) {
            self.error(field, format!("must be {}-{} characters", NAME_MIN, NAME_MAX));
            return None;
        }
        Some(value)
    }

    fn phone(&mut self, field: &str, aliases: &[&str]) -> Option<String> {
        let Some(value) = self.text(aliases) else {
            self.error(field, "is required");
            return None;
        };
        match normalize_phone(&value) {
            Some(phone) => Some(phone),
            None => {
                self.error(
                    field,
                    format!(
                        "'{}' must be in international format (+, country code, 10+ digits)",
                        value
                    ),
                );
                None
            }
        }
    }

    fn email(&mut self, field: &str, aliases: &[&str]) -> Option<String> {
        let value = self.text(aliases)?;
        if value.chars().count() > EMAIL_MAX {
            self.error(field, format!("must be at most {} characters", EMAIL_MAX));
            None
        } else if EMAIL_RE.is_match(&value) {
            Some(value.to_lowercase())
        } else {
            self.error(field, format!("'{}' is not a valid email address", value));
            None
        }
    }

    fn date(&mut self, field: &str, aliases: &[&str], not_past: bool) -> Option<NaiveDate> {
        let value = self.text(aliases)?;
        let Some(date) = parse_date(&value) else {
            self.error(
                field,
                format!("'{}' is not a valid date (expected ISO-8601 or DD-MM-YYYY)", value),
            );
            return None;
        };
        if not_past && date < self.today {
            self.error(field, format!("{} is in the past", date));
            return None;
        }
        Some(date)
    }

    fn required_date(&mut self, field: &str, aliases: &[&str], not_past: bool) -> Option<NaiveDate> {
        if self.text(aliases).is_none() {
            self.error(field, "is required");
            return None;
        }
        self.date(field, aliases, not_past)
    }

    fn money(&mut self, field: &str, aliases: &[&str], required: bool) -> Option<i64> {
        let Some(value) = self.text(aliases) else {
            if required {
                self.error(field, "is required");
            }
            return None;
        };
        match parse_money(&value) {
            Some(amount) => Some(amount),
            None => {
                self.error(field, format!("'{}' is not a valid non-negative amount", value));
                None
            }
        }
    }

    fn enumerated<T>(
        &mut self,
        field: &str,
        aliases: &[&str],
        parse: fn(&str) -> Option<T>,
        allowed: &[&str],
    ) -> Option<T> {
        let value = self.text(aliases)?;
        match parse(&value) {
            Some(parsed) => Some(parsed),
            None => {
                self.error(
                    field,
                    format!("'{}' is not one of: {}", value, allowed.join(", ")),
                );
                None
            }
        }
    }

    fn dealer(&mut self, required: bool) -> Option<DealerRef> {
        let Some(code) = self.text(DEALER_CODE) else {
            if required {
                self.error("dealer_code", "is required");
            }
            return None;
        };
        if code.chars().count() > DEALER_CODE_MAX {
            self.error(
                "dealer_code",
                format!("must be at most {} characters", DEALER_CODE_MAX),
            );
            return None;
        }
        Some(DealerRef {
            code: code.to_uppercase(),
            name: self.bounded_text("dealer_name", DEALER_NAME, TEXT_MAX),
            zone: self.bounded_text("zone", ZONE, SHORT_TEXT_MAX),
            region: self.bounded_text("region", REGION, SHORT_TEXT_MAX),
        })
    }
}

/// Strip spaces, dots and parentheses, then require `+<country><number>`
pub fn normalize_phone(value: &str) -> Option<String> {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '.' | '(' | ')'))
        .collect();
    PHONE_RE.is_match(&compact).then_some(compact)
}

/// ISO-8601 date or datetime, or the `DD-MM-YYYY` fallback
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.date());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    NaiveDate::parse_from_str(value, "%d-%m-%Y").ok()
}

/// Decimal amount with at most two fraction digits, in minor units
pub fn parse_money(value: &str) -> Option<i64> {
    let cleaned: String = value
        .trim()
        .trim_start_matches(['₹', '$', '€'])
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty()
        || !whole.chars().all(|c| c.is_ascii_digit())
        || fraction.len() > 2
        || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_phone_international_passes() {
        assert_eq!(normalize_phone("+1234567890").as_deref(), Some("+1234567890"));
        assert_eq!(normalize_phone("+91 98765 43210").as_deref(), Some("+919876543210"));
    }

    #[test]
    fn test_phone_domestic_hyphenated_fails() {
        assert!(normalize_phone("123-456-7890").is_none());
        assert!(normalize_phone("9876543210").is_none());
        assert!(normalize_phone("+12345").is_none());
    }

    #[test]
    fn test_booking_row_with_bad_phone_reports_phone_field() {
        let validator = RowValidator::new(ImportKind::Booking, today());
        let errors = validator
            .validate(&row(&[
                ("customer_name", "Asha Rao"),
                ("customer_phone", "123-456-7890"),
                ("dealer_code", "MD-01"),
            ]))
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["customer_phone"]);
    }

    #[test]
    fn test_zone_region_and_color_limited_to_column_width() {
        let validator = RowValidator::new(ImportKind::Booking, today());
        let fits = "z".repeat(100);
        let booking = |value: &str| {
            row(&[
                ("customer_name", "Asha Rao"),
                ("customer_phone", "+919876543210"),
                ("dealer_code", "MD-01"),
                ("zone", value),
                ("region", value),
                ("color", value),
            ])
        };

        assert!(validator.validate(&booking(&fits)).is_ok());

        let errors = validator.validate(&booking(&"z".repeat(101))).unwrap_err();
        assert_eq!(fields(&errors), vec!["zone", "region", "color"]);
        assert!(errors
            .iter()
            .all(|e| e.message == "must be at most 100 characters"));
    }

    #[test]
    fn test_overlong_email_rejected() {
        let validator = RowValidator::new(ImportKind::Booking, today());
        let email = format!("{}@dealer.test", "a".repeat(250));
        let errors = validator
            .validate(&row(&[
                ("customer_name", "Asha Rao"),
                ("customer_phone", "+919876543210"),
                ("customer_email", &email),
                ("dealer_code", "MD-01"),
            ]))
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["customer_email"]);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2025-10-15T10:00:00Z"),
            NaiveDate::from_ymd_opt(2025, 10, 15)
        );
        assert_eq!(parse_date("2025-10-15"), NaiveDate::from_ymd_opt(2025, 10, 15));
        assert_eq!(parse_date("15-10-2025"), NaiveDate::from_ymd_opt(2025, 10, 15));
        assert_eq!(
            parse_date("2025-10-15T10:00:00+05:30"),
            NaiveDate::from_ymd_opt(2025, 10, 15)
        );
        assert_eq!(parse_date("invalid-date"), None);
        assert_eq!(parse_date("10/15/2025"), None);
    }

    #[test]
    fn test_invalid_date_reports_date_field() {
        let validator = RowValidator::new(ImportKind::Enquiry, today());
        let errors = validator
            .validate(&row(&[
                ("customer_name", "Asha Rao"),
                ("customer_contact", "+919876543210"),
                ("date", "invalid-date"),
                ("expected_date", "2026-04-01"),
            ]))
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["date"]);
    }

    #[test]
    fn test_collects_all_errors_not_just_first() {
        let validator = RowValidator::new(ImportKind::Booking, today());
        let errors = validator
            .validate(&row(&[
                ("customer_name", ""),
                ("customer_phone", "123-456-7890"),
                ("customer_email", "not-an-email"),
                ("dealer_code", "MD-01"),
                ("status", "teleported"),
            ]))
            .unwrap_err();
        let fields = fields(&errors);
        assert!(fields.contains(&"customer_name"));
        assert!(fields.contains(&"customer_phone"));
        assert!(fields.contains(&"customer_email"));
        assert!(fields.contains(&"status"));
    }

    #[test]
    fn test_missing_required_fields() {
        let validator = RowValidator::new(ImportKind::Booking, today());
        let errors = validator.validate(&RawRow::new()).unwrap_err();
        assert_eq!(
            fields(&errors),
            vec!["customer_name", "customer_phone", "dealer_code"]
        );
        assert!(errors.iter().all(|e| e.message == "is required"));
    }

    #[test]
    fn test_target_date_in_past_rejected() {
        let validator = RowValidator::new(ImportKind::Enquiry, today());
        let errors = validator
            .validate(&row(&[
                ("customer_name", "Asha Rao"),
                ("customer_contact", "+919876543210"),
                ("expected_date", "28-02-2026"),
            ]))
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["expected_date"]);
        assert!(errors[0].message.contains("in the past"));
    }

    #[test]
    fn test_target_date_today_accepted() {
        let validator = RowValidator::new(ImportKind::Enquiry, today());
        let result = validator.validate(&row(&[
            ("customer_name", "Asha Rao"),
            ("customer_contact", "+919876543210"),
            ("expected_date", "2026-03-01T18:30:00Z"),
        ]));
        let CanonicalRow::Enquiry(enquiry) = result.unwrap() else {
            panic!("expected enquiry row");
        };
        assert_eq!(enquiry.expected_date, today());
        assert_eq!(enquiry.enquiry_date, today());
        assert_eq!(enquiry.category, EnquiryCategory::Warm);
    }

    #[test]
    fn test_enum_normalization_before_rejection() {
        let validator = RowValidator::new(ImportKind::Enquiry, today());
        let result = validator.validate(&row(&[
            ("customer_name", "Asha Rao"),
            ("customer_contact", "+919876543210"),
            ("expected_date", "2026-05-01"),
            ("category", " HOT "),
            ("source", "Walk In"),
            ("status", "Follow-Up"),
        ]));
        let CanonicalRow::Enquiry(enquiry) = result.unwrap() else {
            panic!("expected enquiry row");
        };
        assert_eq!(enquiry.category, EnquiryCategory::Hot);
        assert_eq!(enquiry.source, Some(LeadSource::WalkIn));
        assert_eq!(enquiry.status, EnquiryStatus::FollowUp);
    }

    #[test]
    fn test_valid_booking_is_canonicalized() {
        let validator = RowValidator::new(ImportKind::Booking, today());
        let result = validator.validate(&row(&[
            ("name", "Asha Rao"),
            ("mobile", "+91 98765 43210"),
            ("email", "Asha@Example.com"),
            ("dealer_code", "md-01"),
            ("dealer_name", "Metro Motors"),
            ("booking_amount", "25,000.5"),
            ("expected_delivery_date", "15-04-2026"),
        ]));
        let CanonicalRow::Booking(booking) = result.unwrap() else {
            panic!("expected booking row");
        };
        assert_eq!(booking.customer_phone, "+919876543210");
        assert_eq!(booking.customer_email.as_deref(), Some("asha@example.com"));
        assert_eq!(booking.dealer.code, "MD-01");
        assert_eq!(booking.dealer.name.as_deref(), Some("Metro Motors"));
        assert_eq!(booking.booking_amount, Some(2_500_050));
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.expected_delivery_date, NaiveDate::from_ymd_opt(2026, 4, 15));
    }

    #[test]
    fn test_quotation_price_rules() {
        let validator = RowValidator::new(ImportKind::Quotation, today());
        let errors = validator
            .validate(&row(&[
                ("customer_name", "Asha Rao"),
                ("customer_phone", "+919876543210"),
                ("dealer_code", "SD-7"),
                ("vehicle_model", "Hatch LX"),
                ("quoted_price", "500000"),
                ("discount", "600000"),
            ]))
            .unwrap_err();
        assert_eq!(fields(&errors), vec!["discount"]);

        let errors = validator
            .validate(&row(&[
                ("customer_name", "Asha Rao"),
                ("customer_phone", "+919876543210"),
                ("dealer_code", "SD-7"),
                ("quoted_price", "-5"),
            ]))
            .unwrap_err();
        let fields = fields(&errors);
        assert!(fields.contains(&"vehicle_model"));
        assert!(fields.contains(&"quoted_price"));
    }

    #[test]
    fn test_validation_is_deterministic() {
        let validator = RowValidator::new(ImportKind::Booking, today());
        let raw = row(&[
            ("customer_name", "A"),
            ("customer_phone", "555"),
            ("expected_delivery_date", "01-01-2020"),
        ]);
        let first = validator.validate(&raw).unwrap_err();
        let second = validator.validate(&raw).unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("1,250.75"), Some(125_075));
        assert_eq!(parse_money("₹ 999"), Some(99_900));
        assert_eq!(parse_money("10.5"), Some(1_050));
        assert_eq!(parse_money("10.555"), None);
        assert_eq!(parse_money("-10"), None);
        assert_eq!(parse_money("abc"), None);
    }
}
