//! Upload file parser
//!
//! Turns a delimited-text or spreadsheet file into normalized rows
//! (header -> raw string). CSV files are read record by record; for
//! workbooks only the first sheet is read.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use thiserror::Error;

use crate::types::{FileType, RawRow};

/// Fatal parse failure; aborts the whole job
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed delimited file: {0}")]
    Csv(#[from] csv::Error),
    #[error("cannot read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),
    #[error("workbook contains no sheets")]
    NoSheets,
    #[error("file has no header row")]
    MissingHeader,
}

/// A structurally broken row, surfaced as a per-row error
#[derive(Debug, Clone, PartialEq)]
pub struct RowParseError {
    pub raw: RawRow,
    pub message: String,
}

/// One data row, 1-based, header excluded
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub row_number: i32,
    pub outcome: Result<RawRow, RowParseError>,
}

/// Whole-file parse result
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub headers: Vec<String>,
    pub total_rows: usize,
    pub rows: Vec<ParsedRow>,
}

/// Parse a whole file into memory
pub fn parse_file(path: &Path, file_type: FileType) -> Result<ParsedFile, ParseError> {
    let reader = RowReader::open(path, file_type)?;
    let headers = reader.headers().to_vec();
    let rows = reader.collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedFile {
        headers,
        total_rows: rows.len(),
        rows,
    })
}

/// Normalize a header cell: trimmed, lower-cased, whitespace runs -> `_`
pub fn normalize_header(header: &str, position: usize) -> String {
    let normalized = header
        .trim_start_matches('\u{feff}')
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_");
    if normalized.is_empty() {
        format!("column_{}", position + 1)
    } else {
        normalized
    }
}

/// Rename raw keys using a source-header -> canonical-field mapping
pub fn apply_column_mapping(raw: RawRow, mapping: &HashMap<String, String>) -> RawRow {
    if mapping.is_empty() {
        return raw;
    }
    let normalized: HashMap<String, String> = mapping
        .iter()
        .enumerate()
        .map(|(i, (from, to))| (normalize_header(from, i), normalize_header(to, i)))
        .collect();
    raw.into_iter()
        .map(|(key, value)| match normalized.get(&key) {
            Some(target) => (target.clone(), value),
            None => (key, value),
        })
        .collect()
}

enum Source {
    Csv(csv::StringRecordsIntoIter<BufReader<File>>),
    Sheet(std::vec::IntoIter<Vec<String>>),
}

/// Streaming row iterator over an upload
pub struct RowReader {
    headers: Vec<String>,
    source: Source,
    next_row_number: i32,
}

impl RowReader {
    pub fn open(path: &Path, file_type: FileType) -> Result<Self, ParseError> {
        match file_type {
            FileType::Csv => Self::open_csv(path),
            FileType::Spreadsheet => Self::open_spreadsheet(path),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    fn open_csv(path: &Path) -> Result<Self, ParseError> {
        let delimiter = sniff_delimiter(path)?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(File::open(path)?));

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| normalize_header(h, i))
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.starts_with("column_")) {
            return Err(ParseError::MissingHeader);
        }

        Ok(Self {
            headers,
            source: Source::Csv(reader.into_records()),
            next_row_number: 1,
        })
    }

    fn open_spreadsheet(path: &Path) -> Result<Self, ParseError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook.worksheet_range_at(0).ok_or(ParseError::NoSheets)??;

        let mut rows = range.rows();
        let header_row = rows.next().ok_or(ParseError::MissingHeader)?;
        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(i, cell)| normalize_header(&cell_to_string(cell), i))
            .collect();
        if headers.iter().all(|h| h.starts_with("column_")) {
            return Err(ParseError::MissingHeader);
        }

        let body: Vec<Vec<String>> = rows
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        Ok(Self {
            headers,
            source: Source::Sheet(body.into_iter()),
            next_row_number: 1,
        })
    }

    fn build_row(&mut self, cells: Vec<String>) -> ParsedRow {
        let row_number = self.next_row_number;
        self.next_row_number += 1;

        if cells.len() != self.headers.len() {
            let raw = cells
                .into_iter()
                .enumerate()
                .map(|(i, value)| {
                    let key = self
                        .headers
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| format!("column_{}", i + 1));
                    (key, value)
                })
                .collect::<RawRow>();
            let message = format!(
                "expected {} columns, found {}",
                self.headers.len(),
                raw.len()
            );
            return ParsedRow {
                row_number,
                outcome: Err(RowParseError { raw, message }),
            };
        }

        let raw = self
            .headers
            .iter()
            .cloned()
            .zip(cells.into_iter().map(|c| c.trim().to_string()))
            .collect::<RawRow>();
        ParsedRow {
            row_number,
            outcome: Ok(raw),
        }
    }
}

impl Iterator for RowReader {
    type Item = Result<ParsedRow, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let cells: Vec<String> = match &mut self.source {
                Source::Csv(records) => match records.next()? {
                    Ok(record) => record.iter().map(str::to_string).collect(),
                    Err(e) => match e.kind() {
                        csv::ErrorKind::Utf8 { .. } => {
                            let row_number = self.next_row_number;
                            self.next_row_number += 1;
                            return Some(Ok(ParsedRow {
                                row_number,
                                outcome: Err(RowParseError {
                                    raw: RawRow::new(),
                                    message: format!("row is not valid UTF-8: {}", e),
                                }),
                            }));
                        }
                        _ => return Some(Err(ParseError::Csv(e))),
                    },
                },
                Source::Sheet(rows) => rows.next()?,
            };

            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            return Some(Ok(self.build_row(cells)));
        }
    }
}

/// Pick the delimiter that occurs most in the header line
fn sniff_delimiter(path: &Path) -> Result<u8, ParseError> {
    let mut first_line = String::new();
    let mut reader = BufReader::new(File::open(path)?);
    if reader.read_line(&mut first_line)? == 0 {
        return Err(ParseError::MissingHeader);
    }

    let candidates = [b',', b';', b'\t'];
    let best = candidates
        .iter()
        .copied()
        .max_by_key(|d| first_line.bytes().filter(|b| b == d).count())
        .unwrap_or(b',');
    if first_line.bytes().any(|b| b == best) {
        Ok(best)
    } else {
        Ok(b',')
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => excel_serial_to_iso(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

/// Excel serial date (1900 system) to ISO date or datetime text
fn excel_serial_to_iso(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return serial.to_string();
    };
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    let Some(datetime) = epoch
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.checked_add_signed(Duration::days(days) + Duration::seconds(seconds)))
    else {
        return serial.to_string();
    };
    if seconds == 0 {
        datetime.date().format("%Y-%m-%d").to_string()
    } else {
        datetime.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn write_temp(name: &str, contents: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", Uuid::new_v4(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Customer Name ", 0), "customer_name");
        assert_eq!(normalize_header("\u{feff}Dealer  Code", 0), "dealer_code");
        assert_eq!(normalize_header("", 4), "column_5");
    }

    #[test]
    fn test_parse_csv_normalizes_headers_and_counts_rows() {
        let path = write_temp(
            "bookings.csv",
            b"Customer Name,Customer Phone,Dealer Code\nAsha Rao,+919876543210,MD-01\nVikram Shah,+919812345678,SD-02\n",
        );
        let parsed = parse_file(&path, FileType::Csv).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(parsed.headers, vec!["customer_name", "customer_phone", "dealer_code"]);
        assert_eq!(parsed.total_rows, 2);
        let first = parsed.rows[0].outcome.as_ref().unwrap();
        assert_eq!(first.get("customer_name").map(String::as_str), Some("Asha Rao"));
        assert_eq!(first.get("dealer_code").map(String::as_str), Some("MD-01"));
        assert_eq!(parsed.rows[1].row_number, 2);
    }

    #[test]
    fn test_parse_csv_sniffs_semicolon_delimiter() {
        let path = write_temp("semi.csv", b"name;phone\nAsha;+919876543210\n");
        let parsed = parse_file(&path, FileType::Csv).unwrap();
        std::fs::remove_file(&path).ok();

        let row = parsed.rows[0].outcome.as_ref().unwrap();
        assert_eq!(row.get("phone").map(String::as_str), Some("+919876543210"));
    }

    #[test]
    fn test_wrong_column_count_is_a_row_error_not_fatal() {
        let path = write_temp(
            "ragged.csv",
            b"name,phone,dealer_code\nAsha,+919876543210,MD-01\nBroken,row\nVikram,+919812345678,SD-02\n",
        );
        let parsed = parse_file(&path, FileType::Csv).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(parsed.total_rows, 3);
        assert!(parsed.rows[0].outcome.is_ok());
        let err = parsed.rows[1].outcome.as_ref().unwrap_err();
        assert!(err.message.contains("expected 3 columns"));
        assert_eq!(err.raw.get("name").map(String::as_str), Some("Broken"));
        assert!(parsed.rows[2].outcome.is_ok());
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let path = write_temp("blank.csv", b"name,phone\nAsha,+919876543210\n,\n\nRavi,+919800000000\n");
        let parsed = parse_file(&path, FileType::Csv).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(parsed.total_rows, 2);
        assert_eq!(parsed.rows[1].row_number, 2);
    }

    #[test]
    fn test_empty_file_is_fatal() {
        let path = write_temp("empty.csv", b"");
        let result = parse_file(&path, FileType::Csv);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ParseError::MissingHeader)));
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let path = std::env::temp_dir().join(format!("{}-missing.csv", Uuid::new_v4()));
        assert!(matches!(parse_file(&path, FileType::Csv), Err(ParseError::Io(_))));
    }

    #[test]
    fn test_corrupt_spreadsheet_is_fatal() {
        let path = write_temp("corrupt.xlsx", b"this is not a zip archive");
        let result = parse_file(&path, FileType::Spreadsheet);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    const SHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

    /// Minimal two-sheet workbook; style 1 is the built-in date format
    fn write_workbook(name: &str, first_sheet: &str, second_sheet: &str) -> PathBuf {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let parts = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
</Types>"#
                    .to_string(),
            ),
            (
                "_rels/.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#
                    .to_string(),
            ),
            (
                "xl/workbook.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Bookings" sheetId="1" r:id="rId1"/><sheet name="Notes" sheetId="2" r:id="rId2"/></sheets>
</workbook>"#,
                    SHEET_NS
                ),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#
                    .to_string(),
            ),
            (
                "xl/styles.xml",
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="{}"><cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/></cellXfs></styleSheet>"#,
                    SHEET_NS
                ),
            ),
            ("xl/worksheets/sheet1.xml", first_sheet.to_string()),
            ("xl/worksheets/sheet2.xml", second_sheet.to_string()),
        ];

        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (part, body) in parts {
            zip.start_file(part, options).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        let bytes = zip.finish().unwrap().into_inner();
        write_temp(name, &bytes)
    }

    fn sheet(rows: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{}"><sheetData>{}</sheetData></worksheet>"#,
            SHEET_NS, rows
        )
    }

    fn text_cell(reference: &str, value: &str) -> String {
        format!(r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#, reference, value)
    }

    #[test]
    fn test_parse_workbook_reads_first_sheet_only() {
        let bookings = sheet(&format!(
            r#"<row r="1">{}{}{}{}</row><row r="2">{}<c r="B2"><v>919876543210</v></c><c r="C2" s="1"><v>45945</v></c><c r="D2"><v>2500.5</v></c></row><row r="3">{}</row><row r="4">{}<c r="B4"><v>14155550123</v></c>{}<c r="D4"><v>12000</v></c></row>"#,
            text_cell("A1", "Customer Name"),
            text_cell("B1", "Customer Phone"),
            text_cell("C1", "Booking Date"),
            text_cell("D1", "Booking Amount"),
            text_cell("A2", "Asha Rao"),
            text_cell("A3", " "),
            text_cell("A4", "Vikram Singh"),
            text_cell("C4", "2025-10-16"),
        ));
        let notes = sheet(&format!(
            r#"<row r="1">{}</row><row r="2">{}</row>"#,
            text_cell("A1", "Ignored Header"),
            text_cell("A2", "ignored value"),
        ));
        let path = write_workbook("bookings.xlsx", &bookings, &notes);
        let parsed = parse_file(&path, FileType::Spreadsheet).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(
            parsed.headers,
            vec!["customer_name", "customer_phone", "booking_date", "booking_amount"]
        );
        // The blank row 3 is skipped and does not consume a row number
        assert_eq!(parsed.total_rows, 2);
        assert_eq!(parsed.rows[1].row_number, 2);

        let first = parsed.rows[0].outcome.as_ref().unwrap();
        assert_eq!(first.get("customer_name").map(String::as_str), Some("Asha Rao"));
        assert_eq!(first.get("customer_phone").map(String::as_str), Some("919876543210"));
        assert_eq!(first.get("booking_date").map(String::as_str), Some("2025-10-15"));
        assert_eq!(first.get("booking_amount").map(String::as_str), Some("2500.5"));

        let second = parsed.rows[1].outcome.as_ref().unwrap();
        assert_eq!(second.get("customer_name").map(String::as_str), Some("Vikram Singh"));
        assert_eq!(second.get("booking_date").map(String::as_str), Some("2025-10-16"));
        assert_eq!(second.get("booking_amount").map(String::as_str), Some("12000"));
        assert!(parsed
            .rows
            .iter()
            .all(|row| row.outcome.as_ref().unwrap().get("ignored_header").is_none()));
    }

    #[test]
    fn test_cell_to_string() {
        assert_eq!(cell_to_string(&Data::Empty), "");
        assert_eq!(cell_to_string(&Data::String("  MD-01 ".to_string())), "MD-01");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Float(919876543210.0)), "919876543210");
        assert_eq!(cell_to_string(&Data::Float(-3.0)), "-3");
        assert_eq!(cell_to_string(&Data::Float(2500.5)), "2500.5");
        assert_eq!(cell_to_string(&Data::Bool(true)), "true");
        assert_eq!(
            cell_to_string(&Data::DateTimeIso("2025-10-15T10:00:00".to_string())),
            "2025-10-15T10:00:00"
        );
    }

    #[test]
    fn test_column_mapping_renames_keys() {
        let mut raw = RawRow::new();
        raw.insert("mobile_no".to_string(), "+919876543210".to_string());
        raw.insert("name".to_string(), "Asha".to_string());
        let mut mapping = HashMap::new();
        mapping.insert("Mobile No".to_string(), "customer_phone".to_string());

        let mapped = apply_column_mapping(raw, &mapping);
        assert_eq!(mapped.get("customer_phone").map(String::as_str), Some("+919876543210"));
        assert!(mapped.get("mobile_no").is_none());
        assert_eq!(mapped.get("name").map(String::as_str), Some("Asha"));
    }

    #[test]
    fn test_excel_serial_to_iso() {
        assert_eq!(excel_serial_to_iso(45945.0), "2025-10-15");
        assert_eq!(excel_serial_to_iso(45945.5), "2025-10-15T12:00:00");
    }
}
