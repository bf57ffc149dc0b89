//! Spreadsheet parsing
//!
//! Turns uploaded bytes into a header row plus data rows. Format comes from
//! the file extension, falling back to content sniffing when the extension
//! is missing or unknown. Only the first worksheet of XLS/XLSX workbooks is
//! read.

use crate::models::{SourceFormat, SourceMeta};
use calamine::{Data, Reader};
use std::io::Cursor;
use thiserror::Error;

const UTF8_BOM: &str = "\u{feff}";

/// Job-level parsing failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Format could not be determined from name or content
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    /// File matched a format but could not be decoded
    #[error("unreadable {format} file: {reason}")]
    Unreadable { format: &'static str, reason: String },

    /// No header row
    #[error("file has no header row")]
    MissingHeader,

    /// Header row present but no data rows
    #[error("file contains no data rows")]
    NoRows,
}

/// One data row as extracted from the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position among data rows (header excluded)
    pub number: usize,
    /// Cell values in header order (may be shorter or longer than headers)
    pub values: Vec<String>,
}

/// Fully parsed sheet
#[derive(Debug, Clone)]
pub struct ParsedSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub meta: SourceMeta,
}

/// Decide the format from the filename extension, then from content
pub fn detect_format(bytes: &[u8], filename: &str) -> Result<SourceFormat, SourceError> {
    let extension = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("csv") | Some("txt") => return Ok(SourceFormat::Csv),
        Some("xlsx") => return Ok(SourceFormat::Xlsx),
        Some("xls") => return Ok(SourceFormat::Xls),
        _ => {}
    }

    if infer::doc::is_xlsx(bytes) {
        Ok(SourceFormat::Xlsx)
    } else if infer::doc::is_xls(bytes) {
        Ok(SourceFormat::Xls)
    } else if std::str::from_utf8(bytes).is_ok() {
        Ok(SourceFormat::Csv)
    } else {
        Err(SourceError::Unsupported(filename.to_string()))
    }
}

/// Parse an uploaded file into rows
pub fn parse_source(bytes: &[u8], filename: &str) -> Result<ParsedSheet, SourceError> {
    let format = detect_format(bytes, filename)?;

    let table = match format {
        SourceFormat::Csv => read_csv(bytes)?,
        SourceFormat::Xls | SourceFormat::Xlsx => read_workbook(bytes, format)?,
    };

    let mut records = table.into_iter();
    let headers: Vec<String> = records
        .next()
        .map(|h| h.into_iter().map(|c| c.trim().to_string()).collect())
        .filter(|h: &Vec<String>| h.iter().any(|c| !c.is_empty()))
        .ok_or(SourceError::MissingHeader)?;

    let mut rows = Vec::new();
    for values in records {
        if values.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(RawRow {
            number: rows.len() + 1,
            values,
        });
    }

    if rows.is_empty() {
        return Err(SourceError::NoRows);
    }

    tracing::debug!(
        filename,
        format = format.as_str(),
        rows = rows.len(),
        columns = headers.len(),
        "Parsed spreadsheet"
    );

    let meta = SourceMeta {
        filename: filename.to_string(),
        format: Some(format),
        row_count: rows.len(),
        column_count: headers.len(),
    };

    Ok(ParsedSheet { headers, rows, meta })
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, SourceError> {
    let text = std::str::from_utf8(bytes).map_err(|e| SourceError::Unreadable {
        format: "csv",
        reason: format!("invalid UTF-8: {}", e),
    })?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| SourceError::Unreadable {
            format: "csv",
            reason: e.to_string(),
        })?;
        table.push(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

fn read_workbook(bytes: &[u8], format: SourceFormat) -> Result<Vec<Vec<String>>, SourceError> {
    let unreadable = |reason: String| SourceError::Unreadable {
        format: format.as_str(),
        reason,
    };

    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook =
        calamine::open_workbook_auto_from_rs(cursor).map_err(|e| unreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| unreadable("workbook has no worksheets".to_string()))?
        .map_err(|e| unreadable(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        // Whole numbers come back from Excel as floats
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
