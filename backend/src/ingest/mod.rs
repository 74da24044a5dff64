//! Upload ingestion: spreadsheet bytes to ordered row records.
//!
//! Accepts CSV (with encoding and delimiter auto-detection) and Excel
//! workbooks (xlsx, xls). Each data row becomes a JSON object keyed by
//! header name, preserving original column order. No persistence happens
//! here; a failed parse leaves no trace.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde_json::{json, Map, Value};

use crate::error::{IngestError, IngestResult};

/// Size ceiling for uploads: 10 MiB.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Accepted upload extensions (case-insensitive).
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// Source format of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Xlsx,
    Xls,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Xls => "xls",
        }
    }
}

/// Parsed upload with metadata.
#[derive(Debug, Clone)]
pub struct SheetData {
    /// Column headers in original order.
    pub headers: Vec<String>,
    /// Data rows as JSON objects, one per non-empty row.
    pub rows: Vec<Value>,
    /// Detected source format.
    pub format: SourceFormat,
    /// Detected text encoding (CSV only).
    pub encoding: Option<String>,
    /// Detected delimiter (CSV only).
    pub delimiter: Option<char>,
}

/// Parse an uploaded file into row records.
///
/// Rejects payloads over [`MAX_UPLOAD_BYTES`], extensions outside
/// [`ALLOWED_EXTENSIONS`], and empty or unparseable content.
pub fn parse_upload(filename: &str, bytes: &[u8]) -> IngestResult<SheetData> {
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(IngestError::PayloadTooLarge {
            size: bytes.len(),
            limit: MAX_UPLOAD_BYTES,
        });
    }

    let ext = extension(filename);
    if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(IngestError::UnsupportedType(ext));
    }

    if bytes.is_empty() {
        return Err(IngestError::Format("file is empty".to_string()));
    }

    match ext.as_str() {
        "csv" => parse_csv_bytes(bytes),
        "xlsx" => parse_workbook_bytes(bytes, SourceFormat::Xlsx),
        "xls" => parse_workbook_bytes(bytes, SourceFormat::Xls),
        _ => unreachable!("extension checked against allow-list"),
    }
}

/// Lower-cased extension of a filename, empty when absent.
fn extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default()
}

// =============================================================================
// CSV
// =============================================================================

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => String::from_utf8(bytes.to_vec())
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).to_string()),
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.to_string()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Detect the delimiter by counting occurrences in the first line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
fn parse_csv_bytes(bytes: &[u8]) -> IngestResult<SheetData> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);

    let mut lines = content.lines();

    let header_line = lines
        .next()
        .ok_or_else(|| IngestError::Format("file is empty".to_string()))?;

    let headers: Vec<String> = header_line
        .split(delimiter)
        .map(|s| s.trim().trim_matches('"').to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::Format("no header row found".to_string()));
    }

    let mut rows = Vec::new();

    for line in lines {
        if line.trim().is_empty() {
            continue;
        }

        let values: Vec<&str> = line.split(delimiter).collect();
        let mut obj = Map::new();

        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let raw_value = values
                .get(i)
                .map(|s| s.trim().trim_matches('"'))
                .unwrap_or("");

            obj.insert(header.clone(), json!(raw_value));
        }

        rows.push(Value::Object(obj));
    }

    if rows.is_empty() {
        return Err(IngestError::Format("no data rows found".to_string()));
    }

    Ok(SheetData {
        headers: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        rows,
        format: SourceFormat::Csv,
        encoding: Some(encoding),
        delimiter: Some(delimiter),
    })
}

// =============================================================================
// Excel workbooks
// =============================================================================

/// Parse workbook bytes (xlsx, xls). Only the first worksheet is read;
/// its first row is the header row.
fn parse_workbook_bytes(bytes: &[u8], format: SourceFormat) -> IngestResult<SheetData> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| IngestError::Format(format!("cannot open workbook: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let first_sheet = sheet_names
        .first()
        .ok_or_else(|| IngestError::Format("workbook contains no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(first_sheet)
        .map_err(|e| IngestError::Format(format!("cannot read sheet '{}': {}", first_sheet, e)))?;

    let mut row_iter = range.rows();

    let header_row = row_iter
        .next()
        .ok_or_else(|| IngestError::Format("sheet is empty".to_string()))?;

    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| cell_to_string(cell).trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(IngestError::Format("no header row found".to_string()));
    }

    let mut rows = Vec::new();

    for row in row_iter {
        let values: Vec<String> = row.iter().map(cell_to_string).collect();
        if values.iter().all(|v| v.trim().is_empty()) {
            continue;
        }

        let mut obj = Map::new();
        for (i, header) in headers.iter().enumerate() {
            if header.is_empty() {
                continue;
            }
            let value = values.get(i).map(|s| s.trim()).unwrap_or("");
            obj.insert(header.clone(), json!(value));
        }
        rows.push(Value::Object(obj));
    }

    if rows.is_empty() {
        return Err(IngestError::Format("no data rows found".to_string()));
    }

    Ok(SheetData {
        headers: headers.into_iter().filter(|h| !h.is_empty()).collect(),
        rows,
        format,
        encoding: None,
        delimiter: None,
    })
}

/// Stringify a workbook cell the way users see it in the sheet.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without trailing decimals
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => format!("{}", n),
        Data::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => format!("{}", dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}
