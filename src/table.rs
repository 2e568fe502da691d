use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use crate::error::AnalysisError;

pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

const SUPPORTED_EXTENSIONS: [&str; 3] = ["csv", "xlsx", "xls"];

/// One parsed spreadsheet cell. Text that looks numeric is promoted to
/// `Number` so CSV and Excel inputs classify the same way downstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn from_text(raw: &str) -> Cell {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            // "nan" parses as a float but means a missing value.
            Ok(v) if v.is_nan() => Cell::Empty,
            Ok(v) => Cell::Number(v),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(t) => t.trim().parse::<f64>().ok().filter(|v| !v.is_nan()),
            Cell::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Render for identity fields: integral floats drop their decimal point
    /// so an admission number read as `4344.0` prints as `4344`.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(t) => t.clone(),
            Cell::Number(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                    format!("{}", *v as i64)
                } else {
                    v.to_string()
                }
            }
        }
    }
}

/// Header row plus data rows, every row padded or truncated to the header
/// width so column indexing never goes out of bounds.
#[derive(Debug, Clone)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn column(&self, col: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |row| &row[col])
    }
}

/// Parse uploaded bytes into a table, dispatching on the file extension.
pub fn parse_table(filename: &str, bytes: &[u8]) -> Result<Table, AnalysisError> {
    let ext = extension_of(filename);
    match ext.as_str() {
        "csv" => parse_csv(bytes),
        "xlsx" | "xls" => parse_excel(bytes),
        _ => Err(AnalysisError::UnsupportedFormat(ext)),
    }
}

pub fn supported_extension(filename: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&extension_of(filename).as_str())
}

pub(crate) fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn parse_csv(bytes: &[u8]) -> Result<Table, AnalysisError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AnalysisError::FileRead(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(AnalysisError::EmptyTable);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AnalysisError::FileRead(e.to_string()))?;
        let mut row: Vec<Cell> = record.iter().map(Cell::from_text).collect();
        row.resize(headers.len(), Cell::Empty);
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(AnalysisError::EmptyTable);
    }

    Ok(Table { headers, rows })
}

fn parse_excel(bytes: &[u8]) -> Result<Table, AnalysisError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| AnalysisError::FileRead(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(AnalysisError::EmptyTable)?
        .map_err(|e| AnalysisError::FileRead(e.to_string()))?;

    let mut row_iter = range.rows();
    let headers: Vec<String> = match row_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| cell_text(cell).trim().to_string())
            .collect(),
        None => return Err(AnalysisError::EmptyTable),
    };
    if headers.iter().all(|h| h.is_empty()) {
        return Err(AnalysisError::EmptyTable);
    }

    let mut rows = Vec::new();
    for data_row in row_iter {
        let mut row: Vec<Cell> = data_row.iter().map(convert_cell).collect();
        row.resize(headers.len(), Cell::Empty);
        rows.push(row);
    }
    if rows.is_empty() {
        return Err(AnalysisError::EmptyTable);
    }

    Ok(Table { headers, rows })
}

fn convert_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Float(v) => Cell::Number(*v),
        Data::Int(v) => Cell::Number(*v as f64),
        Data::String(s) => Cell::from_text(s),
        // Booleans and dates are real values but not scores; keeping them
        // textual keeps their columns out of the numeric set.
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => Cell::Text(dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

fn cell_text(data: &Data) -> String {
    match data {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(v) => v.to_string(),
        Data::Int(v) => v.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
    }
}
