//! Untyped input rows
//!
//! The pipeline accepts trial tables as a JSON array of objects, as NDJSON
//! (one object per line) or as CSV with a header row. All three are parsed
//! into the same [`RawTable`]: an ordered column list plus untyped rows.
//! Typing and checking happen later in the schema validator.

use crate::error::IatError;
use serde_json::{Map, Value};

/// One untyped input row, keyed by column name
pub type RawRow = Map<String, Value>;

/// Input table before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column names in first-seen order
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Supported input encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// JSON array of row objects
    Json,
    /// Newline-delimited JSON, one row object per line
    Ndjson,
    /// Comma-separated values with a header row
    Csv,
}

impl RawTable {
    /// Build a table from rows, deriving the column list from their keys
    pub fn from_rows(rows: Vec<RawRow>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// Parse input in the given format
    pub fn parse(input: &str, format: InputFormat) -> Result<Self, IatError> {
        match format {
            InputFormat::Json => Self::parse_array(input),
            InputFormat::Ndjson => Self::parse_ndjson(input),
            InputFormat::Csv => Self::parse_csv(input),
        }
    }

    /// Parse a JSON string containing an array of row objects
    pub fn parse_array(json: &str) -> Result<Self, IatError> {
        let rows: Vec<RawRow> = serde_json::from_str(json)?;
        Ok(Self::from_rows(rows))
    }

    /// Parse NDJSON (newline-delimited JSON) containing row objects
    pub fn parse_ndjson(ndjson: &str) -> Result<Self, IatError> {
        let mut rows = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawRow>(trimmed) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    return Err(IatError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(Self::from_rows(rows))
    }

    /// Parse CSV with a header row
    ///
    /// Every cell is kept as a string; empty cells and short rows leave the
    /// column absent from the row so the validator reports them as missing.
    pub fn parse_csv(input: &str) -> Result<Self, IatError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row = RawRow::new();
            for (column, field) in columns.iter().zip(record.iter()) {
                if !field.is_empty() {
                    row.insert(column.clone(), Value::String(field.to_string()));
                }
            }
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
