//! Schema validation
//!
//! Converts a [`RawTable`] into a typed [`Dataset`]. Missing columns are fatal.
//! Missing or malformed values are collected into a [`DataQualityReport`] and
//! block the pipeline: nothing is dropped or imputed here.

use crate::error::IatError;
use crate::schema::raw_row::{RawRow, RawTable};
use crate::types::{Dataset, Trial};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Participant identifier column
pub const PARTICIPANT_COLUMN: &str = "Participant";

/// Stage label column
pub const STAGE_COLUMN: &str = "Running";

/// Accuracy column (0 or 1)
pub const ACCURACY_COLUMN: &str = "Stim_ACC";

/// Reaction time column (milliseconds)
pub const REACTION_TIME_COLUMN: &str = "Stim_RT";

/// Columns every input table must carry
pub const REQUIRED_COLUMNS: [&str; 4] = [
    PARTICIPANT_COLUMN,
    STAGE_COLUMN,
    ACCURACY_COLUMN,
    REACTION_TIME_COLUMN,
];

/// A row with one or more required fields missing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingValueRow {
    /// Zero-based row index in the input
    pub row: usize,
    pub columns: Vec<String>,
}

/// A present value that cannot be used
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidValueRow {
    pub row: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

/// Rows that must be fixed upstream before the pipeline can run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub missing: Vec<MissingValueRow>,
    pub invalid: Vec<InvalidValueRow>,
}

impl DataQualityReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.invalid.is_empty()
    }
}

impl fmt::Display for DataQualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rows with missing values, {} invalid values",
            self.missing.len(),
            self.invalid.len()
        )?;
        if let Some(first) = self.missing.first() {
            write!(
                f,
                " (first missing: row {} [{}])",
                first.row,
                first.columns.join(", ")
            )?;
        }
        if let Some(first) = self.invalid.first() {
            write!(
                f,
                " (first invalid: row {} {}={:?}: {})",
                first.row, first.column, first.value, first.reason
            )?;
        }
        Ok(())
    }
}

/// Outcome of inspecting a table whose columns are all present
#[derive(Debug, Clone)]
pub struct Inspection {
    /// Trials built from the rows that passed every check
    pub dataset: Dataset,
    pub report: DataQualityReport,
}

/// Validator for the fixed trial schema
pub struct SchemaValidator;

impl SchemaValidator {
    /// Required columns absent from `columns`, in canonical order
    pub fn missing_columns(columns: &[String]) -> Vec<String> {
        REQUIRED_COLUMNS
            .iter()
            .filter(|required| !columns.iter().any(|c| c == *required))
            .map(|c| c.to_string())
            .collect()
    }

    /// Fail with a schema error when any required column is absent
    pub fn check_columns(columns: &[String]) -> Result<(), IatError> {
        let missing = Self::missing_columns(columns);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(IatError::Schema { missing })
        }
    }

    /// Check columns, then type every row and collect data-quality problems
    ///
    /// Unlike [`SchemaValidator::validate`] this does not block on a dirty
    /// report; it is what `iat validate` prints.
    pub fn inspect(table: &RawTable) -> Result<Inspection, IatError> {
        Self::inspect_rows(&table.rows, &table.columns)
    }

    /// [`SchemaValidator::inspect`] over borrowed rows and their column list
    pub fn inspect_rows(rows: &[RawRow], columns: &[String]) -> Result<Inspection, IatError> {
        Self::check_columns(columns)?;

        let mut report = DataQualityReport::default();
        let mut trials = Vec::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let missing: Vec<String> = REQUIRED_COLUMNS
                .iter()
                .filter(|column| is_missing(row.get(**column)))
                .map(|c| c.to_string())
                .collect();

            if !missing.is_empty() {
                report.missing.push(MissingValueRow {
                    row: index,
                    columns: missing,
                });
                continue;
            }

            match parse_trial(index, row) {
                Ok(trial) => trials.push(trial),
                Err(invalid) => report.invalid.extend(invalid),
            }
        }

        Ok(Inspection {
            dataset: Dataset::new(trials),
            report,
        })
    }

    /// Validate a table into a dataset, halting on any data-quality problem
    pub fn validate(table: &RawTable) -> Result<Dataset, IatError> {
        Self::validate_rows(&table.rows, &table.columns)
    }

    /// [`SchemaValidator::validate`] over borrowed rows and their column list
    pub fn validate_rows(rows: &[RawRow], columns: &[String]) -> Result<Dataset, IatError> {
        let inspection = Self::inspect_rows(rows, columns)?;
        if !inspection.report.is_clean() {
            return Err(IatError::DataQuality(inspection.report));
        }
        Ok(inspection.dataset)
    }
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn parse_trial(index: usize, row: &RawRow) -> Result<Trial, Vec<InvalidValueRow>> {
    let mut invalid = Vec::new();

    let participant_id = parse_label(row, PARTICIPANT_COLUMN)
        .map_err(|e| invalid.push(e.at(index)))
        .ok();
    let stage_label = parse_label(row, STAGE_COLUMN)
        .map_err(|e| invalid.push(e.at(index)))
        .ok();
    let is_correct = parse_accuracy(row)
        .map_err(|e| invalid.push(e.at(index)))
        .ok();
    let reaction_time_ms = parse_reaction_time(row)
        .map_err(|e| invalid.push(e.at(index)))
        .ok();

    match (participant_id, stage_label, is_correct, reaction_time_ms) {
        (Some(participant_id), Some(stage_label), Some(is_correct), Some(reaction_time_ms)) => {
            Ok(Trial {
                trial_id: index,
                participant_id,
                stage_label,
                is_correct,
                reaction_time_ms,
            })
        }
        _ => Err(invalid),
    }
}

/// Field-level problem, before the row index is attached
struct FieldError {
    column: &'static str,
    value: String,
    reason: &'static str,
}

impl FieldError {
    fn new(column: &'static str, value: &Value, reason: &'static str) -> Self {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self {
            column,
            value,
            reason,
        }
    }

    fn at(self, row: usize) -> InvalidValueRow {
        InvalidValueRow {
            row,
            column: self.column.to_string(),
            value: self.value,
            reason: self.reason.to_string(),
        }
    }
}

static NULL: Value = Value::Null;

fn field<'a>(row: &'a RawRow, column: &'static str) -> &'a Value {
    // Missing fields are screened out before parsing.
    row.get(column).unwrap_or(&NULL)
}

/// Identifiers and labels: strings, or numbers rendered without a trailing `.0`
fn parse_label(row: &RawRow, column: &'static str) -> Result<String, FieldError> {
    let value = field(row, column);
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.to_string())
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 => {
                        Ok(format!("{}", f as i64))
                    }
                    _ => Ok(n.to_string()),
                }
            }
        }
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(FieldError::new(column, value, "expected a string or number")),
    }
}

fn parse_accuracy(row: &RawRow) -> Result<bool, FieldError> {
    let value = field(row, ACCURACY_COLUMN);
    let flag = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().and_then(flag_from_f64),
        Value::String(s) => {
            let s = s.trim();
            match s.to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => s.parse::<f64>().ok().and_then(flag_from_f64),
            }
        }
        _ => None,
    };
    flag.ok_or_else(|| FieldError::new(ACCURACY_COLUMN, value, "accuracy must be 0 or 1"))
}

fn flag_from_f64(f: f64) -> Option<bool> {
    if f == 1.0 {
        Some(true)
    } else if f == 0.0 {
        Some(false)
    } else {
        None
    }
}

fn parse_reaction_time(row: &RawRow) -> Result<f64, FieldError> {
    let value = field(row, REACTION_TIME_COLUMN);
    let rt = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match rt {
        Some(rt) if rt.is_finite() && rt > 0.0 => Ok(rt),
        Some(_) => Err(FieldError::new(
            REACTION_TIME_COLUMN,
            value,
            "reaction time must be a positive finite number",
        )),
        None => Err(FieldError::new(
            REACTION_TIME_COLUMN,
            value,
            "reaction time is not numeric",
        )),
    }
}
