//! Error types for the IAT scoring pipeline

use crate::config::ConfigError;
use crate::schema::DataQualityReport;
use thiserror::Error;

/// Errors that can occur before or during a pipeline run
#[derive(Debug, Error)]
pub enum IatError {
    #[error("Missing required columns: {}", .missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Dataset needs correction upstream: {0}")]
    DataQuality(DataQualityReport),

    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
