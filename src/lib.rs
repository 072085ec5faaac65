//! IAT D-score - cleaning and scoring pipeline for Implicit Association Test data
//!
//! Takes a trial-level table (participant, stage label, accuracy, reaction
//! time) and a scoring configuration, and produces per-participant D-scores
//! through a deterministic pipeline: schema validation → participant-level
//! exclusion → trial-level exclusion → error-trial correction → descriptive
//! summary and D-score computation.
//!
//! Every stage returns a new dataset plus a report of what it removed or
//! changed, so a run can be audited row by row.

pub mod config;
pub mod correction;
pub mod dscore;
pub mod encoder;
pub mod error;
pub mod participant;
pub mod pipeline;
pub mod schema;
pub mod stats;
pub mod summary;
pub mod trial;
pub mod types;

pub use config::{ConfigError, ScoringConfig};
pub use error::IatError;
pub use pipeline::{run_pipeline, run_table, score_json, IatProcessor, PipelineStage};

// Schema exports
pub use schema::{DataQualityReport, InputFormat, RawRow, RawTable, SchemaValidator};

pub use types::{Dataset, PipelineOutput, ScoreTable, Trial};

/// Crate version embedded in every report envelope
pub const IAT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for report envelopes
pub const PRODUCER_NAME: &str = "iat-dscore";
