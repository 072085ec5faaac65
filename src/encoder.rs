//! Report encoding
//!
//! Wraps a [`PipelineOutput`] into a versioned JSON envelope carrying the
//! producer, the configuration used and the time of computation. The pipeline
//! output itself is deterministic; everything time- or instance-dependent is
//! added here.

use crate::config::ScoringConfig;
use crate::error::IatError;
use crate::types::{PipelineOutput, ReportProducer, ReportProvenance, ScoringPayload};
use crate::{IAT_VERSION, PRODUCER_NAME};
use chrono::Utc;
use uuid::Uuid;

/// Current report envelope version
pub const REPORT_VERSION: &str = "1.0.0";

/// Encoder for scoring report envelopes
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap a pipeline output into a report envelope
    pub fn encode(&self, output: &PipelineOutput, config: &ScoringConfig) -> ScoringPayload {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: IAT_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let provenance = ReportProvenance {
            computed_at_utc: Utc::now().to_rfc3339(),
            input_rows: output.overview.rows,
        };

        ScoringPayload {
            report_version: REPORT_VERSION.to_string(),
            producer,
            provenance,
            config: config.clone(),
            output: output.clone(),
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(
        &self,
        output: &PipelineOutput,
        config: &ScoringConfig,
    ) -> Result<String, IatError> {
        let payload = self.encode(output, config);
        serde_json::to_string_pretty(&payload).map_err(|e| IatError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataOverview, ExclusionReports, ScoreTable};

    fn output() -> PipelineOutput {
        PipelineOutput {
            overview: DataOverview {
                rows: 4,
                participants: 1,
                stage_labels: vec!["compatible".to_string(), "incompatible".to_string()],
            },
            reports: ExclusionReports::default(),
            summary: Vec::new(),
            scores: ScoreTable::default(),
            trials_scored: 4,
        }
    }

    #[test]
    fn test_envelope_fields() {
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let config = ScoringConfig::with_labels(["compatible"], ["incompatible"]);
        let json = encoder.encode_to_json(&output(), &config).unwrap();

        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(payload["report_version"], REPORT_VERSION);
        assert_eq!(payload["producer"]["name"], "iat-dscore");
        assert_eq!(payload["producer"]["instance_id"], "test-instance");
        assert_eq!(payload["provenance"]["input_rows"], 4);
        assert!(payload["provenance"]["computed_at_utc"].is_string());
        assert_eq!(payload["config"]["congruent_labels"][0], "compatible");
        assert_eq!(payload["output"]["trials_scored"], 4);
    }

    #[test]
    fn test_new_encoders_get_distinct_ids() {
        assert_ne!(
            ReportEncoder::new().instance_id(),
            ReportEncoder::new().instance_id()
        );
    }
}
