//! Pipeline orchestration
//!
//! This module provides the public API of the crate. It runs a trial table
//! through the fixed stage sequence:
//!
//! 1. SchemaValidator - Type rows into trials, block on missing/invalid values
//! 2. ParticipantFilter - Drop participants failing an enabled rule
//! 3. TrialFilter - Drop out-of-bound trials
//! 4. ErrorCorrector - Replace reaction times of incorrect trials
//! 5. DescriptiveSummarizer + DScoreCalculator - Build the output tables
//!
//! The configuration is validated before anything else happens.

use crate::config::ScoringConfig;
use crate::correction::ErrorCorrector;
use crate::dscore::DScoreCalculator;
use crate::encoder::ReportEncoder;
use crate::error::IatError;
use crate::participant::ParticipantFilter;
use crate::schema::{InputFormat, RawRow, RawTable, SchemaValidator};
use crate::summary::DescriptiveSummarizer;
use crate::trial::TrialFilter;
use crate::types::{
    DataOverview, Dataset, ExclusionReports, PipelineOutput, ScoreTable, ScoringPayload,
    StageSummary,
};

/// Position of a run in the stage sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Validated,
    ParticipantFiltered,
    TrialFiltered,
    Corrected,
    Scored,
}

/// A single run: owns the evolving dataset and the accumulated reports
struct PipelineRun<'c> {
    config: &'c ScoringConfig,
    stage: PipelineStage,
    overview: DataOverview,
    dataset: Dataset,
    reports: ExclusionReports,
    summary: Vec<StageSummary>,
    scores: ScoreTable,
}

impl<'c> PipelineRun<'c> {
    fn new(dataset: Dataset, config: &'c ScoringConfig) -> Self {
        Self {
            config,
            stage: PipelineStage::Validated,
            overview: dataset.overview(),
            dataset,
            reports: ExclusionReports::default(),
            summary: Vec::new(),
            scores: ScoreTable::default(),
        }
    }

    /// Run the next stage on the previous stage's output
    fn advance(&mut self) {
        self.stage = match self.stage {
            PipelineStage::Validated => {
                let (dataset, report) =
                    ParticipantFilter::apply(&self.dataset, &self.config.participant);
                self.dataset = dataset;
                self.reports.participant = report;
                PipelineStage::ParticipantFiltered
            }
            PipelineStage::ParticipantFiltered => {
                let (dataset, report) = TrialFilter::apply(&self.dataset, &self.config.trial);
                self.dataset = dataset;
                self.reports.trial = report;
                PipelineStage::TrialFiltered
            }
            PipelineStage::TrialFiltered => {
                let (dataset, report) =
                    ErrorCorrector::apply(&self.dataset, self.config.correction.as_ref());
                self.dataset = dataset;
                self.reports.correction = report;
                PipelineStage::Corrected
            }
            PipelineStage::Corrected => {
                self.summary = DescriptiveSummarizer::summarize(&self.dataset);
                self.scores = DScoreCalculator::score(&self.dataset, self.config);
                PipelineStage::Scored
            }
            PipelineStage::Scored => PipelineStage::Scored,
        };

        tracing::debug!(stage = ?self.stage, trials = self.dataset.len(), "pipeline stage done");
    }

    fn finish(mut self) -> PipelineOutput {
        while self.stage != PipelineStage::Scored {
            self.advance();
        }

        PipelineOutput {
            overview: self.overview,
            reports: self.reports,
            summary: self.summary,
            scores: self.scores,
            trials_scored: self.dataset.len(),
        }
    }
}

/// Run the full pipeline over untyped rows.
///
/// # Arguments
/// * `rows` - Input rows keyed by column name
/// * `columns` - Column names of the input table
/// * `config` - Scoring configuration
///
/// # Returns
/// Reports, descriptive summary and score table
///
/// # Example
/// ```ignore
/// let table = RawTable::parse_csv(&csv_text)?;
/// let output = run_pipeline(&table.rows, &table.columns, &config)?;
/// ```
pub fn run_pipeline(
    rows: &[RawRow],
    columns: &[String],
    config: &ScoringConfig,
) -> Result<PipelineOutput, IatError> {
    config.validate()?;

    let dataset = SchemaValidator::validate_rows(rows, columns)?;

    let observed = dataset.stage_labels();
    let unobserved = config.unobserved_labels(&observed);
    if !unobserved.is_empty() {
        tracing::warn!(
            labels = ?unobserved,
            observed = ?observed,
            "configured stage labels do not occur in the input"
        );
    }

    tracing::debug!(
        rows = dataset.len(),
        participants = dataset.participants().len(),
        "input validated"
    );

    Ok(PipelineRun::new(dataset, config).finish())
}

/// Run the full pipeline over a parsed table
pub fn run_table(table: &RawTable, config: &ScoringConfig) -> Result<PipelineOutput, IatError> {
    run_pipeline(&table.rows, &table.columns, config)
}

/// Score a JSON array of rows with a JSON configuration (stateless, one-shot).
///
/// # Returns
/// Report envelope JSON string
///
/// # Example
/// ```ignore
/// let report_json = score_json(rows_json, config_json)?;
/// ```
pub fn score_json(json: String, config_json: String) -> Result<String, IatError> {
    let processor = IatProcessor::from_json(&config_json)?;
    processor.process_json_array(&json)
}

/// Processor holding a validated configuration and a report encoder.
///
/// Use this to score several tables with the same configuration; every
/// envelope it produces carries the same producer instance id.
pub struct IatProcessor {
    config: ScoringConfig,
    encoder: ReportEncoder,
}

impl IatProcessor {
    /// Create a processor, rejecting an invalid configuration up front
    pub fn new(config: ScoringConfig) -> Result<Self, IatError> {
        Self::with_encoder(config, ReportEncoder::new())
    }

    /// Create a processor with a specific encoder
    pub fn with_encoder(config: ScoringConfig, encoder: ReportEncoder) -> Result<Self, IatError> {
        config.validate()?;
        Ok(Self { config, encoder })
    }

    /// Create a processor from configuration JSON
    pub fn from_json(config_json: &str) -> Result<Self, IatError> {
        Self::new(ScoringConfig::from_json(config_json)?)
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Run the pipeline without encoding
    pub fn score(&self, table: &RawTable) -> Result<PipelineOutput, IatError> {
        run_table(table, &self.config)
    }

    /// Wrap a pipeline output into a report envelope
    pub fn payload(&self, output: &PipelineOutput) -> ScoringPayload {
        self.encoder.encode(output, &self.config)
    }

    /// Encode a pipeline output into report envelope JSON
    pub fn encode(&self, output: &PipelineOutput) -> Result<String, IatError> {
        self.encoder.encode_to_json(output, &self.config)
    }

    /// Score untyped rows and return report envelope JSON
    pub fn process_rows(&self, rows: &[RawRow], columns: &[String]) -> Result<String, IatError> {
        let output = run_pipeline(rows, columns, &self.config)?;
        self.encode(&output)
    }

    /// Score a JSON array of row objects
    pub fn process_json_array(&self, json: &str) -> Result<String, IatError> {
        self.process(json, InputFormat::Json)
    }

    /// Score NDJSON, one row object per line
    pub fn process_ndjson(&self, ndjson: &str) -> Result<String, IatError> {
        self.process(ndjson, InputFormat::Ndjson)
    }

    /// Score CSV with a header row
    pub fn process_csv(&self, csv: &str) -> Result<String, IatError> {
        self.process(csv, InputFormat::Csv)
    }

    /// Score input in the given format
    pub fn process(&self, input: &str, format: InputFormat) -> Result<String, IatError> {
        let table = RawTable::parse(input, format)?;
        self.process_rows(&table.rows, &table.columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CorrectionConfig, Cutoff, ErrorRateRule, ParticipantRules, TrialRules,
    };
    use crate::types::{ReasonCode, UnscorableReason};
    use pretty_assertions::assert_eq;

    fn sample_csv() -> &'static str {
        "Participant,Running,Stim_ACC,Stim_RT\n\
         P1,compatible,1,500\n\
         P1,compatible,1,600\n\
         P1,incompatible,1,700\n\
         P1,incompatible,1,900\n\
         P2,compatible,1,450\n\
         P2,compatible,0,800\n\
         P2,incompatible,0,650\n\
         P2,incompatible,1,250\n\
         P2,incompatible,1,700\n"
    }

    fn config() -> ScoringConfig {
        ScoringConfig::with_labels(["compatible"], ["incompatible"])
    }

    fn run(config: &ScoringConfig) -> PipelineOutput {
        let table = RawTable::parse_csv(sample_csv()).unwrap();
        run_table(&table, config).unwrap()
    }

    #[test]
    fn test_no_rules_scores_everyone() {
        let output = run(&config());

        assert_eq!(output.overview.rows, 9);
        assert_eq!(output.overview.participants, 2);
        assert_eq!(output.trials_scored, 9);
        assert_eq!(output.reports, ExclusionReports::default());
        assert_eq!(output.scores.d_value("P1"), Some(1.464));
        assert_eq!(output.scores.scored.len(), 2);
        assert_eq!(output.summary.len(), 2);
    }

    #[test]
    fn test_error_rate_exclusion_flows_through() {
        let mut cfg = config();
        // P2: 2/5 incorrect = 40 %
        cfg.participant = ParticipantRules {
            error_rate: Some(ErrorRateRule { max_percent: 35.0 }),
            ..ParticipantRules::default()
        };

        let output = run(&cfg);
        assert_eq!(output.reports.participant.len(), 1);
        assert_eq!(output.reports.participant[0].id, "P2");
        assert_eq!(output.reports.participant[0].reason, ReasonCode::ErrorRate);
        assert_eq!(output.trials_scored, 4);
        assert_eq!(output.scores.d_value("P2"), None);
        assert_eq!(output.scores.scored.len(), 1);

        cfg.participant.error_rate = Some(ErrorRateRule { max_percent: 50.0 });
        assert!(run(&cfg).reports.participant.is_empty());
    }

    #[test]
    fn test_stages_see_previous_output() {
        let mut cfg = config();
        cfg.trial = TrialRules {
            fast: Some(Cutoff { threshold_ms: 300.0 }),
            slow: None,
        };
        cfg.correction = Some(CorrectionConfig::default());

        let output = run(&cfg);

        // Trial 7 (250 ms) is gone before correction runs
        assert_eq!(output.reports.trial.len(), 1);
        assert_eq!(output.reports.trial[0].id, "7");
        assert_eq!(output.reports.trial[0].reason, ReasonCode::BelowThreshold);

        // P2 correct mean after trial filtering = (450 + 700) / 2 = 575
        let ids: Vec<&str> = output.reports.correction.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["5", "6"]);
        assert!(output
            .reports
            .correction
            .iter()
            .all(|e| e.corrected_rt_ms == 1175.0));
        assert_eq!(output.trials_scored, 8);
    }

    #[test]
    fn test_config_checked_before_schema() {
        let table = RawTable::parse_array(r#"[{"Participant": "P1"}]"#).unwrap();
        let result = run_table(&table, &ScoringConfig::default());
        assert!(matches!(result, Err(IatError::Configuration(_))));

        let result = run_table(&table, &config());
        assert!(matches!(result, Err(IatError::Schema { .. })));
    }

    #[test]
    fn test_missing_values_block_the_run() {
        let csv = "Participant,Running,Stim_ACC,Stim_RT\nP1,compatible,1,\n";
        let table = RawTable::parse_csv(csv).unwrap();
        assert!(matches!(
            run_table(&table, &config()),
            Err(IatError::DataQuality(_))
        ));
    }

    #[test]
    fn test_header_only_csv_gives_empty_output() {
        let table = RawTable::parse_csv("Participant,Running,Stim_ACC,Stim_RT\n").unwrap();
        let output = run_table(&table, &ScoringConfig::template()).unwrap();

        assert_eq!(output.overview.rows, 0);
        assert_eq!(output.trials_scored, 0);
        assert!(output.summary.is_empty());
        assert_eq!(output.scores, ScoreTable::default());
    }

    #[test]
    fn test_empty_json_array_has_no_columns() {
        let table = RawTable::parse_array("[]").unwrap();
        assert!(matches!(
            run_table(&table, &config()),
            Err(IatError::Schema { .. })
        ));
    }

    #[test]
    fn test_unobserved_labels_are_not_fatal() {
        let cfg = ScoringConfig::with_labels(["congruent"], ["incongruent"]);
        let output = run(&cfg);

        assert!(output.scores.scored.is_empty());
        assert_eq!(
            output.scores.unscorable[0].reason,
            UnscorableReason::EmptyCongruent
        );
    }

    #[test]
    fn test_deterministic() {
        let cfg = ScoringConfig::template();
        let a = serde_json::to_string(&run(&cfg)).unwrap();
        let b = serde_json::to_string(&run(&cfg)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_run_advances_through_every_stage() {
        let table = RawTable::parse_csv(sample_csv()).unwrap();
        let cfg = config();
        let dataset = SchemaValidator::validate(&table).unwrap();
        let mut run = PipelineRun::new(dataset, &cfg);

        let mut stages = vec![run.stage];
        while run.stage != PipelineStage::Scored {
            run.advance();
            stages.push(run.stage);
        }

        assert_eq!(
            stages,
            vec![
                PipelineStage::Validated,
                PipelineStage::ParticipantFiltered,
                PipelineStage::TrialFiltered,
                PipelineStage::Corrected,
                PipelineStage::Scored,
            ]
        );
    }

    #[test]
    fn test_processor_formats_agree() {
        let encoder = || ReportEncoder::with_instance_id("fixed".to_string());
        let processor = IatProcessor::with_encoder(config(), encoder()).unwrap();

        let from_csv = processor.process_csv(sample_csv()).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&from_csv).unwrap();
        assert_eq!(payload["producer"]["name"], "iat-dscore");
        assert_eq!(payload["producer"]["instance_id"], "fixed");
        assert_eq!(payload["provenance"]["input_rows"], 9);

        let ndjson = "{\"Participant\": \"P1\", \"Running\": \"compatible\", \"Stim_ACC\": 1, \"Stim_RT\": 500}\n\
                      {\"Participant\": \"P1\", \"Running\": \"compatible\", \"Stim_ACC\": 1, \"Stim_RT\": 600}\n\
                      {\"Participant\": \"P1\", \"Running\": \"incompatible\", \"Stim_ACC\": 1, \"Stim_RT\": 700}\n\
                      {\"Participant\": \"P1\", \"Running\": \"incompatible\", \"Stim_ACC\": 1, \"Stim_RT\": 900}\n";
        let from_ndjson = processor.process_ndjson(ndjson).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&from_ndjson).unwrap();
        assert_eq!(payload["output"]["scores"]["scored"][0]["d_value"], 1.464);
    }

    #[test]
    fn test_processor_rejects_invalid_config() {
        assert!(matches!(
            IatProcessor::new(ScoringConfig::default()),
            Err(IatError::Configuration(_))
        ));
    }

    #[test]
    fn test_score_json() {
        let rows = r#"[
            {"Participant": "P1", "Running": "compatible", "Stim_ACC": 1, "Stim_RT": 500},
            {"Participant": "P1", "Running": "compatible", "Stim_ACC": 1, "Stim_RT": 600},
            {"Participant": "P1", "Running": "incompatible", "Stim_ACC": 1, "Stim_RT": 700},
            {"Participant": "P1", "Running": "incompatible", "Stim_ACC": 1, "Stim_RT": 900}
        ]"#;
        let config = r#"{
            "congruent_labels": ["compatible"],
            "incongruent_labels": ["incompatible"],
            "direction": "congruent-minus-incongruent"
        }"#;

        let result = score_json(rows.to_string(), config.to_string()).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(payload["output"]["scores"]["scored"][0]["d_value"], -1.464);
        assert_eq!(payload["output"]["scores"]["scored"][0]["all_rt_std"], 170.783);
    }

    #[test]
    fn test_score_json_invalid_input() {
        let config = r#"{"congruent_labels": ["a"], "incongruent_labels": ["b"]}"#;
        assert!(score_json("not valid json".to_string(), config.to_string()).is_err());
    }
}
