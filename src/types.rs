//! Core types for the IAT scoring pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: validated trials, exclusion and correction reports, the descriptive
//! table and the score table.

use crate::config::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single stimulus-response event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    /// Zero-based row position in the validated input
    pub trial_id: usize,
    /// Participant identifier
    pub participant_id: String,
    /// Stage (block) label from the `Running` column
    pub stage_label: String,
    /// Whether the response was correct
    pub is_correct: bool,
    /// Reaction time in milliseconds (always > 0)
    pub reaction_time_ms: f64,
}

/// An ordered sequence of trials
///
/// Stages never mutate a dataset; they build a new one. Relative order of the
/// surviving trials is always preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    trials: Vec<Trial>,
}

impl Dataset {
    pub fn new(trials: Vec<Trial>) -> Self {
        Self { trials }
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn len(&self) -> usize {
        self.trials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trials.is_empty()
    }

    /// Participant ids in order of first appearance
    pub fn participants(&self) -> Vec<&str> {
        first_appearance(self.trials.iter().map(|t| t.participant_id.as_str()))
    }

    /// Stage labels in order of first appearance
    pub fn stage_labels(&self) -> Vec<&str> {
        first_appearance(self.trials.iter().map(|t| t.stage_label.as_str()))
    }

    /// Trials grouped by participant, groups in first-appearance order
    pub fn by_participant(&self) -> Vec<(&str, Vec<&Trial>)> {
        group_by(&self.trials, |t| t.participant_id.as_str())
    }

    /// Trials grouped by stage label, groups in first-appearance order
    pub fn by_stage(&self) -> Vec<(&str, Vec<&Trial>)> {
        group_by(&self.trials, |t| t.stage_label.as_str())
    }

    /// Build a new dataset keeping only the trials matching `keep`
    pub fn retain_to_new<F>(&self, mut keep: F) -> Dataset
    where
        F: FnMut(&Trial) -> bool,
    {
        Dataset::new(self.trials.iter().filter(|t| keep(t)).cloned().collect())
    }

    /// Overview of the dataset contents
    pub fn overview(&self) -> DataOverview {
        DataOverview {
            rows: self.len(),
            participants: self.participants().len(),
            stage_labels: self
                .stage_labels()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

fn first_appearance<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = std::collections::HashSet::new();
    keys.filter(|k| seen.insert(*k)).collect()
}

fn group_by<'a, F>(trials: &'a [Trial], key: F) -> Vec<(&'a str, Vec<&'a Trial>)>
where
    F: Fn(&'a Trial) -> &'a str,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&Trial>)> = Vec::new();

    for trial in trials {
        let k = key(trial);
        match index.get(k) {
            Some(&i) => groups[i].1.push(trial),
            None => {
                index.insert(k, groups.len());
                groups.push((k, vec![trial]));
            }
        }
    }

    groups
}

/// Summary of an input dataset (row count, participants, stage labels)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataOverview {
    pub rows: usize,
    pub participants: usize,
    pub stage_labels: Vec<String>,
}

/// Why a participant or trial was excluded or corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    /// Too many trials faster than the fast threshold
    FastRatio,
    /// Too many trials slower than the slow threshold
    SlowRatio,
    /// Too many incorrect responses
    ErrorRate,
    /// Reaction-time spread too large compared to the whole sample
    RtStdOutlier,
    /// Trial faster than the trial-level fast cutoff
    BelowThreshold,
    /// Trial slower than the trial-level slow cutoff
    AboveThreshold,
    /// Incorrect trial replaced by the participant's correct mean plus penalty
    MeanOfCorrect,
    /// Incorrect trial replaced by its own reaction time plus penalty
    OwnTrial,
    /// Incorrect trial left unchanged: no correct trials to average
    NoCorrectBaseline,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::FastRatio => "fast-ratio",
            ReasonCode::SlowRatio => "slow-ratio",
            ReasonCode::ErrorRate => "error-rate",
            ReasonCode::RtStdOutlier => "rt-std-outlier",
            ReasonCode::BelowThreshold => "below-threshold",
            ReasonCode::AboveThreshold => "above-threshold",
            ReasonCode::MeanOfCorrect => "mean-of-correct",
            ReasonCode::OwnTrial => "own-trial",
            ReasonCode::NoCorrectBaseline => "no-correct-baseline",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a participant-level or trial-level exclusion report
///
/// `id` is the participant id for participant-level entries and the trial id
/// (as a string) for trial-level entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionEntry {
    pub id: String,
    pub reason: ReasonCode,
    pub detail: String,
}

/// One row of the error-correction report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    /// Trial id
    pub id: String,
    pub reason: ReasonCode,
    /// Correct-trial mean used as the base, in `mean-of-correct` mode
    pub correct_mean: Option<f64>,
    pub detail: String,
    pub original_rt_ms: f64,
    pub corrected_rt_ms: f64,
}

/// Reports accumulated across the filter and correction stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionReports {
    pub participant: Vec<ExclusionEntry>,
    pub trial: Vec<ExclusionEntry>,
    pub correction: Vec<CorrectionEntry>,
}

/// Descriptive statistics for one stage label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage_label: String,
    pub trials: usize,
    pub rt_mean: f64,
    /// NaN (serialized as null) when the stage has a single trial
    pub rt_std: f64,
    pub acc_mean: f64,
    pub acc_std: f64,
}

/// D-score and partition statistics for one scorable participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub participant_id: String,
    pub congruent_rt_mean: f64,
    pub congruent_rt_std: f64,
    pub incongruent_rt_mean: f64,
    pub incongruent_rt_std: f64,
    pub all_rt_mean: f64,
    pub all_rt_std: f64,
    pub d_value: f64,
}

/// Why a D-score could not be computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnscorableReason {
    /// No congruent trials left
    EmptyCongruent,
    /// No incongruent trials left
    EmptyIncongruent,
    /// Combined standard deviation is zero
    ZeroVariance,
    /// Combined standard deviation or the result is not finite
    NonFinite,
}

impl UnscorableReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnscorableReason::EmptyCongruent => "empty-congruent",
            UnscorableReason::EmptyIncongruent => "empty-incongruent",
            UnscorableReason::ZeroVariance => "zero-variance",
            UnscorableReason::NonFinite => "non-finite",
        }
    }
}

/// A participant whose D-score is not computable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnscorableParticipant {
    pub participant_id: String,
    pub reason: UnscorableReason,
}

/// Score table: scorable participants plus the not-computable sentinels
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTable {
    pub scored: Vec<ScoreRecord>,
    pub unscorable: Vec<UnscorableParticipant>,
}

impl ScoreTable {
    /// Look up the D-score of a participant, if scorable
    pub fn d_value(&self, participant_id: &str) -> Option<f64> {
        self.scored
            .iter()
            .find(|r| r.participant_id == participant_id)
            .map(|r| r.d_value)
    }
}

/// Everything a pipeline run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    /// Overview of the validated input, before any exclusion
    pub overview: DataOverview,
    pub reports: ExclusionReports,
    pub summary: Vec<StageSummary>,
    pub scores: ScoreTable,
    /// Trials remaining after filtering, i.e. the rows the scores were computed on
    pub trials_scored: usize,
}

/// Report envelope: pipeline output plus producer and provenance metadata
#[derive(Debug, Clone, Serialize)]
pub struct ScoringPayload {
    pub report_version: String,
    pub producer: ReportProducer,
    pub provenance: ReportProvenance,
    /// Configuration the output was computed with
    pub config: ScoringConfig,
    pub output: PipelineOutput,
}

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Provenance metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProvenance {
    pub computed_at_utc: String,
    /// Rows in the validated input
    pub input_rows: usize,
}

#[cfg(test)]
impl Trial {
    /// Shorthand constructor for unit tests
    pub(crate) fn fixture(id: usize, participant: &str, stage: &str, correct: bool, rt: f64) -> Self {
        Trial {
            trial_id: id,
            participant_id: participant.to_string(),
            stage_label: stage.to_string(),
            is_correct: correct,
            reaction_time_ms: rt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial(id: usize, participant: &str, stage: &str, correct: bool, rt: f64) -> Trial {
        Trial::fixture(id, participant, stage, correct, rt)
    }

    #[test]
    fn test_participants_first_appearance() {
        let ds = Dataset::new(vec![
            trial(0, "P2", "A", true, 500.0),
            trial(1, "P1", "A", true, 500.0),
            trial(2, "P2", "B", true, 500.0),
            trial(3, "P3", "B", true, 500.0),
        ]);

        assert_eq!(ds.participants(), vec!["P2", "P1", "P3"]);
        assert_eq!(ds.stage_labels(), vec!["A", "B"]);
    }

    #[test]
    fn test_group_by_participant_preserves_order() {
        let ds = Dataset::new(vec![
            trial(0, "P1", "A", true, 1.0),
            trial(1, "P2", "A", true, 2.0),
            trial(2, "P1", "B", true, 3.0),
        ]);

        let groups = ds.by_participant();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "P1");
        let ids: Vec<usize> = groups[0].1.iter().map(|t| t.trial_id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_retain_to_new_leaves_source_untouched() {
        let ds = Dataset::new(vec![
            trial(0, "P1", "A", true, 100.0),
            trial(1, "P1", "A", true, 900.0),
        ]);

        let kept = ds.retain_to_new(|t| t.reaction_time_ms > 200.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.trials()[0].trial_id, 1);
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn test_overview() {
        let ds = Dataset::new(vec![
            trial(0, "P1", "practice", true, 100.0),
            trial(1, "P2", "compatible", true, 900.0),
            trial(2, "P2", "compatible", false, 700.0),
        ]);

        let overview = ds.overview();
        assert_eq!(overview.rows, 3);
        assert_eq!(overview.participants, 2);
        assert_eq!(overview.stage_labels, vec!["practice", "compatible"]);
    }

    #[test]
    fn test_reason_code_serialization() {
        let json = serde_json::to_string(&ReasonCode::RtStdOutlier).unwrap();
        assert_eq!(json, "\"rt-std-outlier\"");
        assert_eq!(ReasonCode::BelowThreshold.to_string(), "below-threshold");
    }
}
