//! Scoring configuration
//!
//! Every threshold used by the pipeline lives here. A rule set to `None` is
//! disabled and its stage behaves as the identity. The whole configuration is
//! checked once by [`ScoringConfig::validate`] before any stage runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

/// Default fast-response threshold (ms)
pub const DEFAULT_FAST_THRESHOLD_MS: f64 = 300.0;

/// Default slow-response threshold (ms)
pub const DEFAULT_SLOW_THRESHOLD_MS: f64 = 10_000.0;

/// Default share of too-fast or too-slow trials tolerated per participant (%)
pub const DEFAULT_SPEED_PERCENT: f64 = 10.0;

/// Default error-rate cap (%)
pub const DEFAULT_ERROR_PERCENT: f64 = 35.0;

/// Default multiplier on the group reaction-time standard deviation
pub const DEFAULT_STD_MULTIPLIER: f64 = 3.0;

/// Default penalty added to corrected error trials (ms)
pub const DEFAULT_PENALTY_MS: f64 = 600.0;

/// Participant rule on the share of trials beyond a reaction-time threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RatioRule {
    pub threshold_ms: f64,
    pub max_percent: f64,
}

impl RatioRule {
    pub fn fast() -> Self {
        Self {
            threshold_ms: DEFAULT_FAST_THRESHOLD_MS,
            max_percent: DEFAULT_SPEED_PERCENT,
        }
    }

    pub fn slow() -> Self {
        Self {
            threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            max_percent: DEFAULT_SPEED_PERCENT,
        }
    }
}

/// Participant rule on the share of incorrect trials
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorRateRule {
    pub max_percent: f64,
}

impl Default for ErrorRateRule {
    fn default() -> Self {
        Self {
            max_percent: DEFAULT_ERROR_PERCENT,
        }
    }
}

/// Participant rule comparing own RT spread with the whole sample's
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdOutlierRule {
    pub multiplier: f64,
}

impl Default for StdOutlierRule {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_STD_MULTIPLIER,
        }
    }
}

/// Participant-level exclusion rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParticipantRules {
    pub fast_ratio: Option<RatioRule>,
    pub slow_ratio: Option<RatioRule>,
    pub error_rate: Option<ErrorRateRule>,
    pub rt_std_outlier: Option<StdOutlierRule>,
}

/// Single reaction-time cutoff for trial-level exclusion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Cutoff {
    pub threshold_ms: f64,
}

/// Trial-level exclusion rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrialRules {
    pub fast: Option<Cutoff>,
    pub slow: Option<Cutoff>,
}

/// How an incorrect trial's reaction time is replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionMode {
    /// Mean of the participant's correct trials plus penalty
    MeanOfCorrect,
    /// The trial's own reaction time plus penalty
    OwnTrial,
}

/// Which correct trials feed the mean in `mean-of-correct` mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeanScope {
    /// All of the participant's correct trials
    #[default]
    Participant,
    /// The participant's correct trials in the same stage label
    ParticipantStage,
}

/// Error-trial correction settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionConfig {
    pub mode: CorrectionMode,
    pub penalty_ms: f64,
    #[serde(default)]
    pub mean_scope: MeanScope,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            mode: CorrectionMode::MeanOfCorrect,
            penalty_ms: DEFAULT_PENALTY_MS,
            mean_scope: MeanScope::Participant,
        }
    }
}

/// Sign convention of the D-score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    #[default]
    IncongruentMinusCongruent,
    CongruentMinusIncongruent,
}

impl Direction {
    /// Multiplier applied to `incongruent_mean - congruent_mean`
    pub fn sign(&self) -> f64 {
        match self {
            Direction::IncongruentMinusCongruent => 1.0,
            Direction::CongruentMinusIncongruent => -1.0,
        }
    }

    pub fn reversed(&self) -> Self {
        match self {
            Direction::IncongruentMinusCongruent => Direction::CongruentMinusIncongruent,
            Direction::CongruentMinusIncongruent => Direction::IncongruentMinusCongruent,
        }
    }
}

/// Full configuration of one scoring run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoringConfig {
    pub participant: ParticipantRules,
    pub trial: TrialRules,
    pub correction: Option<CorrectionConfig>,
    pub congruent_labels: BTreeSet<String>,
    pub incongruent_labels: BTreeSet<String>,
    pub direction: Direction,
    /// Score on natural-log reaction times
    pub log_transform: bool,
}

/// Configuration rejected before the pipeline runs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} must be a non-negative finite number, got {value}")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("{field} must be a percentage between 0 and 100, got {value}")]
    PercentOutOfRange { field: &'static str, value: f64 },

    #[error("{0} label set is empty")]
    EmptyLabelSet(&'static str),

    #[error("Labels are both congruent and incongruent: {}", .0.join(", "))]
    OverlappingLabels(Vec<String>),
}

impl ScoringConfig {
    /// Configuration with the given stage labels and every rule disabled
    pub fn with_labels<C, I, S>(congruent: C, incongruent: I) -> Self
    where
        C: IntoIterator<Item = S>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            congruent_labels: congruent.into_iter().map(Into::into).collect(),
            incongruent_labels: incongruent.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Template with every rule enabled at its default value
    pub fn template() -> Self {
        Self {
            participant: ParticipantRules {
                fast_ratio: Some(RatioRule::fast()),
                slow_ratio: Some(RatioRule::slow()),
                error_rate: Some(ErrorRateRule::default()),
                rt_std_outlier: Some(StdOutlierRule::default()),
            },
            trial: TrialRules {
                fast: Some(Cutoff {
                    threshold_ms: DEFAULT_FAST_THRESHOLD_MS,
                }),
                slow: Some(Cutoff {
                    threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
                }),
            },
            correction: Some(CorrectionConfig::default()),
            congruent_labels: BTreeSet::from(["compatible".to_string()]),
            incongruent_labels: BTreeSet::from(["incompatible".to_string()]),
            direction: Direction::default(),
            log_transform: false,
        }
    }

    /// Load configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Check every field before the pipeline starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.participant;
        if let Some(rule) = &p.fast_ratio {
            check_threshold("participant.fast_ratio.threshold_ms", rule.threshold_ms)?;
            check_percent("participant.fast_ratio.max_percent", rule.max_percent)?;
        }
        if let Some(rule) = &p.slow_ratio {
            check_threshold("participant.slow_ratio.threshold_ms", rule.threshold_ms)?;
            check_percent("participant.slow_ratio.max_percent", rule.max_percent)?;
        }
        if let Some(rule) = &p.error_rate {
            check_percent("participant.error_rate.max_percent", rule.max_percent)?;
        }
        if let Some(rule) = &p.rt_std_outlier {
            check_threshold("participant.rt_std_outlier.multiplier", rule.multiplier)?;
        }

        if let Some(cutoff) = &self.trial.fast {
            check_threshold("trial.fast.threshold_ms", cutoff.threshold_ms)?;
        }
        if let Some(cutoff) = &self.trial.slow {
            check_threshold("trial.slow.threshold_ms", cutoff.threshold_ms)?;
        }

        if let Some(correction) = &self.correction {
            check_threshold("correction.penalty_ms", correction.penalty_ms)?;
        }

        if self.congruent_labels.is_empty() {
            return Err(ConfigError::EmptyLabelSet("Congruent"));
        }
        if self.incongruent_labels.is_empty() {
            return Err(ConfigError::EmptyLabelSet("Incongruent"));
        }

        let shared: Vec<String> = self
            .congruent_labels
            .intersection(&self.incongruent_labels)
            .cloned()
            .collect();
        if !shared.is_empty() {
            return Err(ConfigError::OverlappingLabels(shared));
        }

        Ok(())
    }

    /// Configured labels that do not occur in the observed stage labels
    pub fn unobserved_labels<'a>(&'a self, observed: &[&str]) -> Vec<&'a str> {
        self.congruent_labels
            .iter()
            .chain(self.incongruent_labels.iter())
            .map(String::as_str)
            .filter(|label| !observed.contains(label))
            .collect()
    }
}

fn check_threshold(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidThreshold { field, value });
    }
    Ok(())
}

fn check_percent(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(ConfigError::PercentOutOfRange { field, value });
    }
    Ok(())
}
