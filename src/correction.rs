//! Error-trial correction
//!
//! Replaces the reaction time of every incorrect trial with a penalized value.
//! Correct trials pass through untouched and the row count never changes.
//!
//! In `mean-of-correct` mode the correct-trial means are computed once from the
//! stage input, before any replacement, so the result does not depend on the
//! order in which incorrect trials are visited.

use crate::config::{CorrectionConfig, CorrectionMode, MeanScope};
use crate::stats::{mean, round_report};
use crate::types::{CorrectionEntry, Dataset, ReasonCode, Trial};
use std::collections::HashMap;

/// Key of a correct-trial mean: participant, and stage when scoped per stage
type MeanKey<'a> = (&'a str, Option<&'a str>);

/// Error-trial corrector
pub struct ErrorCorrector;

impl ErrorCorrector {
    /// Correct incorrect trials; `None` leaves the dataset as is
    pub fn apply(
        dataset: &Dataset,
        correction: Option<&CorrectionConfig>,
    ) -> (Dataset, Vec<CorrectionEntry>) {
        let Some(config) = correction else {
            return (dataset.clone(), Vec::new());
        };

        let means = match config.mode {
            CorrectionMode::MeanOfCorrect => Self::correct_means(dataset, config.mean_scope),
            CorrectionMode::OwnTrial => HashMap::new(),
        };

        let mut report = Vec::new();
        let trials: Vec<Trial> = dataset
            .trials()
            .iter()
            .map(|trial| {
                if trial.is_correct {
                    return trial.clone();
                }
                let (rt, entry) = Self::correct_trial(trial, config, &means);
                let mut corrected = trial.clone();
                corrected.reaction_time_ms = rt;
                report.push(entry);
                corrected
            })
            .collect();

        let uncorrectable = report
            .iter()
            .filter(|e| e.reason == ReasonCode::NoCorrectBaseline)
            .count();
        if uncorrectable > 0 {
            tracing::warn!(
                uncorrectable,
                "incorrect trials left unchanged: no correct trials to average"
            );
        }
        tracing::debug!(trials_corrected = report.len(), "error correction applied");

        (Dataset::new(trials), report)
    }

    /// Mean reaction time of correct trials, per participant (and stage)
    pub fn correct_means(dataset: &Dataset, scope: MeanScope) -> HashMap<MeanKey<'_>, f64> {
        let mut grouped: HashMap<MeanKey<'_>, Vec<f64>> = HashMap::new();
        for trial in dataset.trials().iter().filter(|t| t.is_correct) {
            grouped
                .entry(mean_key(trial, scope))
                .or_default()
                .push(trial.reaction_time_ms);
        }

        grouped
            .into_iter()
            .filter_map(|(key, rts)| mean(&rts).map(|m| (key, m)))
            .collect()
    }

    /// Unrounded corrected RT for the dataset, plus its rounded report entry
    fn correct_trial(
        trial: &Trial,
        config: &CorrectionConfig,
        means: &HashMap<MeanKey<'_>, f64>,
    ) -> (f64, CorrectionEntry) {
        let original = trial.reaction_time_ms;
        let id = trial.trial_id.to_string();

        let (corrected, reason, correct_mean, detail) = match config.mode {
            CorrectionMode::OwnTrial => {
                let corrected = original + config.penalty_ms;
                let detail = format!(
                    "rt {} ms + penalty {} ms = {} ms",
                    original,
                    config.penalty_ms,
                    round_report(corrected)
                );
                (corrected, ReasonCode::OwnTrial, None, detail)
            }
            CorrectionMode::MeanOfCorrect => {
                match means.get(&mean_key(trial, config.mean_scope)) {
                    Some(&correct_mean) => {
                        let corrected = correct_mean + config.penalty_ms;
                        let detail = format!(
                            "rt {} ms -> correct mean {} ms + penalty {} ms = {} ms",
                            original,
                            round_report(correct_mean),
                            config.penalty_ms,
                            round_report(corrected)
                        );
                        (
                            corrected,
                            ReasonCode::MeanOfCorrect,
                            Some(round_report(correct_mean)),
                            detail,
                        )
                    }
                    None => {
                        let detail = format!(
                            "participant {} has no correct trials{}; rt {} ms kept",
                            trial.participant_id,
                            match config.mean_scope {
                                MeanScope::Participant => String::new(),
                                MeanScope::ParticipantStage => format!(" in {}", trial.stage_label),
                            },
                            original
                        );
                        (original, ReasonCode::NoCorrectBaseline, None, detail)
                    }
                }
            }
        };

        let entry = CorrectionEntry {
            id,
            reason,
            correct_mean,
            detail,
            original_rt_ms: round_report(original),
            corrected_rt_ms: round_report(corrected),
        };
        (corrected, entry)
    }
}

fn mean_key(trial: &Trial, scope: MeanScope) -> MeanKey<'_> {
    match scope {
        MeanScope::Participant => (trial.participant_id.as_str(), None),
        MeanScope::ParticipantStage => (
            trial.participant_id.as_str(),
            Some(trial.stage_label.as_str()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Trial::fixture(0, "P1", "compatible", true, 500.0),
            Trial::fixture(1, "P1", "compatible", false, 900.0),
            Trial::fixture(2, "P1", "incompatible", true, 700.0),
            Trial::fixture(3, "P1", "incompatible", false, 400.0),
            Trial::fixture(4, "P2", "compatible", true, 800.0),
        ])
    }

    fn config(mode: CorrectionMode, mean_scope: MeanScope) -> CorrectionConfig {
        CorrectionConfig {
            mode,
            penalty_ms: 600.0,
            mean_scope,
        }
    }

    fn rts(ds: &Dataset) -> Vec<f64> {
        ds.trials().iter().map(|t| t.reaction_time_ms).collect()
    }

    #[test]
    fn test_disabled_is_identity() {
        let ds = dataset();
        let (out, report) = ErrorCorrector::apply(&ds, None);
        assert_eq!(out, ds);
        assert!(report.is_empty());
    }

    #[test]
    fn test_mean_of_correct_uses_pre_correction_mean() {
        let ds = dataset();
        let cfg = config(CorrectionMode::MeanOfCorrect, MeanScope::Participant);
        let (out, report) = ErrorCorrector::apply(&ds, Some(&cfg));

        // P1 correct mean = (500 + 700) / 2 = 600, both errors -> 1200
        assert_eq!(rts(&out), vec![500.0, 1200.0, 700.0, 1200.0, 800.0]);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].id, "1");
        assert_eq!(report[0].reason, ReasonCode::MeanOfCorrect);
        assert_eq!(report[0].correct_mean, Some(600.0));
        assert_eq!(report[0].original_rt_ms, 900.0);
        assert_eq!(report[0].corrected_rt_ms, 1200.0);
    }

    #[test]
    fn test_mean_scoped_per_stage() {
        let cfg = config(CorrectionMode::MeanOfCorrect, MeanScope::ParticipantStage);
        let (out, _) = ErrorCorrector::apply(&dataset(), Some(&cfg));
        assert_eq!(rts(&out), vec![500.0, 1100.0, 700.0, 1300.0, 800.0]);
    }

    #[test]
    fn test_own_trial_mode() {
        let cfg = config(CorrectionMode::OwnTrial, MeanScope::Participant);
        let (out, report) = ErrorCorrector::apply(&dataset(), Some(&cfg));

        assert_eq!(rts(&out), vec![500.0, 1500.0, 700.0, 1000.0, 800.0]);
        assert!(report.iter().all(|e| e.correct_mean.is_none()));
        assert!(report.iter().all(|e| e.reason == ReasonCode::OwnTrial));
    }

    #[test]
    fn test_row_count_and_correct_rows_preserved() {
        let ds = dataset();
        let cfg = config(CorrectionMode::MeanOfCorrect, MeanScope::Participant);
        let (out, _) = ErrorCorrector::apply(&ds, Some(&cfg));

        assert_eq!(out.len(), ds.len());
        for (before, after) in ds.trials().iter().zip(out.trials()) {
            assert_eq!(before.trial_id, after.trial_id);
            assert_eq!(before.is_correct, after.is_correct);
            assert_eq!(before.stage_label, after.stage_label);
            if before.is_correct {
                assert_eq!(before.reaction_time_ms, after.reaction_time_ms);
            }
        }
    }

    #[test]
    fn test_no_correct_baseline_keeps_rt() {
        let ds = Dataset::new(vec![
            Trial::fixture(0, "P1", "compatible", false, 700.0),
            Trial::fixture(1, "P1", "compatible", false, 900.0),
        ]);
        let cfg = config(CorrectionMode::MeanOfCorrect, MeanScope::Participant);
        let (out, report) = ErrorCorrector::apply(&ds, Some(&cfg));

        assert_eq!(out, ds);
        assert_eq!(report.len(), 2);
        assert!(report
            .iter()
            .all(|e| e.reason == ReasonCode::NoCorrectBaseline));
    }

    #[test]
    fn test_report_rounded_dataset_unrounded() {
        let ds = Dataset::new(vec![
            Trial::fixture(0, "P1", "compatible", true, 500.0),
            Trial::fixture(1, "P1", "compatible", true, 500.0),
            Trial::fixture(2, "P1", "compatible", true, 501.0),
            Trial::fixture(3, "P1", "compatible", false, 900.0),
        ]);
        let cfg = config(CorrectionMode::MeanOfCorrect, MeanScope::Participant);
        let (out, report) = ErrorCorrector::apply(&ds, Some(&cfg));

        assert_eq!(report[0].correct_mean, Some(500.333));
        assert_eq!(report[0].corrected_rt_ms, 1100.333);
        assert_eq!(report[0].original_rt_ms, 900.0);
        let rt = out.trials()[3].reaction_time_ms;
        assert!((rt - (1501.0 / 3.0 + 600.0)).abs() < 1e-9);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let ds = dataset();
        let snapshot = ds.clone();
        let cfg = config(CorrectionMode::OwnTrial, MeanScope::Participant);
        let _ = ErrorCorrector::apply(&ds, Some(&cfg));
        assert_eq!(ds, snapshot);
    }
}
