//! D-score computation
//!
//! For each participant the D-score is the difference between incongruent and
//! congruent mean reaction times divided by the standard deviation of all
//! their congruent and incongruent trials:
//!
//! ```text
//! d = sign * (mean(incongruent) - mean(congruent)) / std(congruent ∪ incongruent)
//! ```
//!
//! `sign` follows the configured direction. Trials whose stage label is in
//! neither set (practice blocks and the like) are ignored. Participants with
//! an empty partition or zero spread get a not-computable entry instead of a
//! score; that is an expected outcome, not an error.

use crate::config::ScoringConfig;
use crate::stats::{mean_std, round_report};
use crate::types::{
    Dataset, ScoreRecord, ScoreTable, Trial, UnscorableParticipant, UnscorableReason,
};

/// Unrounded partition statistics of one participant
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionStats {
    pub congruent_count: usize,
    pub incongruent_count: usize,
    pub congruent_mean: f64,
    pub congruent_std: f64,
    pub incongruent_mean: f64,
    pub incongruent_std: f64,
    pub all_mean: f64,
    pub all_std: f64,
}

/// D-score calculator
pub struct DScoreCalculator;

impl DScoreCalculator {
    /// Score every participant of the dataset, in first-appearance order
    pub fn score(dataset: &Dataset, config: &ScoringConfig) -> ScoreTable {
        let mut table = ScoreTable::default();

        for (participant, trials) in dataset.by_participant() {
            match Self::score_participant(participant, &trials, config) {
                Ok(record) => table.scored.push(record),
                Err(reason) => {
                    tracing::debug!(participant, ?reason, "d-score not computable");
                    table.unscorable.push(UnscorableParticipant {
                        participant_id: participant.to_string(),
                        reason,
                    });
                }
            }
        }

        tracing::debug!(
            scored = table.scored.len(),
            unscorable = table.unscorable.len(),
            "d-scores computed"
        );

        table
    }

    /// Partition statistics over (optionally log-transformed) reaction times
    pub fn partition_stats(trials: &[&Trial], config: &ScoringConfig) -> PartitionStats {
        let value = |t: &Trial| {
            if config.log_transform {
                t.reaction_time_ms.ln()
            } else {
                t.reaction_time_ms
            }
        };

        let mut congruent = Vec::new();
        let mut incongruent = Vec::new();
        let mut all = Vec::new();

        for trial in trials {
            if config.congruent_labels.contains(&trial.stage_label) {
                congruent.push(value(trial));
                all.push(value(trial));
            } else if config.incongruent_labels.contains(&trial.stage_label) {
                incongruent.push(value(trial));
                all.push(value(trial));
            }
        }

        let (congruent_mean, congruent_std) = mean_std(&congruent);
        let (incongruent_mean, incongruent_std) = mean_std(&incongruent);
        let (all_mean, all_std) = mean_std(&all);

        PartitionStats {
            congruent_count: congruent.len(),
            incongruent_count: incongruent.len(),
            congruent_mean,
            congruent_std,
            incongruent_mean,
            incongruent_std,
            all_mean,
            all_std,
        }
    }

    /// Unrounded D-score from partition statistics
    pub fn d_value(stats: &PartitionStats, config: &ScoringConfig) -> Result<f64, UnscorableReason> {
        if stats.congruent_count == 0 {
            return Err(UnscorableReason::EmptyCongruent);
        }
        if stats.incongruent_count == 0 {
            return Err(UnscorableReason::EmptyIncongruent);
        }
        if stats.all_std == 0.0 {
            return Err(UnscorableReason::ZeroVariance);
        }

        let d = config.direction.sign() * (stats.incongruent_mean - stats.congruent_mean)
            / stats.all_std;
        if !d.is_finite() {
            return Err(UnscorableReason::NonFinite);
        }
        Ok(d)
    }

    fn score_participant(
        participant: &str,
        trials: &[&Trial],
        config: &ScoringConfig,
    ) -> Result<ScoreRecord, UnscorableReason> {
        let stats = Self::partition_stats(trials, config);
        let d = Self::d_value(&stats, config)?;

        Ok(ScoreRecord {
            participant_id: participant.to_string(),
            congruent_rt_mean: round_report(stats.congruent_mean),
            congruent_rt_std: round_report(stats.congruent_std),
            incongruent_rt_mean: round_report(stats.incongruent_mean),
            incongruent_rt_std: round_report(stats.incongruent_std),
            all_rt_mean: round_report(stats.all_mean),
            all_rt_std: round_report(stats.all_std),
            d_value: round_report(d),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Direction;
    use pretty_assertions::assert_eq;

    fn config() -> ScoringConfig {
        ScoringConfig::with_labels(["compatible"], ["incompatible"])
    }

    fn p1() -> Dataset {
        Dataset::new(vec![
            Trial::fixture(0, "P1", "compatible", true, 500.0),
            Trial::fixture(1, "P1", "compatible", true, 600.0),
            Trial::fixture(2, "P1", "incompatible", true, 700.0),
            Trial::fixture(3, "P1", "incompatible", true, 900.0),
        ])
    }

    #[test]
    fn test_reference_participant() {
        let table = DScoreCalculator::score(&p1(), &config());

        assert!(table.unscorable.is_empty());
        assert_eq!(
            table.scored,
            vec![ScoreRecord {
                participant_id: "P1".to_string(),
                congruent_rt_mean: 550.0,
                congruent_rt_std: 70.711,
                incongruent_rt_mean: 800.0,
                incongruent_rt_std: 141.421,
                all_rt_mean: 675.0,
                all_rt_std: 170.783,
                d_value: 1.464,
            }]
        );
    }

    #[test]
    fn test_direction_flips_sign() {
        let ds = p1();
        let forward = config();
        let mut backward = config();
        backward.direction = forward.direction.reversed();
        assert_eq!(backward.direction, Direction::CongruentMinusIncongruent);

        let d_forward = DScoreCalculator::score(&ds, &forward).d_value("P1").unwrap();
        let d_backward = DScoreCalculator::score(&ds, &backward).d_value("P1").unwrap();
        assert_eq!(d_forward, -d_backward);
    }

    #[test]
    fn test_division_uses_unrounded_values() {
        let cfg = config();
        let ds = p1();
        let trials: Vec<&Trial> = ds.trials().iter().collect();
        let stats = DScoreCalculator::partition_stats(&trials, &cfg);
        let d = DScoreCalculator::d_value(&stats, &cfg).unwrap();
        assert!((d - 250.0 / (87_500f64 / 3.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_empty_partition_is_unscorable() {
        let ds = Dataset::new(vec![
            Trial::fixture(0, "P1", "compatible", true, 500.0),
            Trial::fixture(1, "P1", "compatible", true, 600.0),
            Trial::fixture(2, "P2", "incompatible", true, 700.0),
            Trial::fixture(3, "P2", "incompatible", true, 750.0),
        ]);

        let table = DScoreCalculator::score(&ds, &config());
        assert!(table.scored.is_empty());
        assert_eq!(
            table.unscorable,
            vec![
                UnscorableParticipant {
                    participant_id: "P1".to_string(),
                    reason: UnscorableReason::EmptyIncongruent,
                },
                UnscorableParticipant {
                    participant_id: "P2".to_string(),
                    reason: UnscorableReason::EmptyCongruent,
                },
            ]
        );
    }

    #[test]
    fn test_zero_variance_is_unscorable() {
        let ds = Dataset::new(vec![
            Trial::fixture(0, "P1", "compatible", true, 500.0),
            Trial::fixture(1, "P1", "incompatible", true, 500.0),
        ]);

        let table = DScoreCalculator::score(&ds, &config());
        assert_eq!(table.unscorable[0].reason, UnscorableReason::ZeroVariance);
        assert_eq!(table.d_value("P1"), None);
    }

    #[test]
    fn test_other_stages_are_ignored() {
        let mut trials = p1().trials().to_vec();
        trials.push(Trial::fixture(4, "P1", "practice", true, 5_000.0));
        let table = DScoreCalculator::score(&Dataset::new(trials), &config());
        assert_eq!(table.d_value("P1"), Some(1.464));
    }

    #[test]
    fn test_log_transform() {
        let mut cfg = config();
        cfg.log_transform = true;
        let table = DScoreCalculator::score(&p1(), &cfg);

        let record = &table.scored[0];
        let expected_mean = round_report((500f64.ln() + 600f64.ln()) / 2.0);
        assert_eq!(record.congruent_rt_mean, expected_mean);
        assert!(record.d_value > 0.0);
    }

    #[test]
    fn test_multiple_labels_per_side() {
        let cfg = ScoringConfig::with_labels(["compatible1", "compatible2"], ["incompatible"]);
        let ds = Dataset::new(vec![
            Trial::fixture(0, "P1", "compatible1", true, 500.0),
            Trial::fixture(1, "P1", "compatible2", true, 600.0),
            Trial::fixture(2, "P1", "incompatible", true, 700.0),
            Trial::fixture(3, "P1", "incompatible", true, 900.0),
        ]);
        assert_eq!(DScoreCalculator::score(&ds, &cfg).d_value("P1"), Some(1.464));
    }
}
