//! Participant-level exclusion
//!
//! Removes every trial of a participant whose aggregate quality fails an
//! enabled rule. All rules look at the same unfiltered input, so one rule's
//! removals never influence another rule's decision.

use crate::config::{ErrorRateRule, ParticipantRules, RatioRule, StdOutlierRule};
use crate::stats::{round_report, sample_std};
use crate::types::{Dataset, ExclusionEntry, ReasonCode, Trial};
use std::collections::HashSet;

/// Aggregate quality metrics of one participant
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantMetrics {
    pub trials: usize,
    pub fast_count: usize,
    pub slow_count: usize,
    pub error_count: usize,
    /// Sample std of reaction time; NaN with a single trial
    pub rt_std: f64,
}

/// Participant-level filter
pub struct ParticipantFilter;

impl ParticipantFilter {
    /// Apply every enabled rule and return the kept dataset plus the report
    ///
    /// The report holds one entry per (participant, triggering rule); a
    /// participant flagged by several rules is still removed once.
    pub fn apply(dataset: &Dataset, rules: &ParticipantRules) -> (Dataset, Vec<ExclusionEntry>) {
        let mut report = Vec::new();

        if rules_disabled(rules) {
            return (dataset.clone(), report);
        }

        let group_std = sample_std(&reaction_times(dataset.trials().iter()));

        for (participant, trials) in dataset.by_participant() {
            let metrics = Self::metrics(&trials, rules);
            report.extend(Self::flags(participant, &metrics, rules, group_std));
        }

        let excluded: HashSet<&str> = report.iter().map(|e| e.id.as_str()).collect();
        let kept = dataset.retain_to_new(|t| !excluded.contains(t.participant_id.as_str()));

        tracing::debug!(
            participants_excluded = excluded.len(),
            entries = report.len(),
            trials_kept = kept.len(),
            "participant-level filter applied"
        );

        (kept, report)
    }

    /// Compute the metrics the enabled rules need for one participant
    pub fn metrics(trials: &[&Trial], rules: &ParticipantRules) -> ParticipantMetrics {
        let fast_threshold = rules.fast_ratio.map(|r| r.threshold_ms);
        let slow_threshold = rules.slow_ratio.map(|r| r.threshold_ms);

        let fast_count = fast_threshold
            .map(|th| trials.iter().filter(|t| t.reaction_time_ms < th).count())
            .unwrap_or(0);
        let slow_count = slow_threshold
            .map(|th| trials.iter().filter(|t| t.reaction_time_ms > th).count())
            .unwrap_or(0);
        let error_count = trials.iter().filter(|t| !t.is_correct).count();
        let rt_std = sample_std(&reaction_times(trials.iter().copied()));

        ParticipantMetrics {
            trials: trials.len(),
            fast_count,
            slow_count,
            error_count,
            rt_std,
        }
    }

    /// Report entries for every enabled rule the participant fails, in rule order
    pub fn flags(
        participant: &str,
        metrics: &ParticipantMetrics,
        rules: &ParticipantRules,
        group_std: f64,
    ) -> Vec<ExclusionEntry> {
        let mut entries = Vec::new();
        let entry = |reason: ReasonCode, detail: String| ExclusionEntry {
            id: participant.to_string(),
            reason,
            detail,
        };

        if let Some(rule) = &rules.fast_ratio {
            if let Some(detail) = check_ratio(metrics.fast_count, metrics.trials, rule, "<") {
                entries.push(entry(ReasonCode::FastRatio, detail));
            }
        }

        if let Some(rule) = &rules.slow_ratio {
            if let Some(detail) = check_ratio(metrics.slow_count, metrics.trials, rule, ">") {
                entries.push(entry(ReasonCode::SlowRatio, detail));
            }
        }

        if let Some(rule) = &rules.error_rate {
            if let Some(detail) = check_error_rate(metrics, rule) {
                entries.push(entry(ReasonCode::ErrorRate, detail));
            }
        }

        if let Some(rule) = &rules.rt_std_outlier {
            if let Some(detail) = check_std_outlier(metrics.rt_std, group_std, rule) {
                entries.push(entry(ReasonCode::RtStdOutlier, detail));
            }
        }

        entries
    }
}

fn rules_disabled(rules: &ParticipantRules) -> bool {
    rules.fast_ratio.is_none()
        && rules.slow_ratio.is_none()
        && rules.error_rate.is_none()
        && rules.rt_std_outlier.is_none()
}

fn reaction_times<'a>(trials: impl Iterator<Item = &'a Trial>) -> Vec<f64> {
    trials.map(|t| t.reaction_time_ms).collect()
}

fn ratio(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64
}

fn check_ratio(count: usize, total: usize, rule: &RatioRule, op: &str) -> Option<String> {
    let share = ratio(count, total);
    let limit = rule.max_percent / 100.0;
    if share > limit {
        Some(format!(
            "{}/{} trials {} {} ms ({}% > {}%)",
            count,
            total,
            op,
            rule.threshold_ms,
            round_report(share * 100.0),
            rule.max_percent
        ))
    } else {
        None
    }
}

fn check_error_rate(metrics: &ParticipantMetrics, rule: &ErrorRateRule) -> Option<String> {
    let share = ratio(metrics.error_count, metrics.trials);
    if share > rule.max_percent / 100.0 {
        Some(format!(
            "{}/{} trials incorrect ({}% > {}%)",
            metrics.error_count,
            metrics.trials,
            round_report(share * 100.0),
            rule.max_percent
        ))
    } else {
        None
    }
}

fn check_std_outlier(rt_std: f64, group_std: f64, rule: &StdOutlierRule) -> Option<String> {
    let limit = rule.multiplier * group_std;
    // NaN on either side compares false, so single-trial participants never flag.
    if rt_std > limit {
        Some(format!(
            "rt std {} > {} x group std {} ({})",
            round_report(rt_std),
            rule.multiplier,
            round_report(group_std),
            round_report(limit)
        ))
    } else {
        None
    }
}
