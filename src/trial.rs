//! Trial-level exclusion
//!
//! Drops individual trials whose raw reaction time falls outside the enabled
//! cutoffs. Runs on the participant-filtered dataset, before error correction.

use crate::config::TrialRules;
use crate::types::{Dataset, ExclusionEntry, ReasonCode, Trial};

/// Trial-level filter
pub struct TrialFilter;

impl TrialFilter {
    /// Remove out-of-bound trials and report each removal
    ///
    /// A trial violating both cutoffs (only possible when fast > slow) gets one
    /// entry per rule.
    pub fn apply(dataset: &Dataset, rules: &TrialRules) -> (Dataset, Vec<ExclusionEntry>) {
        if rules.fast.is_none() && rules.slow.is_none() {
            return (dataset.clone(), Vec::new());
        }

        let mut report = Vec::new();
        let kept = dataset.retain_to_new(|trial| {
            let violations = Self::violations(trial, rules);
            let keep = violations.is_empty();
            report.extend(violations);
            keep
        });

        tracing::debug!(
            trials_removed = dataset.len() - kept.len(),
            trials_kept = kept.len(),
            "trial-level filter applied"
        );

        (kept, report)
    }

    /// Report entries for each enabled cutoff the trial violates
    pub fn violations(trial: &Trial, rules: &TrialRules) -> Vec<ExclusionEntry> {
        let rt = trial.reaction_time_ms;
        let mut entries = Vec::new();

        if let Some(cutoff) = &rules.fast {
            if rt < cutoff.threshold_ms {
                entries.push(ExclusionEntry {
                    id: trial.trial_id.to_string(),
                    reason: ReasonCode::BelowThreshold,
                    detail: format!(
                        "participant {} rt {} ms < {} ms",
                        trial.participant_id, rt, cutoff.threshold_ms
                    ),
                });
            }
        }

        if let Some(cutoff) = &rules.slow {
            if rt > cutoff.threshold_ms {
                entries.push(ExclusionEntry {
                    id: trial.trial_id.to_string(),
                    reason: ReasonCode::AboveThreshold,
                    detail: format!(
                        "participant {} rt {} ms > {} ms",
                        trial.participant_id, rt, cutoff.threshold_ms
                    ),
                });
            }
        }

        entries
    }
}
