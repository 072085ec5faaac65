//! Descriptive statistics per stage label

use crate::stats::{mean_std, round_report};
use crate::types::{Dataset, StageSummary};

/// Descriptive summarizer
pub struct DescriptiveSummarizer;

impl DescriptiveSummarizer {
    /// One row per observed stage label, in first-appearance order
    pub fn summarize(dataset: &Dataset) -> Vec<StageSummary> {
        dataset
            .by_stage()
            .into_iter()
            .map(|(stage, trials)| {
                let rts: Vec<f64> = trials.iter().map(|t| t.reaction_time_ms).collect();
                let acc: Vec<f64> = trials
                    .iter()
                    .map(|t| if t.is_correct { 1.0 } else { 0.0 })
                    .collect();
                let (rt_mean, rt_std) = mean_std(&rts);
                let (acc_mean, acc_std) = mean_std(&acc);

                StageSummary {
                    stage_label: stage.to_string(),
                    trials: trials.len(),
                    rt_mean: round_report(rt_mean),
                    rt_std: round_report(rt_std),
                    acc_mean: round_report(acc_mean),
                    acc_std: round_report(acc_std),
                }
            })
            .collect()
    }
}
