//! Statistics helpers
//!
//! Mean and sample standard deviation over reaction times and accuracies, plus
//! the 3-decimal rounding applied to every reported number.

/// Decimal places kept in reported values
pub const REPORT_DECIMALS: i32 = 3;

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().sum();
    Some(sum / values.len() as f64)
}

/// Sample standard deviation (n - 1 denominator)
///
/// Returns NaN for fewer than two values. A single observation has no spread
/// estimate; callers treat NaN as "undefined" rather than as an error.
pub fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}

/// Mean and sample std together; mean is NaN for an empty slice
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    (mean(values).unwrap_or(f64::NAN), sample_std(values))
}

/// Round to [`REPORT_DECIMALS`] places; NaN and infinities pass through
pub fn round_report(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(REPORT_DECIMALS);
    (value * factor).round() / factor
}
