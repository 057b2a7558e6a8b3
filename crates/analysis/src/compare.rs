//! Statistical comparison of two sample sets.

use culprit_core::{Comparison, ComparisonResult};
use tracing::trace;
use crate::stats::{erfc, iqr, kolmogorov_smirnov, mann_whitney_u, normal_cdf};

/// p-value at or below which two sample sets are different.
pub const LOW_THRESHOLD: f64 = 0.01;

/// Floor for the IQR used to normalize the comparison magnitude.
pub const MIN_IQR: f64 = 0.001;

/// One-sided z quantile for 99% confidence.
const Z_99: f64 = 2.326_347_874;

/// Normal IQR expressed in standard deviations.
const IQR_IN_SIGMAS: f64 = 1.348_979_5;

/// What kind of metric is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Continuous metric; the magnitude is a shift in metric units and is
    /// normalized by the larger IQR of the two sets
    Performance,
    /// Pass/fail metric; the magnitude is a failure-rate difference
    Functional,
}

/// Compare two sample sets.
///
/// The p-value is the smaller of a Mann-Whitney U and a Kolmogorov-Smirnov
/// test. At or below [`LOW_THRESHOLD`] the sets are different; above the
/// high threshold they are the same; in between there is not yet enough
/// data. The high threshold is the p-value a true shift of `magnitude`
/// would stay under 99% of the time with `attempt_count` samples per side,
/// so more attempts lower it and let the verdict settle.
///
/// Either side empty gives [`ComparisonResult::Unknown`]. Sample order does
/// not matter.
pub fn compare(
    values_a: &[f64],
    values_b: &[f64],
    attempt_count: usize,
    mode: CompareMode,
    magnitude: f64,
) -> Comparison {
    if values_a.is_empty() || values_b.is_empty() {
        return Comparison::unknown();
    }

    let magnitude = if magnitude == 0.0 { 1.0 } else { magnitude.abs() };
    let high_threshold = match mode {
        CompareMode::Performance => {
            let spread = iqr(values_a).max(iqr(values_b)).max(MIN_IQR);
            high_threshold_performance(magnitude / spread, attempt_count)
        }
        CompareMode::Functional => high_threshold_functional(magnitude, attempt_count),
    }
    .max(LOW_THRESHOLD);

    let p_value = mann_whitney_u(values_a, values_b).min(kolmogorov_smirnov(values_a, values_b));
    let result = if p_value <= LOW_THRESHOLD {
        ComparisonResult::Different
    } else if p_value <= high_threshold {
        ComparisonResult::Unknown
    } else {
        ComparisonResult::Same
    };
    trace!(
        "compare n_a={} n_b={} attempts={} p={:.6} high={:.6} -> {}",
        values_a.len(),
        values_b.len(),
        attempt_count,
        p_value,
        high_threshold,
        result
    );

    Comparison {
        result,
        p_value: Some(p_value),
        low_threshold: Some(LOW_THRESHOLD),
        high_threshold: Some(high_threshold),
    }
}

/// High threshold for a shift of `normalized_magnitude` IQRs.
pub fn high_threshold_performance(normalized_magnitude: f64, attempt_count: usize) -> f64 {
    let shift_in_sigmas = normalized_magnitude * IQR_IN_SIGMAS;
    // P(Y > X) for two normals `shift_in_sigmas` apart
    let superiority = normal_cdf(shift_in_sigmas / std::f64::consts::SQRT_2);
    high_threshold_from_superiority(superiority, attempt_count)
}

/// High threshold for a failure-rate difference of `magnitude`.
pub fn high_threshold_functional(magnitude: f64, attempt_count: usize) -> f64 {
    let superiority = 0.5 + magnitude.clamp(0.0, 1.0) / 2.0;
    high_threshold_from_superiority(superiority, attempt_count)
}

/// Given the probability that a sample of one set exceeds a sample of the
/// other, the two-sided p-value the U test stays under with 99% probability.
fn high_threshold_from_superiority(superiority: f64, attempt_count: usize) -> f64 {
    if attempt_count == 0 {
        return 1.0;
    }
    let n = attempt_count as f64;
    let expected_z = (superiority - 0.5) * n * (12.0 / (2.0 * n + 1.0)).sqrt();
    if expected_z <= Z_99 {
        return 1.0;
    }
    erfc((expected_z - Z_99) / std::f64::consts::SQRT_2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_side_is_unknown() {
        let c = compare(&[], &[1.0, 2.0], 10, CompareMode::Performance, 1.0);
        assert_eq!(c.result, ComparisonResult::Unknown);
        assert!(c.p_value.is_none());
        let c = compare(&[1.0], &[], 10, CompareMode::Performance, 1.0);
        assert_eq!(c.result, ComparisonResult::Unknown);
    }

    #[test]
    fn test_identical_sets_are_same() {
        let ones = vec![1.0; 10];
        let c = compare(&ones, &ones, 10, CompareMode::Performance, 1.0);
        assert_eq!(c.result, ComparisonResult::Same);
        assert_eq!(c.p_value, Some(1.0));
        assert_eq!(c.low_threshold, Some(LOW_THRESHOLD));
    }

    #[test]
    fn test_shifted_sets_are_different() {
        let ones = vec![1.0; 10];
        let twos = vec![2.0; 10];
        assert_eq!(
            compare(&ones, &twos, 10, CompareMode::Performance, 1.0).result,
            ComparisonResult::Different
        );
        assert_eq!(
            compare(&twos, &ones, 10, CompareMode::Performance, 1.0).result,
            ComparisonResult::Different
        );
    }

    #[test]
    fn test_overlapping_sets_are_unknown_with_few_attempts() {
        // Same distribution shifted by a fraction of its spread.
        let a: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let b: Vec<f64> = (0..10).map(|i| i as f64 + 2.0).collect();
        let c = compare(&a, &b, 10, CompareMode::Performance, 1.0);
        assert_eq!(c.result, ComparisonResult::Unknown);
        assert!(c.p_value.unwrap() > LOW_THRESHOLD);
        assert!(c.p_value.unwrap() <= c.high_threshold.unwrap());
    }

    #[test]
    fn test_high_threshold_shrinks_with_attempts() {
        let few = high_threshold_performance(1.0, 10);
        let many = high_threshold_performance(1.0, 60);
        assert!(many < few);
        assert!(few <= 1.0);
        assert_eq!(high_threshold_performance(0.01, 10), 1.0);
        assert_eq!(high_threshold_functional(0.5, 0), 1.0);
    }

    #[test]
    fn test_noisier_metric_needs_bigger_gap() {
        let quiet_a = vec![10.0, 10.1, 10.0, 10.1, 10.0, 10.1, 10.0, 10.1, 10.0, 10.1];
        let quiet_b: Vec<f64> = quiet_a.iter().map(|v| v + 0.05).collect();
        let t_quiet = compare(&quiet_a, &quiet_b, 10, CompareMode::Performance, 1.0)
            .high_threshold
            .unwrap();

        let noisy_a: Vec<f64> = (0..10).map(|i| 10.0 + i as f64).collect();
        let noisy_b: Vec<f64> = noisy_a.iter().map(|v| v + 0.05).collect();
        let t_noisy = compare(&noisy_a, &noisy_b, 10, CompareMode::Performance, 1.0)
            .high_threshold
            .unwrap();

        // the same nominal magnitude is a smaller effect on the noisy metric
        assert!(t_noisy >= t_quiet);
    }
}
