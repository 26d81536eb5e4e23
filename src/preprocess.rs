//! Outcome summaries used before binding: missingness, structural values, and the
//! observed moments that seed initial values.

use crate::utils::{mean, std_dev, usize_to_f64};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeDiagnostics {
    pub n_rows: usize,
    pub n_observed: usize,
    pub n_missing: usize,
    /// Observed values equal to the structural value, if one is set.
    pub n_structural: usize,
    pub n_negative: usize,
    pub n_zero: usize,
    pub n_positive: usize,
    pub missing_share: f64,
    /// Share of observed values that are structural.
    pub structural_share: f64,
    /// Mean of observed non-structural values (`NaN` when there are none).
    pub observed_mean: f64,
    /// Standard deviation of observed non-structural values.
    pub observed_sd: f64,
}

/// Count observed, missing, and structural entries and summarize the rest.
#[must_use]
pub fn outcome_diagnostics(values: &[Option<f64>], structural: Option<f64>) -> OutcomeDiagnostics {
    let n_rows = values.len();
    let mut n_observed = 0usize;
    let mut n_structural = 0usize;
    let mut n_negative = 0usize;
    let mut n_zero = 0usize;
    let mut n_positive = 0usize;

    for value in values.iter().flatten() {
        n_observed += 1;
        if structural.is_some_and(|s| *value == s) {
            n_structural += 1;
        }
        if *value < 0.0 {
            n_negative += 1;
        } else if *value == 0.0 {
            n_zero += 1;
        } else {
            n_positive += 1;
        }
    }

    let (continuous, _) = non_structural_observed(values, structural);
    let n_missing = n_rows - n_observed;
    let share = |count: usize, total: usize| {
        if total > 0 {
            usize_to_f64(count) / usize_to_f64(total)
        } else {
            0.0
        }
    };

    OutcomeDiagnostics {
        n_rows,
        n_observed,
        n_missing,
        n_structural,
        n_negative,
        n_zero,
        n_positive,
        missing_share: share(n_missing, n_rows),
        structural_share: share(n_structural, n_observed),
        observed_mean: mean(&continuous),
        observed_sd: std_dev(&continuous),
    }
}

/// Observed values that are not structural, with their positions in `values`.
#[must_use]
pub fn non_structural_observed(
    values: &[Option<f64>],
    structural: Option<f64>,
) -> (Vec<f64>, Vec<usize>) {
    values
        .iter()
        .enumerate()
        .filter_map(|(position, value)| {
            let value = (*value)?;
            if structural.is_some_and(|s| value == s) {
                None
            } else {
                Some((value, position))
            }
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn outcome_diagnostics_counts_values() {
        let values = [Some(-1.0), Some(0.0), Some(2.0), Some(3.0), None];
        let diag = outcome_diagnostics(&values, None);
        assert_eq!(diag.n_rows, 5);
        assert_eq!(diag.n_observed, 4);
        assert_eq!(diag.n_missing, 1);
        assert_eq!(diag.n_negative, 1);
        assert_eq!(diag.n_zero, 1);
        assert_eq!(diag.n_positive, 2);
        assert_relative_eq!(diag.missing_share, 0.2);
        assert_relative_eq!(diag.observed_mean, 1.0);
    }

    #[test]
    fn structural_values_are_excluded_from_moments() {
        let values = [Some(1.0), Some(0.5), Some(1.0), None, Some(0.7)];
        let diag = outcome_diagnostics(&values, Some(1.0));
        assert_eq!(diag.n_structural, 2);
        assert_relative_eq!(diag.structural_share, 0.5);
        assert_relative_eq!(diag.observed_mean, 0.6, epsilon = 1.0e-12);

        let (continuous, positions) = non_structural_observed(&values, Some(1.0));
        assert_eq!(continuous, vec![0.5, 0.7]);
        assert_eq!(positions, vec![1, 4]);
    }
}
