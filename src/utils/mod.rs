/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Shared numeric and summary helpers for model compilation and post-processing.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Utilities
//!
//! Shared helpers for draw summaries, stable link transforms, and working with
//! faer matrices.

use faer::Mat;
use num_traits::ToPrimitive;

const EPS_PROBABILITY: f64 = 1.0e-12;

#[must_use]
pub fn usize_to_f64(value: usize) -> f64 {
    f64::from(u32::try_from(value).unwrap_or(u32::MAX))
}

#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / usize_to_f64(values.len())
}

#[must_use]
pub fn sample_variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values
        .iter()
        .map(|value| {
            let centered = *value - mean;
            centered * centered
        })
        .sum::<f64>()
        / usize_to_f64(values.len() - 1)
}

#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    sample_variance(values, mean(values)).max(0.0).sqrt()
}

/// Linear-interpolated percentile of an ascending slice.
#[must_use]
pub fn percentile(sorted_values: &[f64], probability: f64) -> f64 {
    if sorted_values.is_empty() {
        return f64::NAN;
    }

    let clamped = probability.clamp(0.0, 1.0);
    let last = sorted_values.len() - 1;
    let position = clamped * usize_to_f64(last);
    let lower = position.floor().to_usize().unwrap_or(0);
    let upper = position.ceil().to_usize().unwrap_or(last);

    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = position - usize_to_f64(lower);
        (1.0 - weight).mul_add(sorted_values[lower], weight * sorted_values[upper])
    }
}

/// Posterior summary of a scalar draw sequence with an equal-tailed interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IntervalSummary {
    pub mean: f64,
    pub std_dev: f64,
    pub lower: f64,
    pub median: f64,
    pub upper: f64,
    /// Probability mass covered by `[lower, upper]`.
    pub prob: f64,
}

/// Summarize draws with a central credible interval of mass `prob`.
#[must_use]
pub fn summarize_interval(values: &[f64], prob: f64) -> IntervalSummary {
    if values.is_empty() {
        return IntervalSummary {
            prob,
            ..IntervalSummary::default()
        };
    }

    let center = mean(values);
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let tail = (1.0 - prob.clamp(0.0, 1.0)) / 2.0;

    IntervalSummary {
        mean: center,
        std_dev: sample_variance(values, center).max(0.0).sqrt(),
        lower: percentile(&sorted, tail),
        median: percentile(&sorted, 0.5),
        upper: percentile(&sorted, 1.0 - tail),
        prob,
    }
}

/// Stable logistic transform.
#[must_use]
pub fn logistic_stable(value: f64) -> f64 {
    if value >= 0.0 {
        let z = (-value).exp();
        1.0 / (1.0 + z)
    } else {
        let z = value.exp();
        z / (1.0 + z)
    }
}

/// Bound probability away from exact 0 and 1.
#[must_use]
pub fn clamp_probability(probability: f64) -> f64 {
    probability.clamp(EPS_PROBABILITY, 1.0 - EPS_PROBABILITY)
}

#[must_use]
pub fn logit(probability: f64) -> f64 {
    let p = clamp_probability(probability);
    (p / (1.0 - p)).ln()
}

#[must_use]
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|value| (value - max).exp()).sum::<f64>().ln()
}

/// Column means of a matrix; empty when the matrix has no rows.
#[must_use]
pub fn column_means(matrix: &Mat<f64>) -> Vec<f64> {
    if matrix.nrows() == 0 {
        return vec![0.0; matrix.ncols()];
    }
    (0..matrix.ncols())
        .map(|col| {
            (0..matrix.nrows()).map(|row| matrix[(row, col)]).sum::<f64>()
                / usize_to_f64(matrix.nrows())
        })
        .collect()
}

#[must_use]
pub fn select_rows(matrix: &Mat<f64>, indices: &[usize]) -> Mat<f64> {
    Mat::from_fn(indices.len(), matrix.ncols(), |i, j| {
        matrix[(indices[i], j)]
    })
}
