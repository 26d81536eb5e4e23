//! Pareto-smoothed importance sampling for leave-one-out log densities.
//!
//! The largest raw importance ratios are replaced by expected order statistics of
//! a generalized Pareto fit to the tail (Zhang and Stephens estimator with a weak
//! prior on the shape), then truncated and normalized.

use num_traits::ToPrimitive;

use crate::utils::{log_sum_exp, usize_to_f64};

/// Shape values above this mark an unreliable importance-sampling estimate.
pub const PARETO_K_WARNING: f64 = 0.7;

const MIN_TAIL: usize = 5;
const PRIOR_SHAPE_WEIGHT: f64 = 10.0;
const PRIOR_SCALE: f64 = 3.0;

/// Smoothed log weights and the fitted tail shape `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedWeights {
    /// Normalized: `log_sum_exp(log_weights) == 0`.
    pub log_weights: Vec<f64>,
    pub pareto_k: f64,
}

/// Generalized Pareto fit to exceedances sorted ascending; returns `(k, sigma)`.
#[must_use]
pub fn gpd_fit(exceedances: &[f64]) -> (f64, f64) {
    let n = exceedances.len();
    if n == 0 {
        return (f64::INFINITY, f64::NAN);
    }
    let largest = exceedances[n - 1];
    let n_f64 = usize_to_f64(n);
    let quartile_index = (n_f64 / 4.0 + 0.5).floor().to_usize().unwrap_or(1).clamp(1, n) - 1;
    let quartile = exceedances[quartile_index].max(f64::MIN_POSITIVE);
    let m = 30 + usize_to_f64(n).sqrt().floor().to_usize().unwrap_or(0);
    let m_f64 = usize_to_f64(m);

    let thetas = (1..=m)
        .map(|j| {
            let spread = 1.0 - (m_f64 / (usize_to_f64(j) - 0.5)).sqrt();
            1.0 / largest + spread / PRIOR_SCALE / quartile
        })
        .collect::<Vec<_>>();
    let profile = thetas
        .iter()
        .map(|theta| {
            let k = exceedances.iter().map(|x| (-theta * x).ln_1p()).sum::<f64>() / n_f64;
            n_f64 * ((-theta / k).ln() - k - 1.0)
        })
        .map(|value| if value.is_finite() { value } else { f64::NEG_INFINITY })
        .collect::<Vec<_>>();

    let normalizer = log_sum_exp(&profile);
    let theta_hat = thetas
        .iter()
        .zip(&profile)
        .map(|(theta, l)| theta * (l - normalizer).exp())
        .sum::<f64>();
    let k = exceedances.iter().map(|x| (-theta_hat * x).ln_1p()).sum::<f64>() / n_f64;
    let sigma = -k / theta_hat;
    let adjusted = k.mul_add(n_f64, PRIOR_SHAPE_WEIGHT * 0.5) / (n_f64 + PRIOR_SHAPE_WEIGHT);
    (adjusted, sigma)
}

/// Quantile of the generalized Pareto distribution with location zero.
#[must_use]
pub fn gpd_quantile(p: f64, k: f64, sigma: f64) -> f64 {
    if k.abs() < f64::EPSILON {
        -sigma * (-p).ln_1p()
    } else {
        sigma * (-k * (-p).ln_1p()).exp_m1() / k
    }
}

/// Smooth the tail of `log_ratios`.
#[must_use]
pub fn smooth(log_ratios: &[f64]) -> SmoothedWeights {
    let draws = log_ratios.len();
    let max = log_ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut log_weights = log_ratios.iter().map(|r| r - max).collect::<Vec<_>>();

    let draws_f64 = usize_to_f64(draws);
    let tail = (0.2 * draws_f64)
        .min(3.0 * draws_f64.sqrt())
        .ceil()
        .to_usize()
        .unwrap_or(0);

    let mut pareto_k = f64::INFINITY;
    if tail >= MIN_TAIL && tail < draws {
        let mut order = (0..draws).collect::<Vec<_>>();
        order.sort_by(|a, b| log_weights[*a].total_cmp(&log_weights[*b]));
        let cutoff = log_weights[order[draws - tail - 1]];
        let exp_cutoff = cutoff.exp();
        let tail_rows = &order[draws - tail..];
        let exceedances = tail_rows
            .iter()
            .map(|row| log_weights[*row].exp() - exp_cutoff)
            .collect::<Vec<_>>();

        let (k, sigma) = gpd_fit(&exceedances);
        pareto_k = k;
        if k.is_finite() && sigma.is_finite() && sigma > 0.0 {
            let tail_f64 = usize_to_f64(tail);
            for (rank, row) in tail_rows.iter().enumerate() {
                let p = (usize_to_f64(rank + 1) - 0.5) / tail_f64;
                let smoothed = gpd_quantile(p, k, sigma) + exp_cutoff;
                log_weights[*row] = smoothed.ln();
            }
        }
    }

    for weight in &mut log_weights {
        *weight = weight.min(0.0);
    }
    let total = log_sum_exp(&log_weights);
    for weight in &mut log_weights {
        *weight -= total;
    }
    SmoothedWeights {
        log_weights,
        pareto_k,
    }
}

/// Leave-one-out expected log density of one observation and its tail shape.
#[must_use]
pub fn loo_point(loglik: &[f64]) -> (f64, f64) {
    let log_ratios = loglik.iter().map(|l| -l).collect::<Vec<_>>();
    let smoothed = smooth(&log_ratios);
    let weighted = smoothed
        .log_weights
        .iter()
        .zip(loglik)
        .map(|(w, l)| w + l)
        .collect::<Vec<_>>();
    (log_sum_exp(&weighted), smoothed.pareto_k)
}
