//! Model assessment on a finished fit: per-parameter convergence diagnostics,
//! Geweke scores, posterior predictive checks, and predictive information
//! criteria.

pub mod pic;
pub mod psis;

use num_traits::ToPrimitive;
use statrs::distribution::{ContinuousCDF, Normal};
use thiserror::Error;

use crate::inference::{autocorrelation, effective_sample_size};
use crate::utils::{IntervalSummary, mean, sample_variance, std_dev, summarize_interval, usize_to_f64};

use super::fit::FitResult;
use super::registry::Outcome;

pub use pic::{InformationCriterion, PicMethod, PicScope, information_criterion};

/// Interval mass of predictive summaries.
const PREDICTIVE_PROB: f64 = 0.95;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagnosticsError {
    #[error("no monitored parameter matches `{0}`")]
    UnknownParameter(String),
    #[error("posterior draws lack `{0}`")]
    MissingNode(String),
    #[error("arm must be 1 or 2; found {0}")]
    InvalidArm(usize),
    #[error("replicate nodes were not monitored; refit with posterior predictive checks enabled")]
    ReplicatesDisabled,
    #[error("log-likelihood nodes were not monitored; refit with model diagnostics enabled")]
    LogLikelihoodDisabled,
    #[error("no observations contribute to the {0} scope")]
    EmptyScope(PicScope),
    #[error("the {outcome} outcome of arm {arm} has no observed values")]
    NoObservations { outcome: Outcome, arm: usize },
}

/// Geweke comparison of the early and late parts of one chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GewekeScore {
    /// 1-based chain.
    pub chain: usize,
    pub z: f64,
    /// Two-sided p-value under the standard normal.
    pub p_value: f64,
}

/// Geweke z-score between the first `first` and last `last` fractions of `series`.
///
/// Segment variances are scaled by their effective sample sizes. Returns `None`
/// when either segment has fewer than two draws.
#[must_use]
pub fn geweke(series: &[f64], first: f64, last: f64) -> Option<(f64, f64)> {
    let n = usize_to_f64(series.len());
    let head = (first.clamp(0.0, 1.0) * n).floor().to_usize()?;
    let tail = (last.clamp(0.0, 1.0) * n).floor().to_usize()?;
    if head < 2 || tail < 2 || head + tail > series.len() {
        return None;
    }
    let early = &series[..head];
    let late = &series[series.len() - tail..];

    let segment_variance = |segment: &[f64]| {
        sample_variance(segment, mean(segment)) / effective_sample_size(segment).max(1.0)
    };
    let spread = (segment_variance(early) + segment_variance(late)).sqrt();
    if !(spread.is_finite() && spread > 0.0) {
        return Some((0.0, 1.0));
    }
    let z = (mean(early) - mean(late)) / spread;
    let p_value = Normal::new(0.0, 1.0).map_or(f64::NAN, |normal| 2.0 * normal.sf(z.abs()));
    Some((z, p_value))
}

/// Diagnostics of one monitored element.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDiagnostics {
    pub element: String,
    pub summary: IntervalSummary,
    pub rhat: f64,
    pub ess: f64,
    /// Lag-1 autocorrelation averaged over chains.
    pub lag_one: f64,
    pub geweke: Vec<GewekeScore>,
}

fn select_elements<'a>(
    result: &'a FitResult,
    parameter: Option<&str>,
) -> Result<Vec<&'a str>, DiagnosticsError> {
    let draws = &result.draws;
    match parameter {
        None => Ok(draws.names().iter().map(String::as_str).collect()),
        Some(name) if draws.contains(name) => Ok(draws
            .names()
            .iter()
            .map(String::as_str)
            .filter(|element| *element == name)
            .collect()),
        Some(name) => {
            let elements = draws.elements_of(name);
            if elements.is_empty() {
                Err(DiagnosticsError::UnknownParameter(name.to_string()))
            } else {
                Ok(elements)
            }
        }
    }
}

/// Diagnostics for every element of `parameter` (a node such as `alpha0` or an
/// element such as `alpha0[1]`), or for every monitored element.
///
/// # Errors
///
/// Returns `DiagnosticsError::UnknownParameter` when nothing matches.
pub fn parameter_diagnostics(
    result: &FitResult,
    parameter: Option<&str>,
    prob: f64,
) -> Result<Vec<ParameterDiagnostics>, DiagnosticsError> {
    let draws = &result.draws;
    select_elements(result, parameter)?
        .into_iter()
        .map(|element| {
            let pooled = draws
                .element(element)
                .ok_or_else(|| DiagnosticsError::MissingNode(element.to_string()))?;
            let chains = draws
                .chains_of(element)
                .ok_or_else(|| DiagnosticsError::MissingNode(element.to_string()))?;
            let convergence = result.convergence.get(element);
            let lag_one = mean(
                &chains
                    .iter()
                    .map(|chain| autocorrelation(chain, 1))
                    .collect::<Vec<_>>(),
            );
            let scores = chains
                .iter()
                .enumerate()
                .filter_map(|(chain, series)| {
                    geweke(series, 0.1, 0.5).map(|(z, p_value)| GewekeScore {
                        chain: chain + 1,
                        z,
                        p_value,
                    })
                })
                .collect();
            Ok(ParameterDiagnostics {
                element: element.to_string(),
                summary: summarize_interval(pooled, prob),
                rhat: convergence.map_or(f64::NAN, |c| c.rhat),
                ess: convergence.map_or(f64::NAN, |c| c.ess),
                lag_one,
                geweke: scores,
            })
        })
        .collect()
}

/// Per-chain draws of one element.
///
/// # Errors
///
/// Returns `DiagnosticsError::MissingNode` for an element that was not monitored.
pub fn trace(result: &FitResult, element: &str) -> Result<Vec<Vec<f64>>, DiagnosticsError> {
    result
        .draws
        .chains_of(element)
        .map(|chains| chains.into_iter().map(<[f64]>::to_vec).collect())
        .ok_or_else(|| DiagnosticsError::MissingNode(element.to_string()))
}

/// Autocorrelations at lags `0..=max_lag`, one row per chain.
///
/// # Errors
///
/// Returns `DiagnosticsError::MissingNode` for an element that was not monitored.
pub fn autocorrelation_profile(
    result: &FitResult,
    element: &str,
    max_lag: usize,
) -> Result<Vec<Vec<f64>>, DiagnosticsError> {
    let chains = result
        .draws
        .chains_of(element)
        .ok_or_else(|| DiagnosticsError::MissingNode(element.to_string()))?;
    Ok(chains
        .into_iter()
        .map(|chain| (0..=max_lag).map(|lag| autocorrelation(chain, lag)).collect())
        .collect())
}

/// Posterior predictive check for one outcome in one arm.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictiveCheck {
    pub outcome: Outcome,
    pub arm: usize,
    pub observed: Vec<f64>,
    /// Replicated data sets at evenly spaced draws, restricted to observed
    /// positions.
    pub replicates: Vec<Vec<f64>>,
    pub observed_mean: f64,
    pub observed_sd: f64,
    pub replicated_mean: IntervalSummary,
    pub replicated_sd: IntervalSummary,
    /// Share of draws whose replicated mean is at least the observed mean.
    pub p_mean: f64,
    pub p_sd: f64,
}

/// Compare observed values of `outcome` in `arm` (1-based) with replicated data.
///
/// `display` caps the number of replicated data sets kept for display.
///
/// # Errors
///
/// Returns `DiagnosticsError` when replicates were not monitored, the arm is
/// invalid, or the arm has no observed values.
pub fn posterior_predictive(
    result: &FitResult,
    outcome: Outcome,
    arm: usize,
    display: usize,
) -> Result<PredictiveCheck, DiagnosticsError> {
    if !(1..=2).contains(&arm) {
        return Err(DiagnosticsError::InvalidArm(arm));
    }
    let node = format!("rep_{}{arm}", outcome.suffix());
    if !result.model.is_monitored(&node) {
        return Err(DiagnosticsError::ReplicatesDisabled);
    }

    let positions = result
        .prepared
        .outcome(outcome, arm - 1)
        .iter()
        .enumerate()
        .filter_map(|(index, value)| value.map(|v| (index + 1, v)))
        .collect::<Vec<_>>();
    if positions.is_empty() {
        return Err(DiagnosticsError::NoObservations { outcome, arm });
    }
    let columns = positions
        .iter()
        .map(|(position, _)| {
            let element = format!("{node}[{position}]");
            result
                .draws
                .element(&element)
                .ok_or(DiagnosticsError::MissingNode(element))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let observed = positions.iter().map(|(_, v)| *v).collect::<Vec<_>>();
    let observed_mean = mean(&observed);
    let observed_sd = std_dev(&observed);

    let total = result.draws.total_draws();
    let replicate = |draw: usize| columns.iter().map(|column| column[draw]).collect::<Vec<_>>();
    let mut means = Vec::with_capacity(total);
    let mut sds = Vec::with_capacity(total);
    for draw in 0..total {
        let values = replicate(draw);
        means.push(mean(&values));
        sds.push(std_dev(&values));
    }
    let share_at_least = |stats: &[f64], reference: f64| {
        usize_to_f64(stats.iter().filter(|s| **s >= reference).count())
            / usize_to_f64(stats.len().max(1))
    };

    let shown = display.min(total);
    let replicates = (0..shown)
        .map(|slot| replicate(slot * total / shown))
        .collect();

    Ok(PredictiveCheck {
        outcome,
        arm,
        replicates,
        observed_mean,
        observed_sd,
        replicated_mean: summarize_interval(&means, PREDICTIVE_PROB),
        replicated_sd: summarize_interval(&sds, PREDICTIVE_PROB),
        p_mean: share_at_least(&means, observed_mean),
        p_sd: share_at_least(&sds, observed_sd),
        observed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{RngExt, SeedableRng};

    #[test]
    fn geweke_is_small_for_stationary_noise() {
        let mut rng = StdRng::seed_from_u64(5);
        let series = (0..1_000).map(|_| rng.random::<f64>()).collect::<Vec<_>>();
        let (z, p) = geweke(&series, 0.1, 0.5).expect("long enough");
        assert!(z.abs() < 3.0, "z {z}");
        assert!(p > 0.0 && p <= 1.0);
    }

    #[test]
    fn geweke_flags_a_drifting_chain() {
        let series = (0..1_000)
            .map(|i| usize_to_f64(i) / 100.0 + if i % 2 == 0 { 0.1 } else { -0.1 })
            .collect::<Vec<_>>();
        let (z, p) = geweke(&series, 0.1, 0.5).expect("long enough");
        assert!(z < -3.0, "z {z}");
        assert!(p < 0.01);
    }

    #[test]
    fn geweke_needs_enough_draws() {
        assert!(geweke(&[1.0, 2.0, 3.0], 0.1, 0.5).is_none());
    }
}
