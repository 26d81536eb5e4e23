//! Chain-level convergence statistics: split-R-hat, autocorrelation and ESS.

use std::collections::BTreeMap;

use crate::utils::{mean, sample_variance, usize_to_f64};

use super::draws::PosteriorDraws;

/// R-hat above this value is reported as a convergence warning.
pub const RHAT_WARNING_THRESHOLD: f64 = 1.1;

/// Lag-`k` autocorrelation for a scalar chain.
#[must_use]
pub fn autocorrelation(series: &[f64], lag: usize) -> f64 {
    if series.is_empty() || lag >= series.len() {
        return 0.0;
    }

    let n = series.len() - lag;
    let center = mean(series);

    let denominator = series
        .iter()
        .map(|value| {
            let centered = value - center;
            centered * centered
        })
        .sum::<f64>();
    if denominator <= 0.0 {
        return 0.0;
    }

    let numerator = (0..n)
        .map(|idx| (series[idx] - center) * (series[idx + lag] - center))
        .sum::<f64>();

    numerator / denominator
}

/// Effective sample size of one chain from Geyer's initial monotone sequence.
///
/// Autocorrelations are summed in adjacent pairs `rho(2k) + rho(2k + 1)` until a
/// pair turns non-positive, and each pair is capped by the one before it. The
/// estimate never exceeds the chain length.
#[must_use]
pub fn effective_sample_size(series: &[f64]) -> f64 {
    let n = series.len();
    if n < 4 {
        return usize_to_f64(n);
    }

    let mut pair_sum = 0.0;
    let mut previous = f64::INFINITY;
    let mut lag = 0;
    while lag + 1 < n {
        let pair = autocorrelation(series, lag) + autocorrelation(series, lag + 1);
        if pair <= 0.0 {
            break;
        }
        let pair = pair.min(previous);
        pair_sum += pair;
        previous = pair;
        lag += 2;
    }

    let integrated_time = 2.0f64.mul_add(pair_sum, -1.0).max(1.0);
    usize_to_f64(n) / integrated_time
}

/// Effective sample size pooled over chains, as the sum of per-chain estimates.
#[must_use]
pub fn pooled_effective_sample_size(chains: &[&[f64]]) -> f64 {
    chains.iter().map(|chain| effective_sample_size(chain)).sum()
}

/// Split-R-hat for one scalar across chains.
///
/// Chains are truncated to the shortest even length and each is split in halves.
/// Returns `None` with fewer than two chains or fewer than four draws per chain.
#[must_use]
pub fn split_rhat(chains: &[&[f64]]) -> Option<f64> {
    if chains.len() < 2 {
        return None;
    }
    let min_draws = chains.iter().map(|chain| chain.len()).min().unwrap_or(0);
    let used = min_draws - (min_draws % 2);
    if used < 4 {
        return None;
    }

    let half = used / 2;
    let mut halves = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        halves.push(&chain[..half]);
        halves.push(&chain[half..used]);
    }

    Some(rhat_scalar(&halves))
}

fn rhat_scalar(chains: &[&[f64]]) -> f64 {
    let n = chains.first().map_or(0, |chain| chain.len());
    let m = chains.len();
    if m < 2 || n < 2 {
        return 1.0;
    }

    let chain_means = chains.iter().map(|chain| mean(chain)).collect::<Vec<_>>();
    let chain_vars = chains
        .iter()
        .zip(chain_means.iter())
        .map(|(chain, center)| sample_variance(chain, *center))
        .collect::<Vec<_>>();

    let mean_of_means = mean(&chain_means);
    let between = usize_to_f64(n)
        * chain_means
            .iter()
            .map(|center| {
                let centered = *center - mean_of_means;
                centered * centered
            })
            .sum::<f64>()
        / usize_to_f64(m - 1);
    let within = chain_vars.iter().sum::<f64>() / usize_to_f64(m);

    if !(within.is_finite() && within > 0.0 && between.is_finite()) {
        return 1.0;
    }

    let n_f64 = usize_to_f64(n);
    let var_plus = ((n_f64 - 1.0) / n_f64).mul_add(within, between / n_f64);
    if !var_plus.is_finite() || var_plus <= 0.0 {
        return 1.0;
    }

    (var_plus / within).sqrt().max(1.0)
}

/// Convergence statistics for one monitored element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergenceSummary {
    pub rhat: f64,
    pub ess: f64,
}

/// Convergence statistics for every monitored element, plus warnings.
#[derive(Debug, Clone, Default)]
pub struct ConvergenceReport {
    pub summaries: BTreeMap<String, ConvergenceSummary>,
    /// Elements whose R-hat exceeds [`RHAT_WARNING_THRESHOLD`].
    pub warnings: Vec<String>,
    pub max_rhat: Option<f64>,
}

impl ConvergenceReport {
    /// Compute split-R-hat and ESS for every element stored in `draws`.
    #[must_use]
    pub fn from_draws(draws: &PosteriorDraws) -> Self {
        let summaries = draws
            .names()
            .iter()
            .filter_map(|name| {
                let chains = draws.chains_of(name)?;
                let rhat = split_rhat(&chains).unwrap_or(f64::NAN);
                let ess = pooled_effective_sample_size(&chains);
                Some((name.clone(), ConvergenceSummary { rhat, ess }))
            })
            .collect();
        Self::from_summaries(summaries)
    }

    /// Wrap summaries computed elsewhere, such as by the sampler itself.
    #[must_use]
    pub fn from_summaries(summaries: BTreeMap<String, ConvergenceSummary>) -> Self {
        let warnings = summaries
            .iter()
            .filter(|(_, summary)| summary.rhat > RHAT_WARNING_THRESHOLD)
            .map(|(name, _)| name.clone())
            .collect();
        let max_rhat = summaries
            .values()
            .map(|summary| summary.rhat)
            .filter(|rhat| rhat.is_finite())
            .max_by(f64::total_cmp);
        Self {
            summaries,
            warnings,
            max_rhat,
        }
    }

    #[must_use]
    pub fn get(&self, element: &str) -> Option<&ConvergenceSummary> {
        self.summaries.get(element)
    }

    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.warnings.is_empty()
    }
}
