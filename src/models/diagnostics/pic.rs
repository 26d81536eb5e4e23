//! Predictive information criteria (WAIC, PSIS-LOO, DIC) from the pointwise
//! log-likelihood nodes of a fit.
//!
//! Scopes choose which terms form an observation unit:
//! `Effects` and `Costs` use the outcome term of every individual with that
//! outcome observed, `Both` adds the two outcome terms of individuals with both
//! observed, and `Total` sums every outcome and indicator term of an individual
//! (missingness, pattern membership, or structural indicators).

use std::fmt;
use std::str::FromStr;

use crate::models::binder::PreparedData;
use crate::models::fit::FitResult;
use crate::models::registry::Outcome;
use crate::utils::{log_sum_exp, mean, sample_variance, usize_to_f64};

use super::DiagnosticsError;
use super::psis::{PARETO_K_WARNING, loo_point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PicMethod {
    Waic,
    Looic,
    Dic,
}

impl fmt::Display for PicMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Waic => "waic",
            Self::Looic => "looic",
            Self::Dic => "dic",
        })
    }
}

impl FromStr for PicMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "waic" => Ok(Self::Waic),
            "looic" | "loo" => Ok(Self::Looic),
            "dic" => Ok(Self::Dic),
            other => Err(format!("unknown information criterion `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PicScope {
    Total,
    Both,
    Effects,
    Costs,
}

impl fmt::Display for PicScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Total => "total",
            Self::Both => "both",
            Self::Effects => "effects",
            Self::Costs => "costs",
        })
    }
}

impl FromStr for PicScope {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "total" => Ok(Self::Total),
            "both" => Ok(Self::Both),
            "effects" => Ok(Self::Effects),
            "costs" => Ok(Self::Costs),
            other => Err(format!("unknown criterion scope `{other}`")),
        }
    }
}

/// Point estimates of one criterion over a set of observation units.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimates {
    /// Deviance scale; lower is better.
    pub value: f64,
    pub effective_parameters: f64,
    pub elpd: f64,
    /// Standard error of `value`; `NaN` for DIC.
    pub std_error: f64,
    /// Per-unit expected log predictive density (empty for DIC).
    pub pointwise: Vec<f64>,
    /// Per-unit Pareto shape (PSIS-LOO only).
    pub pareto_k: Vec<f64>,
}

fn deviance_std_error(pointwise: &[f64]) -> f64 {
    let n = usize_to_f64(pointwise.len());
    2.0 * (n * sample_variance(pointwise, mean(pointwise))).sqrt()
}

fn lppd(draws: &[f64]) -> f64 {
    log_sum_exp(draws) - usize_to_f64(draws.len()).ln()
}

/// WAIC from per-unit log-likelihood draws.
#[must_use]
pub fn waic(units: &[Vec<f64>]) -> Estimates {
    let mut penalty = 0.0;
    let pointwise = units
        .iter()
        .map(|draws| {
            let p = sample_variance(draws, mean(draws));
            penalty += p;
            lppd(draws) - p
        })
        .collect::<Vec<_>>();
    let elpd = pointwise.iter().sum::<f64>();
    Estimates {
        value: -2.0 * elpd,
        effective_parameters: penalty,
        elpd,
        std_error: deviance_std_error(&pointwise),
        pointwise,
        pareto_k: Vec::new(),
    }
}

/// PSIS leave-one-out criterion from per-unit log-likelihood draws.
#[must_use]
pub fn looic(units: &[Vec<f64>]) -> Estimates {
    let mut pareto_k = Vec::with_capacity(units.len());
    let mut total_lppd = 0.0;
    let pointwise = units
        .iter()
        .map(|draws| {
            let (elpd, k) = loo_point(draws);
            pareto_k.push(k);
            total_lppd += lppd(draws);
            elpd
        })
        .collect::<Vec<_>>();
    let elpd = pointwise.iter().sum::<f64>();
    Estimates {
        value: -2.0 * elpd,
        effective_parameters: total_lppd - elpd,
        elpd,
        std_error: deviance_std_error(&pointwise),
        pointwise,
        pareto_k,
    }
}

/// DIC with `pD = var(deviance) / 2`.
#[must_use]
pub fn dic(units: &[Vec<f64>]) -> Estimates {
    let draws = units.first().map_or(0, Vec::len);
    let deviance = (0..draws)
        .map(|draw| -2.0 * units.iter().map(|unit| unit[draw]).sum::<f64>())
        .collect::<Vec<_>>();
    let mean_deviance = mean(&deviance);
    let penalty = sample_variance(&deviance, mean_deviance) / 2.0;
    let value = mean_deviance + penalty;
    Estimates {
        value,
        effective_parameters: penalty,
        elpd: -value / 2.0,
        std_error: f64::NAN,
        pointwise: Vec::new(),
        pareto_k: Vec::new(),
    }
}

/// An information criterion evaluated on a fit.
#[derive(Debug, Clone, PartialEq)]
pub struct InformationCriterion {
    pub method: PicMethod,
    pub scope: PicScope,
    pub observations: usize,
    pub estimates: Estimates,
}

impl InformationCriterion {
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.estimates.value
    }

    /// Units whose Pareto shape exceeds the reliability threshold.
    #[must_use]
    pub fn high_pareto_k(&self) -> usize {
        self.estimates
            .pareto_k
            .iter()
            .filter(|k| k.is_nan() || **k > PARETO_K_WARNING)
            .count()
    }
}

/// Whether the outcome term of record `index` in `arm` (0-based) enters the
/// likelihood: observed, and not a structural value.
fn outcome_term(prepared: &PreparedData, outcome: Outcome, arm: usize, index: usize) -> bool {
    prepared.outcome(outcome, arm)[index].is_some()
        && prepared
            .structural
            .get(&outcome)
            .is_none_or(|indicators| indicators[arm][index] != Some(1.0))
}

fn indicator_term(prepared: &PreparedData, stem: &str, arm: usize, index: usize) -> bool {
    let outcome = match stem {
        "se" => Outcome::Effect,
        "sc" => Outcome::Cost,
        _ => return true,
    };
    prepared
        .structural
        .get(&outcome)
        .is_some_and(|indicators| indicators[arm][index].is_some())
}

/// Per-unit log-likelihood draws for `scope`.
///
/// # Errors
///
/// Returns `DiagnosticsError` when log-likelihood nodes were not monitored or
/// no unit contributes to the scope.
pub fn pointwise_loglik(
    result: &FitResult,
    scope: PicScope,
) -> Result<Vec<Vec<f64>>, DiagnosticsError> {
    if !result.model.is_monitored("loglik_e1") {
        return Err(DiagnosticsError::LogLikelihoodDisabled);
    }
    let indicator_stems = result
        .model
        .monitored
        .iter()
        .filter_map(|node| node.name.strip_prefix("loglik_")?.strip_suffix('1'))
        .filter(|stem| !matches!(*stem, "e" | "c"))
        .collect::<Vec<_>>();

    let prepared = &result.prepared;
    let total = result.draws.total_draws();
    let mut units = Vec::new();
    for arm in 0..2 {
        for index in 0..prepared.dims.arm_sizes[arm] {
            let effect = outcome_term(prepared, Outcome::Effect, arm, index);
            let cost = outcome_term(prepared, Outcome::Cost, arm, index);
            let both_observed = prepared.outcome(Outcome::Effect, arm)[index].is_some()
                && prepared.outcome(Outcome::Cost, arm)[index].is_some();

            let mut stems = Vec::new();
            match scope {
                PicScope::Effects if effect => stems.push("e"),
                PicScope::Costs if cost => stems.push("c"),
                PicScope::Both if both_observed => {
                    stems.extend(effect.then_some("e"));
                    stems.extend(cost.then_some("c"));
                }
                PicScope::Total => {
                    stems.extend(effect.then_some("e"));
                    stems.extend(cost.then_some("c"));
                    stems.extend(
                        indicator_stems
                            .iter()
                            .copied()
                            .filter(|stem| indicator_term(prepared, stem, arm, index)),
                    );
                }
                _ => {}
            }
            if stems.is_empty() {
                continue;
            }

            let mut unit = vec![0.0; total];
            for stem in stems {
                let element = format!("loglik_{stem}{}[{}]", arm + 1, index + 1);
                let draws = result
                    .draws
                    .element(&element)
                    .ok_or(DiagnosticsError::MissingNode(element))?;
                for (sum, value) in unit.iter_mut().zip(draws) {
                    *sum += value;
                }
            }
            units.push(unit);
        }
    }

    if units.is_empty() {
        return Err(DiagnosticsError::EmptyScope(scope));
    }
    Ok(units)
}

/// Evaluate `method` over the units of `scope`.
///
/// # Errors
///
/// Returns `DiagnosticsError` when log-likelihood nodes were not monitored or
/// the scope is empty.
pub fn information_criterion(
    result: &FitResult,
    method: PicMethod,
    scope: PicScope,
) -> Result<InformationCriterion, DiagnosticsError> {
    let units = pointwise_loglik(result, scope)?;
    let estimates = match method {
        PicMethod::Waic => waic(&units),
        PicMethod::Looic => looic(&units),
        PicMethod::Dic => dic(&units),
    };
    Ok(InformationCriterion {
        method,
        scope,
        observations: units.len(),
        estimates,
    })
}
