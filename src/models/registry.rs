//! Outcome distributions: links, supports, admissibility, and their model-text
//! fragments.
//!
//! Every distribution-specific decision lives here. The compiler asks a
//! [`Distribution`] for its likelihood arguments and never branches on the family
//! itself, so adding a distribution means adding a variant and its match arms.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::inference::NodeSupport;
use crate::utils::{logistic_stable, logit};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("unknown distribution `{0}`")]
    UnknownDistribution(String),
    #[error("distribution `{distribution}` is not supported for {outcome} outcomes")]
    Unsupported {
        distribution: &'static str,
        outcome: Outcome,
    },
    #[error(
        "{outcome} value {value} at row {row} lies outside the support of `{distribution}` ({support})"
    )]
    SupportViolation {
        distribution: &'static str,
        outcome: Outcome,
        row: usize,
        value: f64,
        support: &'static str,
    },
}

/// The two trial outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Outcome {
    Effect,
    Cost,
}

impl Outcome {
    pub const BOTH: [Self; 2] = [Self::Effect, Self::Cost];

    /// Short suffix used in node names (`e`, `c`).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Effect => "e",
            Self::Cost => "c",
        }
    }

    /// Stem of the per-arm data arrays (`eff1`, `cost2`).
    #[must_use]
    pub const fn data_stem(self) -> &'static str {
        match self {
            Self::Effect => "eff",
            Self::Cost => "cost",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Effect => "effectiveness",
            Self::Cost => "cost",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Identity,
    Log,
    Logit,
}

impl Link {
    #[must_use]
    pub fn apply(self, mean: f64) -> f64 {
        match self {
            Self::Identity => mean,
            Self::Log => mean.max(f64::MIN_POSITIVE).ln(),
            Self::Logit => logit(mean),
        }
    }

    #[must_use]
    pub fn inverse(self, linear: f64) -> f64 {
        match self {
            Self::Identity => linear,
            Self::Log => linear.exp(),
            Self::Logit => logistic_stable(linear),
        }
    }

    /// Inverse link applied to a model-text expression.
    #[must_use]
    pub fn inverse_text(self, expr: &str) -> String {
        match self {
            Self::Identity => expr.to_string(),
            Self::Log => format!("exp({expr})"),
            Self::Logit => format!("ilogit({expr})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Support {
    RealLine,
    OpenUnitInterval,
    Binary,
    Positive,
    NonNegative,
    NonNegativeInteger,
}

impl Support {
    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Self::RealLine => true,
            Self::OpenUnitInterval => value > 0.0 && value < 1.0,
            Self::Binary => value == 0.0 || value == 1.0,
            Self::Positive => value > 0.0,
            Self::NonNegative => value >= 0.0,
            Self::NonNegativeInteger => value >= 0.0 && value.fract() == 0.0,
        }
    }

    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::RealLine => "real line",
            Self::OpenUnitInterval => "open unit interval",
            Self::Binary => "0 or 1",
            Self::Positive => "strictly positive",
            Self::NonNegative => "non-negative",
            Self::NonNegativeInteger => "non-negative integers",
        }
    }

    #[must_use]
    pub const fn node_support(self) -> NodeSupport {
        match self {
            Self::RealLine => NodeSupport::Real,
            Self::OpenUnitInterval => NodeSupport::UnitInterval,
            Self::Binary => NodeSupport::Binary,
            Self::Positive => NodeSupport::Positive,
            Self::NonNegative => NodeSupport::NonNegative,
            Self::NonNegativeInteger => NodeSupport::Count,
        }
    }
}

/// Supported outcome distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Distribution {
    Normal,
    Beta,
    Gamma,
    Exponential,
    Weibull,
    Logistic,
    Bernoulli,
    Poisson,
    NegativeBinomial,
    LogNormal,
}

impl Distribution {
    pub const ALL: [Self; 10] = [
        Self::Normal,
        Self::Beta,
        Self::Gamma,
        Self::Exponential,
        Self::Weibull,
        Self::Logistic,
        Self::Bernoulli,
        Self::Poisson,
        Self::NegativeBinomial,
        Self::LogNormal,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "norm",
            Self::Beta => "beta",
            Self::Gamma => "gamma",
            Self::Exponential => "exp",
            Self::Weibull => "weibull",
            Self::Logistic => "logis",
            Self::Bernoulli => "bern",
            Self::Poisson => "pois",
            Self::NegativeBinomial => "nbinom",
            Self::LogNormal => "lnorm",
        }
    }

    /// Number of parameters: the mean plus an optional dispersion.
    #[must_use]
    pub const fn parameter_count(self) -> usize {
        match self {
            Self::Exponential | Self::Bernoulli | Self::Poisson => 1,
            _ => 2,
        }
    }

    #[must_use]
    pub const fn has_dispersion(self) -> bool {
        self.parameter_count() == 2
    }

    #[must_use]
    pub const fn link(self) -> Link {
        match self {
            Self::Normal | Self::Logistic => Link::Identity,
            Self::Beta | Self::Bernoulli => Link::Logit,
            Self::Gamma
            | Self::Exponential
            | Self::Weibull
            | Self::Poisson
            | Self::NegativeBinomial
            | Self::LogNormal => Link::Log,
        }
    }

    #[must_use]
    pub const fn support(self) -> Support {
        match self {
            Self::Normal | Self::Logistic => Support::RealLine,
            Self::Beta => Support::OpenUnitInterval,
            Self::Bernoulli => Support::Binary,
            Self::Gamma | Self::Weibull | Self::LogNormal => Support::Positive,
            Self::Exponential => Support::NonNegative,
            Self::Poisson | Self::NegativeBinomial => Support::NonNegativeInteger,
        }
    }

    #[must_use]
    pub const fn admissible_for(self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Effect => !matches!(self, Self::LogNormal),
            Outcome::Cost => matches!(self, Self::Normal | Self::Gamma | Self::LogNormal),
        }
    }

    /// # Errors
    ///
    /// Returns `RegistryError::Unsupported` when the distribution cannot model
    /// `outcome`.
    pub fn ensure_admissible(self, outcome: Outcome) -> Result<(), RegistryError> {
        if self.admissible_for(outcome) {
            Ok(())
        } else {
            Err(RegistryError::Unsupported {
                distribution: self.name(),
                outcome,
            })
        }
    }

    /// Check that every observed value lies in the support.
    ///
    /// `rows` maps each position in `values` back to its dataset row.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::SupportViolation` for the first offending value.
    pub fn check_values(
        self,
        outcome: Outcome,
        values: &[f64],
        rows: &[usize],
    ) -> Result<(), RegistryError> {
        let support = self.support();
        match values
            .iter()
            .zip(rows)
            .find(|(value, _)| !support.contains(**value))
        {
            Some((value, row)) => Err(RegistryError::SupportViolation {
                distribution: self.name(),
                outcome,
                row: *row,
                value: *value,
                support: support.describe(),
            }),
            None => Ok(()),
        }
    }

    /// Admissible range of the dispersion parameter `s`, when one exists.
    #[must_use]
    pub const fn dispersion_limits(self) -> Option<(f64, f64)> {
        match self {
            Self::Beta => Some((0.0, 1.0)),
            Self::Exponential | Self::Bernoulli | Self::Poisson => None,
            _ => Some((0.0, f64::INFINITY)),
        }
    }

    /// Default uniform bounds for the dispersion prior.
    #[must_use]
    pub const fn default_dispersion_bounds(self, outcome: Outcome) -> Option<(f64, f64)> {
        match self {
            Self::Exponential | Self::Bernoulli | Self::Poisson => None,
            Self::Beta => Some((0.0, 1.0)),
            Self::Weibull => Some((0.0, 10.0)),
            Self::NegativeBinomial => Some((0.0, 100.0)),
            Self::LogNormal => Some((0.0, 10.0)),
            Self::Normal | Self::Gamma | Self::Logistic => match outcome {
                Outcome::Effect => Some((0.0, 100.0)),
                Outcome::Cost => Some((0.0, 10_000.0)),
            },
        }
    }

    /// Outcome-scale mean from a link-scale value and the dispersion draw.
    ///
    /// Log-normal outcomes add the `exp(s^2 / 2)` correction; the rest invert the
    /// link.
    #[must_use]
    pub fn outcome_mean(self, linear: f64, dispersion: Option<f64>) -> f64 {
        match (self, dispersion) {
            (Self::LogNormal, Some(s)) => (linear + s * s / 2.0).exp(),
            _ => self.link().inverse(linear),
        }
    }

    /// Model-text expression for [`Self::outcome_mean`].
    #[must_use]
    pub fn outcome_mean_text(self, linear: &str, dispersion: &str) -> String {
        match self {
            Self::LogNormal => format!("exp({linear} + pow({dispersion}, 2) / 2)"),
            _ => self.link().inverse_text(linear),
        }
    }

    /// Distribution name used by the sampler's `d*` and `logdensity.*` functions.
    #[must_use]
    pub const fn sampler_name(self) -> &'static str {
        match self {
            Self::Normal => "norm",
            Self::Beta => "beta",
            Self::Gamma => "gamma",
            Self::Exponential => "exp",
            Self::Weibull => "weib",
            Self::Logistic => "logis",
            Self::Bernoulli => "bern",
            Self::Poisson => "pois",
            Self::NegativeBinomial => "negbin",
            Self::LogNormal => "lnorm",
        }
    }

    /// Argument list of the likelihood given the linear predictor `lp`, the
    /// inverse-link mean `mean`, and dispersion `s`.
    #[must_use]
    pub fn likelihood_args(self, lp: &str, mean: &str, s: &str) -> String {
        match self {
            Self::Normal => format!("{mean}, 1 / pow({s}, 2)"),
            Self::Logistic => format!("{mean}, 1 / {s}"),
            Self::Beta => {
                format!("{mean} * (1 / pow({s}, 2) - 1), (1 - {mean}) * (1 / pow({s}, 2) - 1)")
            }
            Self::Gamma => format!("pow({mean}, 2) / pow({s}, 2), {mean} / pow({s}, 2)"),
            Self::Exponential => format!("1 / {mean}"),
            Self::Weibull => format!("{s}, pow(exp(loggam(1 + 1 / {s})) / {mean}, {s})"),
            Self::Bernoulli | Self::Poisson => mean.to_string(),
            Self::NegativeBinomial => format!("{s} / ({s} + {mean}), {s}"),
            Self::LogNormal => format!("{lp}, 1 / pow({s}, 2)"),
        }
    }

    /// `y ~ d<name>(...)` statement.
    #[must_use]
    pub fn likelihood(self, y: &str, lp: &str, mean: &str, s: &str) -> String {
        format!(
            "{y} ~ d{}({})",
            self.sampler_name(),
            self.likelihood_args(lp, mean, s)
        )
    }

    /// `logdensity.<name>(y, ...)` expression.
    #[must_use]
    pub fn log_density(self, y: &str, lp: &str, mean: &str, s: &str) -> String {
        format!(
            "logdensity.{}({y}, {})",
            self.sampler_name(),
            self.likelihood_args(lp, mean, s)
        )
    }

    /// Whether the model text needs a separate inverse-link mean node.
    #[must_use]
    pub const fn needs_mean_node(self) -> bool {
        !matches!(self.link(), Link::Identity) && !matches!(self, Self::LogNormal)
    }
}

impl FromStr for Distribution {
    type Err = RegistryError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dist| dist.name() == name)
            .ok_or_else(|| RegistryError::UnknownDistribution(name.to_string()))
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn names_round_trip() {
        for dist in Distribution::ALL {
            assert_eq!(dist.name().parse::<Distribution>(), Ok(dist));
        }
        assert!("cauchy".parse::<Distribution>().is_err());
    }

    #[test]
    fn links_follow_support() {
        assert_eq!(Distribution::Normal.link(), Link::Identity);
        assert_eq!(Distribution::Beta.link(), Link::Logit);
        assert_eq!(Distribution::Gamma.link(), Link::Log);
        assert_eq!(Distribution::NegativeBinomial.link(), Link::Log);
    }

    #[test]
    fn cost_admissibility_is_restricted() {
        let costs = Distribution::ALL
            .into_iter()
            .filter(|dist| dist.admissible_for(Outcome::Cost))
            .collect::<Vec<_>>();
        assert_eq!(
            costs,
            vec![Distribution::Normal, Distribution::Gamma, Distribution::LogNormal]
        );
        assert!(!Distribution::LogNormal.admissible_for(Outcome::Effect));
        assert!(Distribution::Beta.ensure_admissible(Outcome::Cost).is_err());
    }

    #[test]
    fn support_violation_reports_row() {
        let err = Distribution::Gamma
            .check_values(Outcome::Cost, &[10.0, 0.0], &[3, 7])
            .expect_err("zero cost is outside gamma support");
        assert!(matches!(
            err,
            RegistryError::SupportViolation { row: 7, value, .. } if value == 0.0
        ));
        assert!(Distribution::Beta
            .check_values(Outcome::Effect, &[0.2, 0.9], &[0, 1])
            .is_ok());
        assert!(Distribution::Bernoulli
            .check_values(Outcome::Effect, &[0.5], &[0])
            .is_err());
    }

    #[test]
    fn lognormal_mean_adds_variance_correction() {
        let mean = Distribution::LogNormal.outcome_mean(1.0, Some(0.5));
        assert_relative_eq!(mean, (1.0f64 + 0.125).exp(), epsilon = 1.0e-12);
        assert_relative_eq!(
            Distribution::Gamma.outcome_mean(2.0, Some(3.0)),
            2.0f64.exp(),
            epsilon = 1.0e-12
        );
        assert_relative_eq!(
            Distribution::Beta.outcome_mean(0.0, Some(0.2)),
            0.5,
            epsilon = 1.0e-12
        );
    }

    #[test]
    fn likelihood_fragments_use_mean_parameterization() {
        assert_eq!(
            Distribution::Normal.likelihood("eff1[i]", "lp_e1[i]", "lp_e1[i]", "s.e[1]"),
            "eff1[i] ~ dnorm(lp_e1[i], 1 / pow(s.e[1], 2))"
        );
        assert_eq!(
            Distribution::Gamma.likelihood("cost1[i]", "lp", "m", "s"),
            "cost1[i] ~ dgamma(pow(m, 2) / pow(s, 2), m / pow(s, 2))"
        );
        assert_eq!(
            Distribution::LogNormal.likelihood("y", "lp", "m", "s"),
            "y ~ dlnorm(lp, 1 / pow(s, 2))"
        );
        assert_eq!(
            Distribution::Bernoulli.log_density("y", "lp", "m", "s"),
            "logdensity.bern(y, m)"
        );
    }

    #[test]
    fn dispersion_defaults_respect_limits() {
        for dist in Distribution::ALL {
            for outcome in Outcome::BOTH {
                match (dist.default_dispersion_bounds(outcome), dist.dispersion_limits()) {
                    (Some((lower, upper)), Some((min, max))) => {
                        assert!(lower >= min && upper <= max, "{dist}");
                    }
                    (None, None) => assert!(!dist.has_dispersion()),
                    _ => panic!("inconsistent dispersion metadata for {dist}"),
                }
            }
        }
    }
}
