//! Prior specifications keyed by typed parameter roles.
//!
//! Hyperparameters reach the sampler as data (`prior.alpha0 = c(mean, precision)`),
//! so the compiled model text never depends on their values.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::registry::Outcome;
use super::types::{FamilyKind, ModelConfig, SubModel};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriorError {
    #[error("unknown prior `{name}` for the {family} family")]
    UnknownName { name: String, family: FamilyKind },
    #[error("invalid hyperparameters for `{name}`: {reason}")]
    Invalid { name: String, reason: &'static str },
}

/// Distribution family of a prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorFamily {
    /// Mean and precision.
    Normal,
    /// Lower and upper bound.
    Uniform,
    /// Location and scale.
    Logistic,
}

/// A prior family with its two hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorSpec {
    pub family: PriorFamily,
    pub first: f64,
    pub second: f64,
}

impl PriorSpec {
    #[must_use]
    pub const fn normal(mean: f64, precision: f64) -> Self {
        Self {
            family: PriorFamily::Normal,
            first: mean,
            second: precision,
        }
    }

    #[must_use]
    pub const fn uniform(lower: f64, upper: f64) -> Self {
        Self {
            family: PriorFamily::Uniform,
            first: lower,
            second: upper,
        }
    }

    #[must_use]
    pub const fn logistic(location: f64, scale: f64) -> Self {
        Self {
            family: PriorFamily::Logistic,
            first: location,
            second: scale,
        }
    }

    /// Same family with new hyperparameters.
    #[must_use]
    pub const fn with_values(self, first: f64, second: f64) -> Self {
        Self {
            family: self.family,
            first,
            second,
        }
    }

    /// Prior density call reading hyperparameters from data array `data_name`.
    #[must_use]
    pub fn density_text(&self, data_name: &str) -> String {
        match self.family {
            PriorFamily::Normal => format!("dnorm({data_name}[1], {data_name}[2])"),
            PriorFamily::Uniform => format!("dunif({data_name}[1], {data_name}[2])"),
            PriorFamily::Logistic => format!("dlogis({data_name}[1], 1 / {data_name}[2])"),
        }
    }

    /// Bounds of the support implied by the prior, used to place initial values.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        match self.family {
            PriorFamily::Uniform => (self.first, self.second),
            PriorFamily::Normal | PriorFamily::Logistic => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }

    fn check(&self, name: &str) -> Result<(), PriorError> {
        let invalid = |reason| {
            Err(PriorError::Invalid {
                name: name.to_string(),
                reason,
            })
        };
        if !(self.first.is_finite() && self.second.is_finite()) {
            return invalid("hyperparameters must be finite");
        }
        match self.family {
            PriorFamily::Normal if self.second <= 0.0 => invalid("precision must be positive"),
            PriorFamily::Uniform if self.first >= self.second => {
                invalid("lower bound must be below upper bound")
            }
            PriorFamily::Logistic if self.second <= 0.0 => invalid("scale must be positive"),
            _ => Ok(()),
        }
    }
}

/// Which part of a random-effects block a hyperprior belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RandomPart {
    Intercept,
    Slope,
}

/// A parameter that receives a prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorRole {
    Intercept(SubModel),
    Coefficients(SubModel),
    Dispersion(Outcome),
    /// Effect coefficient in the cost model (`beta_f`).
    Dependence,
    /// MNAR sensitivity parameter (`delta` in selection, `Delta` in pattern models).
    Mnar(Outcome),
    RandomMean(SubModel, RandomPart),
    RandomSd(SubModel, RandomPart),
}

impl PriorRole {
    /// Override name, e.g. `alpha0.prior`, `sigma.prior.e`, `mu.b0.prior`.
    #[must_use]
    pub fn name(self) -> String {
        let stem = |sub: SubModel| match sub {
            SubModel::Effect => "alpha",
            SubModel::Cost => "beta",
            SubModel::MissingEffect
            | SubModel::StructuralEffect
            | SubModel::MissingCost
            | SubModel::StructuralCost => "gamma",
        };
        let indicator_suffix = |sub: SubModel| {
            if sub.is_indicator() {
                format!(".{}", sub.outcome().suffix())
            } else {
                String::new()
            }
        };
        let part = |part: RandomPart| match part {
            RandomPart::Intercept => "0",
            RandomPart::Slope => "",
        };
        match self {
            Self::Intercept(sub) => format!("{}0.prior{}", stem(sub), indicator_suffix(sub)),
            Self::Coefficients(sub) => format!("{}.prior{}", stem(sub), indicator_suffix(sub)),
            Self::Dispersion(outcome) => format!("sigma.prior.{}", outcome.suffix()),
            Self::Dependence => "beta_f.prior".to_string(),
            Self::Mnar(outcome) => format!("delta.prior.{}", outcome.suffix()),
            Self::RandomMean(sub, p) => format!("mu.{}{}.prior", sub.random_symbol(), part(p)),
            Self::RandomSd(sub, p) => format!("s.{}{}.prior", sub.random_symbol(), part(p)),
        }
    }

    /// Name of the data array carrying the hyperparameters, e.g. `prior.alpha0`.
    #[must_use]
    pub fn data_name(self) -> String {
        format!("prior.{}", self.name().replacen(".prior", "", 1))
    }

    /// Every role the family can use, in a stable order.
    #[must_use]
    pub fn roles_for(family: FamilyKind) -> Vec<Self> {
        let submodels: &[SubModel] = match family {
            FamilyKind::Selection => &[
                SubModel::Effect,
                SubModel::Cost,
                SubModel::MissingEffect,
                SubModel::MissingCost,
            ],
            FamilyKind::Pattern => &[SubModel::Effect, SubModel::Cost],
            FamilyKind::Hurdle => &[
                SubModel::Effect,
                SubModel::Cost,
                SubModel::StructuralEffect,
                SubModel::StructuralCost,
            ],
        };

        let mut roles = Vec::new();
        for sub in submodels {
            roles.push(Self::Intercept(*sub));
            roles.push(Self::Coefficients(*sub));
        }
        roles.extend([
            Self::Dispersion(Outcome::Effect),
            Self::Dispersion(Outcome::Cost),
            Self::Dependence,
        ]);
        if family != FamilyKind::Hurdle {
            roles.extend([Self::Mnar(Outcome::Effect), Self::Mnar(Outcome::Cost)]);
        }
        for sub in submodels {
            for part in [RandomPart::Intercept, RandomPart::Slope] {
                roles.push(Self::RandomMean(*sub, part));
                roles.push(Self::RandomSd(*sub, part));
            }
        }
        roles
    }

    /// Default prior for this role under `config`.
    #[must_use]
    pub fn default_spec(self, config: &ModelConfig) -> PriorSpec {
        match self {
            Self::Intercept(sub) if sub.is_indicator() => PriorSpec::logistic(0.0, 1.0),
            Self::Intercept(_) | Self::Dependence => PriorSpec::normal(0.0, 1.0e-6),
            Self::Coefficients(sub) if sub.is_indicator() => PriorSpec::normal(0.0, 0.01),
            Self::Coefficients(_) => PriorSpec::normal(0.0, 1.0e-6),
            Self::Dispersion(outcome) => {
                let (lower, upper) = config
                    .distribution(outcome)
                    .default_dispersion_bounds(outcome)
                    .unwrap_or((0.0, 1.0));
                PriorSpec::uniform(lower, upper)
            }
            Self::Mnar(_) => match config.family.kind() {
                FamilyKind::Pattern => PriorSpec::uniform(-1.0, 1.0),
                FamilyKind::Selection | FamilyKind::Hurdle => PriorSpec::normal(0.0, 1.0),
            },
            Self::RandomMean(_, _) => PriorSpec::normal(0.0, 0.001),
            Self::RandomSd(_, _) => PriorSpec::uniform(0.0, 100.0),
        }
    }
}

impl fmt::Display for PriorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// User overrides keyed by prior name, e.g. `("sigma.prior.c", (0.0, 5_000.0))`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriorOverrides {
    entries: BTreeMap<String, (f64, f64)>,
}

impl PriorOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, name: impl Into<String>, first: f64, second: f64) -> Self {
        self.entries.insert(name.into(), (first, second));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, (f64, f64))> {
        self.entries.iter().map(|(name, values)| (name.as_str(), *values))
    }
}

/// Resolved priors for every role of a family.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorSet {
    specs: BTreeMap<PriorRole, PriorSpec>,
}

impl PriorSet {
    /// Merge `overrides` into the defaults for `config`.
    ///
    /// Names the family never uses are rejected. Names the family knows but the
    /// current configuration does not reference are kept and ignored.
    ///
    /// # Errors
    ///
    /// Returns `PriorError` for unknown names or invalid hyperparameters.
    pub fn resolve(config: &ModelConfig, overrides: &PriorOverrides) -> Result<Self, PriorError> {
        let family = config.family.kind();
        let mut specs = PriorRole::roles_for(family)
            .into_iter()
            .map(|role| (role, role.default_spec(config)))
            .collect::<BTreeMap<_, _>>();

        for (name, (first, second)) in overrides.iter() {
            let (role, spec) = specs
                .iter_mut()
                .find(|(role, _)| role.name() == name)
                .ok_or_else(|| PriorError::UnknownName {
                    name: name.to_string(),
                    family,
                })?;
            *spec = spec.with_values(first, second);
            check_role(*role, spec, config)?;
        }

        for (role, spec) in &specs {
            check_role(*role, spec, config)?;
        }

        Ok(Self { specs })
    }

    #[must_use]
    pub fn get(&self, role: PriorRole) -> Option<&PriorSpec> {
        self.specs.get(&role)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PriorRole, &PriorSpec)> {
        self.specs.iter().map(|(role, spec)| (*role, spec))
    }
}

fn check_role(role: PriorRole, spec: &PriorSpec, config: &ModelConfig) -> Result<(), PriorError> {
    let name = role.name();
    spec.check(&name)?;
    match role {
        PriorRole::Dispersion(outcome) => {
            if let Some((min, max)) = config.distribution(outcome).dispersion_limits()
                && (spec.first < min || spec.second > max)
            {
                return Err(PriorError::Invalid {
                    name,
                    reason: "bounds fall outside the admissible dispersion range",
                });
            }
        }
        PriorRole::RandomSd(_, _) if spec.first < 0.0 => {
            return Err(PriorError::Invalid {
                name,
                reason: "standard deviation bounds must be non-negative",
            });
        }
        _ => {}
    }
    Ok(())
}
