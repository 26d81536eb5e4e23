//! Model configuration: missingness assumptions, model families, and sub-models.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::input::{Formula, FormulaError, RandomTerm};

use super::registry::{Distribution, Outcome, RegistryError};

/// Configuration errors detected before any data is bound.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Formula(#[from] FormulaError),
    #[error("unknown missingness type `{0}`; expected MAR, MNAR_eff, MNAR_cost or MNAR")]
    UnknownMissingType(String),
    #[error("unknown structural type `{0}`; expected SCAR or SAR")]
    UnknownStructuralType(String),
    #[error("unknown pattern restriction `{0}`; expected CC or AC")]
    UnknownRestriction(String),
    #[error("hurdle models need at least one structural value (se or sc)")]
    NoStructuralValue,
    #[error("structural value for {0} must be finite")]
    NonFiniteStructuralValue(Outcome),
    #[error("sub-model `{submodel}` is not part of the {family} family")]
    UnusedSubModel {
        submodel: SubModel,
        family: FamilyKind,
    },
}

/// Missingness assumption for selection and pattern-mixture models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingType {
    Mar,
    MnarEffect,
    MnarCost,
    Mnar,
}

impl MissingType {
    /// Whether missingness of `outcome` depends on its own unobserved value.
    #[must_use]
    pub const fn is_mnar(self, outcome: Outcome) -> bool {
        matches!(
            (self, outcome),
            (Self::Mnar, _) | (Self::MnarEffect, Outcome::Effect) | (Self::MnarCost, Outcome::Cost)
        )
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Mar => "MAR",
            Self::MnarEffect => "MNAR_eff",
            Self::MnarCost => "MNAR_cost",
            Self::Mnar => "MNAR",
        }
    }
}

impl FromStr for MissingType {
    type Err = ConfigError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "MAR" => Ok(Self::Mar),
            "MNAR_eff" => Ok(Self::MnarEffect),
            "MNAR_cost" => Ok(Self::MnarCost),
            "MNAR" => Ok(Self::Mnar),
            other => Err(ConfigError::UnknownMissingType(other.to_string())),
        }
    }
}

/// Structural-value assumption for hurdle models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StructuralType {
    /// Structural values completely at random: intercept-only indicator models.
    Scar,
    /// Structural values at random given covariates.
    Sar,
}

impl StructuralType {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Scar => "SCAR",
            Self::Sar => "SAR",
        }
    }
}

impl FromStr for StructuralType {
    type Err = ConfigError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "SCAR" => Ok(Self::Scar),
            "SAR" => Ok(Self::Sar),
            other => Err(ConfigError::UnknownStructuralType(other.to_string())),
        }
    }
}

/// Identifying restriction for unidentified pattern-mixture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Restriction {
    /// Borrow from the complete-case pattern.
    CompleteCase,
    /// Borrow from the pattern where the outcome is the only one observed.
    AvailableCase,
}

impl Restriction {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::CompleteCase => "CC",
            Self::AvailableCase => "AC",
        }
    }
}

impl FromStr for Restriction {
    type Err = ConfigError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label {
            "CC" => Ok(Self::CompleteCase),
            "AC" => Ok(Self::AvailableCase),
            other => Err(ConfigError::UnknownRestriction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyKind {
    Selection,
    Pattern,
    Hurdle,
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Selection => "selection",
            Self::Pattern => "pattern-mixture",
            Self::Hurdle => "hurdle",
        })
    }
}

/// Model family with its family-specific options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelFamily {
    Selection {
        missing: MissingType,
    },
    Pattern {
        missing: MissingType,
        restriction: Restriction,
    },
    Hurdle {
        structural: StructuralType,
        se: Option<f64>,
        sc: Option<f64>,
    },
}

impl ModelFamily {
    #[must_use]
    pub const fn kind(&self) -> FamilyKind {
        match self {
            Self::Selection { .. } => FamilyKind::Selection,
            Self::Pattern { .. } => FamilyKind::Pattern,
            Self::Hurdle { .. } => FamilyKind::Hurdle,
        }
    }

    /// Missingness assumption, for families that carry one.
    #[must_use]
    pub const fn missing_type(&self) -> Option<MissingType> {
        match self {
            Self::Selection { missing } | Self::Pattern { missing, .. } => Some(*missing),
            Self::Hurdle { .. } => None,
        }
    }

    /// Structural value for `outcome` in hurdle models.
    #[must_use]
    pub const fn structural_value(&self, outcome: Outcome) -> Option<f64> {
        match (self, outcome) {
            (Self::Hurdle { se, .. }, Outcome::Effect) => *se,
            (Self::Hurdle { sc, .. }, Outcome::Cost) => *sc,
            _ => None,
        }
    }

    /// Sub-models this family (with its options) includes.
    #[must_use]
    pub fn submodels(&self) -> Vec<SubModel> {
        let mut subs = vec![SubModel::Effect, SubModel::Cost];
        match self {
            Self::Selection { .. } => {
                subs.extend([SubModel::MissingEffect, SubModel::MissingCost]);
            }
            Self::Pattern { .. } => {}
            Self::Hurdle { se, sc, .. } => {
                if se.is_some() {
                    subs.push(SubModel::StructuralEffect);
                }
                if sc.is_some() {
                    subs.push(SubModel::StructuralCost);
                }
            }
        }
        subs
    }

    /// # Errors
    ///
    /// Returns `ConfigError` for hurdle models without a usable structural value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Self::Hurdle { se, sc, .. } = self {
            if se.is_none() && sc.is_none() {
                return Err(ConfigError::NoStructuralValue);
            }
            for (value, outcome) in [(se, Outcome::Effect), (sc, Outcome::Cost)] {
                if value.is_some_and(|v| !v.is_finite()) {
                    return Err(ConfigError::NonFiniteStructuralValue(outcome));
                }
            }
        }
        Ok(())
    }
}

/// One regression component of the joint model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubModel {
    Effect,
    Cost,
    MissingEffect,
    MissingCost,
    StructuralEffect,
    StructuralCost,
}

impl SubModel {
    /// Formula response and data-name suffix (`e`, `c`, `me`, `mc`, `se`, `sc`).
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Effect => "e",
            Self::Cost => "c",
            Self::MissingEffect => "me",
            Self::MissingCost => "mc",
            Self::StructuralEffect => "se",
            Self::StructuralCost => "sc",
        }
    }

    #[must_use]
    pub const fn outcome(self) -> Outcome {
        match self {
            Self::Effect | Self::MissingEffect | Self::StructuralEffect => Outcome::Effect,
            Self::Cost | Self::MissingCost | Self::StructuralCost => Outcome::Cost,
        }
    }

    /// Whether this is a logistic indicator model rather than an outcome model.
    #[must_use]
    pub const fn is_indicator(self) -> bool {
        !matches!(self, Self::Effect | Self::Cost)
    }

    #[must_use]
    pub const fn intercept_name(self) -> &'static str {
        match self {
            Self::Effect => "alpha0",
            Self::Cost => "beta0",
            Self::MissingEffect | Self::StructuralEffect => "gamma0.e",
            Self::MissingCost | Self::StructuralCost => "gamma0.c",
        }
    }

    #[must_use]
    pub const fn coefficient_name(self) -> &'static str {
        match self {
            Self::Effect => "alpha",
            Self::Cost => "beta",
            Self::MissingEffect | Self::StructuralEffect => "gamma.e",
            Self::MissingCost | Self::StructuralCost => "gamma.c",
        }
    }

    /// Stem of random-effect node names (`a`, `b`, `ge`, `gc`).
    #[must_use]
    pub const fn random_symbol(self) -> &'static str {
        match self {
            Self::Effect => "a",
            Self::Cost => "b",
            Self::MissingEffect | Self::StructuralEffect => "ge",
            Self::MissingCost | Self::StructuralCost => "gc",
        }
    }
}

impl fmt::Display for SubModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Per-sub-model formulas. Sub-models without one are intercept-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formulas {
    entries: BTreeMap<SubModel, Formula>,
}

impl Formulas {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `source` as the formula of `submodel`, whose response must be the
    /// sub-model symbol (`e ~ age`, `me ~ 1`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Formula` for malformed formulas or a wrong response.
    pub fn with(mut self, submodel: SubModel, source: &str) -> Result<Self, ConfigError> {
        let formula = Formula::parse(source)?;
        formula.expect_response(submodel.symbol())?;
        self.entries.insert(submodel, formula);
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, submodel: SubModel) -> Option<&Formula> {
        self.entries.get(&submodel)
    }

    /// Formula of `submodel`, falling back to intercept-only.
    #[must_use]
    pub fn formula(&self, submodel: SubModel) -> Formula {
        self.entries
            .get(&submodel)
            .cloned()
            .unwrap_or_else(|| Formula::intercept_only(submodel.symbol()))
    }

    /// Random-effects blocks declared across all formulas.
    #[must_use]
    pub fn random_terms(&self) -> BTreeMap<SubModel, RandomTerm> {
        self.entries
            .iter()
            .filter_map(|(sub, formula)| formula.random.clone().map(|term| (*sub, term)))
            .collect()
    }

    pub fn submodels(&self) -> impl Iterator<Item = SubModel> + '_ {
        self.entries.keys().copied()
    }
}

/// Immutable description of the joint model to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub dist_e: Distribution,
    pub dist_c: Distribution,
    pub family: ModelFamily,
    /// Contemporaneous independence between effects and costs.
    pub independent: bool,
    /// Random-effects blocks keyed by sub-model.
    pub random: BTreeMap<SubModel, RandomTerm>,
}

impl ModelConfig {
    #[must_use]
    pub const fn new(dist_e: Distribution, dist_c: Distribution, family: ModelFamily) -> Self {
        Self {
            dist_e,
            dist_c,
            family,
            independent: false,
            random: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn with_independence(mut self, independent: bool) -> Self {
        self.independent = independent;
        self
    }

    #[must_use]
    pub fn with_random(mut self, submodel: SubModel, term: RandomTerm) -> Self {
        self.random.insert(submodel, term);
        self
    }

    #[must_use]
    pub const fn distribution(&self, outcome: Outcome) -> Distribution {
        match outcome {
            Outcome::Effect => self.dist_e,
            Outcome::Cost => self.dist_c,
        }
    }

    #[must_use]
    pub fn random_for(&self, submodel: SubModel) -> Option<&RandomTerm> {
        self.random.get(&submodel)
    }

    /// Whether the derived correlation `rho` is defined (normal effects and costs
    /// with dependence).
    #[must_use]
    pub const fn has_correlation(&self) -> bool {
        !self.independent
            && matches!(self.dist_e, Distribution::Normal)
            && matches!(self.dist_c, Distribution::Normal)
    }

    /// # Errors
    ///
    /// Returns `ConfigError` for inadmissible distributions, invalid family options,
    /// or random effects on sub-models the family does not include.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dist_e.ensure_admissible(Outcome::Effect)?;
        self.dist_c.ensure_admissible(Outcome::Cost)?;
        self.family.validate()?;
        let submodels = self.family.submodels();
        if let Some(submodel) = self.random.keys().find(|sub| !submodels.contains(sub)) {
            return Err(ConfigError::UnusedSubModel {
                submodel: *submodel,
                family: self.family.kind(),
            });
        }
        Ok(())
    }
}
