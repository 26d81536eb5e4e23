//! Data binding: from trial records to the named arrays a compiled model reads.
//!
//! [`prepare`] runs before compilation and produces both the
//! [`ModelDimensions`] the compiler needs and a superset of data bindings.
//! [`finalize`] then adds prior hyperparameters for the roles the compiled text
//! uses and keeps exactly the names it references.

pub mod design;
pub mod inits;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::{debug, warn};

use crate::inference::{DataBindings, DataValue};
use crate::input::{ArmSplit, ColumnNames, InputError, TrialData};
use crate::preprocess::{OutcomeDiagnostics, non_structural_observed, outcome_diagnostics};
use crate::utils::usize_to_f64;

use super::compiler::{CompiledModel, MissingPattern, ModelDimensions, RandomDims};
use super::priors::PriorSet;
use super::registry::{Outcome, RegistryError};
use super::types::{Formulas, ModelConfig, ModelFamily, StructuralType, SubModel};

pub use design::{ExpandedTerms, RandomDesign, SubModelDesign, build_design, expand_terms};
pub use inits::{generate_inits, validate_inits};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BindingError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("grouping column `{0}` has unusable labels")]
    Cluster(String),
    #[error("the compiled model reads `{0}`, which was not bound")]
    Unbound(String),
    #[error("expected initial values for {expected} chains; found {found}")]
    InitCount { expected: usize, found: usize },
    #[error(
        "initial values for chain {chain} do not match the model: missing {missing:?}, unexpected {unexpected:?}"
    )]
    InitNames {
        chain: usize,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("initial value `{name}` for chain {chain} has shape {found:?}; expected {expected:?}")]
    InitShape {
        chain: usize,
        name: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

/// Everything derived from the trial data for one fit.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub arms: ArmSplit,
    pub dims: ModelDimensions,
    /// Superset of the data the compiled model may read, priors excluded.
    pub bindings: DataBindings,
    pub designs: BTreeMap<SubModel, SubModelDesign>,
    /// Outcome values per arm.
    pub outcomes: BTreeMap<Outcome, [Vec<Option<f64>>; 2]>,
    /// Missingness pattern of every record, per arm.
    pub patterns: [Vec<MissingPattern>; 2],
    pub diagnostics: BTreeMap<Outcome, [OutcomeDiagnostics; 2]>,
    /// Structural indicators per arm for hurdle outcomes; `None` when unknown.
    pub structural: BTreeMap<Outcome, [Vec<Option<f64>>; 2]>,
}

impl PreparedData {
    /// Values of `outcome` in arm `arm` (0-based).
    #[must_use]
    pub fn outcome(&self, outcome: Outcome, arm: usize) -> &[Option<f64>] {
        self.outcomes
            .get(&outcome)
            .map_or(&[][..], |arms| arms[arm].as_slice())
    }

    #[must_use]
    pub fn diagnostics(&self, outcome: Outcome, arm: usize) -> Option<&OutcomeDiagnostics> {
        self.diagnostics.get(&outcome).map(|arms| &arms[arm])
    }

    #[must_use]
    pub fn design(&self, submodel: SubModel) -> Option<&SubModelDesign> {
        self.designs.get(&submodel)
    }
}

const fn column_for(columns: &ColumnNames, outcome: Outcome) -> &String {
    match outcome {
        Outcome::Effect => &columns.effect,
        Outcome::Cost => &columns.cost,
    }
}

const fn override_column_for(columns: &ColumnNames, outcome: Outcome) -> &String {
    match outcome {
        Outcome::Effect => &columns.structural_effect,
        Outcome::Cost => &columns.structural_cost,
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

/// Validate the trial data against `config` and derive dimensions and bindings.
///
/// # Errors
///
/// Returns `BindingError` for malformed data, observed outcomes outside the
/// distribution's support, or unusable covariates.
pub fn prepare(
    data: &TrialData,
    columns: &ColumnNames,
    formulas: &Formulas,
    config: &ModelConfig,
) -> Result<PreparedData, BindingError> {
    data.validate()?;
    let arms = data.arms(&columns.arm)?;
    let sizes = arms.sizes();

    let mut bindings = DataBindings::new();
    let mut dims = ModelDimensions {
        arm_sizes: sizes,
        ..ModelDimensions::default()
    };
    for (arm, size) in sizes.iter().enumerate() {
        bindings.insert(format!("N{}", arm + 1), DataValue::Scalar(usize_to_f64(*size)));
    }

    let mut outcomes = BTreeMap::new();
    let mut diagnostics = BTreeMap::new();
    let mut structural = BTreeMap::new();

    for outcome in Outcome::BOTH {
        let values = data.numeric(column_for(columns, outcome))?;
        let structural_value = config.family.structural_value(outcome);
        let (observed, rows) = non_structural_observed(values, structural_value);
        config
            .distribution(outcome)
            .check_values(outcome, &observed, &rows)?;

        let by_arm = [arms.select(0, values), arms.select(1, values)];
        let arm_diagnostics = [
            outcome_diagnostics(&by_arm[0], structural_value),
            outcome_diagnostics(&by_arm[1], structural_value),
        ];
        dims.missing.insert(
            outcome,
            [arm_diagnostics[0].n_missing, arm_diagnostics[1].n_missing],
        );
        bind_outcome(&mut bindings, outcome, &by_arm, &arm_diagnostics);

        if let Some(value) = structural_value {
            let overrides = data.indicator(override_column_for(columns, outcome))?;
            let indicators = [0, 1].map(|arm| {
                arms.rows[arm]
                    .iter()
                    .map(|row| match values[*row] {
                        Some(observed) => Some(if observed == value { 1.0 } else { 0.0 }),
                        None => overrides.and_then(|column| column[*row]),
                    })
                    .collect::<Vec<_>>()
            });
            bind_structural(&mut bindings, outcome, value, &by_arm, &indicators);
            structural.insert(outcome, indicators);
        }

        outcomes.insert(outcome, by_arm);
        diagnostics.insert(outcome, arm_diagnostics);
    }

    let patterns = [0, 1].map(|arm| {
        let effects = &outcomes[&Outcome::Effect][arm];
        let costs = &outcomes[&Outcome::Cost][arm];
        effects
            .iter()
            .zip(costs)
            .map(|(e, c)| MissingPattern::from_observed(e.is_some(), c.is_some()))
            .collect::<Vec<_>>()
    });
    dims.patterns = patterns
        .iter()
        .flatten()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    bind_patterns(&mut bindings, &dims, &patterns);

    let mut designs = BTreeMap::new();
    for sub in config.family.submodels() {
        let formula = formulas.formula(sub);
        let intercept_only = sub.is_indicator()
            && matches!(
                config.family,
                ModelFamily::Hurdle {
                    structural: StructuralType::Scar,
                    ..
                }
            );
        if intercept_only && (!formula.terms.is_empty() || formula.random.is_some()) {
            warn!(
                submodel = %sub,
                formula = %formula,
                "structural values completely at random; ignoring covariates of the structural model"
            );
        }
        let design = build_design(data, &arms, &formula, intercept_only)?;
        dims.fixed.insert(sub, design.fixed_count());
        if let Some(random) = &design.random {
            dims.random.insert(
                sub,
                RandomDims {
                    intercept: random.intercept,
                    slopes: random.slope_names.len(),
                    clusters: [random.cluster_labels[0].len(), random.cluster_labels[1].len()],
                },
            );
        }
        bind_design(&mut bindings, sub, &design);
        designs.insert(sub, design);
    }

    debug!(
        arm_sizes = ?sizes,
        patterns = dims.patterns.len(),
        bindings = bindings.len(),
        "prepared trial data"
    );

    Ok(PreparedData {
        arms,
        dims,
        bindings,
        designs,
        outcomes,
        patterns,
        diagnostics,
        structural,
    })
}

fn bind_outcome(
    bindings: &mut DataBindings,
    outcome: Outcome,
    by_arm: &[Vec<Option<f64>>; 2],
    diagnostics: &[OutcomeDiagnostics; 2],
) {
    let stem = outcome.data_stem();
    let suffix = outcome.suffix();
    for (arm, values) in by_arm.iter().enumerate() {
        let label = arm + 1;
        bindings.insert(format!("{stem}{label}"), DataValue::Vector(values.clone()));
        let missing = values
            .iter()
            .map(|value| if value.is_some() { 0.0 } else { 1.0 })
            .collect::<Vec<_>>();
        bindings.insert(format!("m_{stem}{label}"), DataValue::observed(&missing));
    }

    let centres = diagnostics.map(|d| finite_or(d.observed_mean, 0.0));
    let scales = diagnostics.map(|d| {
        let sd = finite_or(d.observed_sd, 1.0);
        if sd > 0.0 { sd } else { 1.0 }
    });
    bindings.insert(format!("{suffix}.centre"), DataValue::observed(&centres));
    bindings.insert(format!("{suffix}.scale"), DataValue::observed(&scales));
}

fn bind_structural(
    bindings: &mut DataBindings,
    outcome: Outcome,
    value: f64,
    by_arm: &[Vec<Option<f64>>; 2],
    indicators: &[Vec<Option<f64>>; 2],
) {
    let stem = outcome.data_stem();
    let suffix = outcome.suffix();
    bindings.insert(format!("struct.{suffix}"), DataValue::Scalar(value));
    for arm in 0..2 {
        let label = arm + 1;
        let continuous = by_arm[arm]
            .iter()
            .map(|v| v.filter(|observed| *observed != value))
            .collect();
        bindings.insert(format!("{stem}c{label}"), DataValue::Vector(continuous));
        bindings.insert(
            format!("d_{suffix}{label}"),
            DataValue::Vector(indicators[arm].clone()),
        );
    }
}

fn bind_patterns(
    bindings: &mut DataBindings,
    dims: &ModelDimensions,
    patterns: &[Vec<MissingPattern>; 2],
) {
    for (arm, arm_patterns) in patterns.iter().enumerate() {
        let indices = arm_patterns
            .iter()
            .map(|pattern| dims.pattern_index(*pattern).map_or(f64::NAN, usize_to_f64))
            .collect::<Vec<_>>();
        bindings.insert(format!("d{}", arm + 1), DataValue::observed(&indices));
    }
    bindings.insert("dir.p", DataValue::observed(&vec![1.0; dims.patterns.len()]));
}

fn bind_design(bindings: &mut DataBindings, sub: SubModel, design: &SubModelDesign) {
    let symbol = sub.symbol();
    if design.fixed_count() > 0 {
        for (arm, matrix) in design.fixed.iter().enumerate() {
            bindings.insert(format!("X{}_{symbol}", arm + 1), DataValue::Matrix(matrix.clone()));
        }
        bindings.insert(
            format!("mean_cov_{symbol}"),
            DataValue::Matrix(design.fixed_means.clone()),
        );
    }

    let Some(random) = &design.random else {
        return;
    };
    for arm in 0..2 {
        let label = arm + 1;
        let clusters = random.clusters[arm]
            .iter()
            .copied()
            .map(usize_to_f64)
            .collect::<Vec<_>>();
        bindings.insert(format!("clus{label}_{symbol}"), DataValue::observed(&clusters));
        bindings.insert(
            format!("n_clus{label}_{symbol}"),
            DataValue::Scalar(usize_to_f64(random.cluster_labels[arm].len())),
        );
        if !random.slope_names.is_empty() {
            bindings.insert(
                format!("Z{label}_{symbol}"),
                DataValue::Matrix(random.slopes[arm].clone()),
            );
        }
    }
    if !random.slope_names.is_empty() {
        bindings.insert(
            format!("mean_z_{symbol}"),
            DataValue::Matrix(random.slope_means.clone()),
        );
    }
}

/// Add prior hyperparameters and keep exactly the data the model reads.
///
/// # Errors
///
/// Returns `BindingError::Unbound` when the model reads a name with no binding.
pub fn finalize(
    prepared: &PreparedData,
    model: &CompiledModel,
    priors: &PriorSet,
) -> Result<DataBindings, BindingError> {
    let mut bindings = prepared.bindings.clone();
    for role in &model.prior_roles {
        if let Some(spec) = priors.get(*role) {
            bindings.insert(
                role.data_name(),
                DataValue::observed(&[spec.first, spec.second]),
            );
        }
    }
    bindings.retain(|name| model.data_names.contains(name));
    if let Some(name) = model.data_names.iter().find(|name| !bindings.contains(name)) {
        return Err(BindingError::Unbound(name.clone()));
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::compiler::{CompileOptions, compile};
    use crate::models::priors::PriorOverrides;
    use crate::models::registry::Distribution;
    use crate::models::types::MissingType;

    fn trial() -> TrialData {
        TrialData::new()
            .with_observed("t", &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0])
            .with_numeric(
                "e",
                vec![Some(0.6), None, Some(1.0), Some(0.8), Some(1.0), None],
            )
            .with_numeric(
                "c",
                vec![Some(100.0), Some(80.0), None, Some(150.0), Some(120.0), None],
            )
            .with_observed("age", &[30.0, 40.0, 50.0, 60.0, 70.0, 80.0])
    }

    fn selection() -> ModelConfig {
        ModelConfig::new(
            Distribution::Normal,
            Distribution::Gamma,
            ModelFamily::Selection {
                missing: MissingType::Mar,
            },
        )
    }

    #[test]
    fn prepare_binds_outcomes_and_missingness() {
        let prepared = prepare(&trial(), &ColumnNames::default(), &Formulas::new(), &selection())
            .expect("prepares");
        assert_eq!(prepared.dims.arm_sizes, [3, 3]);
        assert_eq!(prepared.dims.missing[&Outcome::Effect], [1, 1]);
        assert_eq!(prepared.dims.missing[&Outcome::Cost], [1, 1]);
        assert!(matches!(
            prepared.bindings.get("eff1"),
            Some(DataValue::Vector(values)) if values[1].is_none()
        ));
        assert!(matches!(
            prepared.bindings.get("m_cost2"),
            Some(DataValue::Vector(values)) if values == &vec![Some(0.0), Some(0.0), Some(1.0)]
        ));
        assert_eq!(
            prepared.dims.patterns,
            vec![
                MissingPattern::Complete,
                MissingPattern::EffectMissing,
                MissingPattern::CostMissing,
                MissingPattern::BothMissing
            ]
        );
    }

    #[test]
    fn zero_cost_outside_gamma_support_fails() {
        let data = trial().with_numeric(
            "c",
            vec![Some(100.0), Some(0.0), None, Some(150.0), Some(120.0), None],
        );
        let err = prepare(&data, &ColumnNames::default(), &Formulas::new(), &selection())
            .expect_err("zero cost");
        assert!(matches!(
            err,
            BindingError::Registry(RegistryError::SupportViolation { row: 1, .. })
        ));
    }

    #[test]
    fn hurdle_indicators_use_overrides_only_for_missing_values() {
        let config = ModelConfig::new(
            Distribution::Beta,
            Distribution::Gamma,
            ModelFamily::Hurdle {
                structural: StructuralType::Sar,
                se: Some(1.0),
                sc: None,
            },
        );
        let data = trial().with_numeric(
            "d_e",
            vec![Some(0.0), Some(1.0), Some(0.0), None, None, None],
        );
        let prepared =
            prepare(&data, &ColumnNames::default(), &Formulas::new(), &config).expect("prepares");
        let indicators = &prepared.structural[&Outcome::Effect];
        assert_eq!(indicators[0], vec![Some(0.0), Some(1.0), Some(1.0)]);
        assert_eq!(indicators[1], vec![Some(0.0), Some(1.0), None]);
        assert!(matches!(
            prepared.bindings.get("effc1"),
            Some(DataValue::Vector(values)) if values == &vec![Some(0.6), None, None]
        ));
    }

    #[test]
    fn scar_ignores_structural_covariates() {
        let config = ModelConfig::new(
            Distribution::Beta,
            Distribution::Gamma,
            ModelFamily::Hurdle {
                structural: StructuralType::Scar,
                se: Some(1.0),
                sc: None,
            },
        );
        let formulas = Formulas::new()
            .with(SubModel::StructuralEffect, "se ~ age")
            .expect("formula");
        let prepared =
            prepare(&trial(), &ColumnNames::default(), &formulas, &config).expect("prepares");
        assert_eq!(prepared.dims.fixed_count(SubModel::StructuralEffect), 0);
    }

    #[test]
    fn finalize_keeps_referenced_names_and_adds_priors() {
        let config = selection();
        let formulas = Formulas::new().with(SubModel::Effect, "e ~ age").expect("formula");
        let prepared =
            prepare(&trial(), &ColumnNames::default(), &formulas, &config).expect("prepares");
        let model =
            compile(&config, &prepared.dims, CompileOptions::default()).expect("compiles");
        let priors = PriorSet::resolve(&config, &PriorOverrides::new()).expect("priors");
        let bindings = finalize(&prepared, &model, &priors).expect("binds");

        assert!(bindings.contains("X1_e"));
        assert!(bindings.contains("mean_cov_e"));
        assert!(bindings.contains("prior.alpha0"));
        assert!(bindings.contains("prior.sigma.c"));
        assert!(!bindings.contains("d1"));
        assert!(!bindings.contains("e.centre"));
        assert_eq!(
            bindings.names().collect::<BTreeSet<_>>(),
            model.data_names.iter().map(String::as_str).collect()
        );
    }
}
