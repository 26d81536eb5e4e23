//! Model-text compiler.
//!
//! [`compile`] turns a [`ModelConfig`] and the data-derived [`ModelDimensions`] into
//! JAGS model text plus everything needed to run it: the ordered monitored nodes,
//! the prior roles and data names the text references, and the root parameters that
//! receive initial values. Compilation is a pure function of its inputs.

mod fragments;
mod hurdle;
mod pattern;
mod selection;

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::inference::MonitoredNode;

use super::priors::PriorRole;
use super::registry::Outcome;
use super::types::{ModelConfig, ModelFamily, SubModel};

use fragments::ModelWriter;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("the {restriction} restriction needs the complete-case pattern, which no record follows")]
    MissingReferencePattern { restriction: &'static str },
    #[error("pattern-mixture models need at least one realized missingness pattern")]
    NoPatterns,
    #[error("arm {arm} has no records")]
    EmptyArm { arm: usize },
}

/// Joint missingness pattern of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MissingPattern {
    /// Both outcomes observed.
    Complete = 1,
    /// Effect missing, cost observed.
    EffectMissing = 2,
    /// Cost missing, effect observed.
    CostMissing = 3,
    /// Both outcomes missing.
    BothMissing = 4,
}

impl MissingPattern {
    #[must_use]
    pub const fn from_observed(effect_observed: bool, cost_observed: bool) -> Self {
        match (effect_observed, cost_observed) {
            (true, true) => Self::Complete,
            (false, true) => Self::EffectMissing,
            (true, false) => Self::CostMissing,
            (false, false) => Self::BothMissing,
        }
    }

    #[must_use]
    pub const fn code(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn observes(self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Effect => matches!(self, Self::Complete | Self::CostMissing),
            Outcome::Cost => matches!(self, Self::Complete | Self::EffectMissing),
        }
    }
}

/// Random-effects layout of one sub-model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomDims {
    pub intercept: bool,
    pub slopes: usize,
    /// Clusters per arm.
    pub clusters: [usize; 2],
}

/// Counts the compiler needs from the bound data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModelDimensions {
    pub arm_sizes: [usize; 2],
    /// Fixed covariate columns per sub-model, intercept excluded.
    pub fixed: BTreeMap<SubModel, usize>,
    pub random: BTreeMap<SubModel, RandomDims>,
    /// Missing outcome entries per arm.
    pub missing: BTreeMap<Outcome, [usize; 2]>,
    /// Realized patterns in code order (pattern-mixture models only).
    pub patterns: Vec<MissingPattern>,
}

impl ModelDimensions {
    #[must_use]
    pub fn fixed_count(&self, submodel: SubModel) -> usize {
        self.fixed.get(&submodel).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn random_dims(&self, submodel: SubModel) -> Option<&RandomDims> {
        self.random.get(&submodel)
    }

    #[must_use]
    pub fn missing_in_arm(&self, outcome: Outcome, arm: usize) -> usize {
        self.missing.get(&outcome).map_or(0, |counts| counts[arm])
    }

    /// 1-based position of `pattern` among realized patterns.
    #[must_use]
    pub fn pattern_index(&self, pattern: MissingPattern) -> Option<usize> {
        self.patterns
            .iter()
            .position(|p| *p == pattern)
            .map(|index| index + 1)
    }
}

/// A root parameter that receives initial values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterNode {
    pub name: String,
    pub dims: Vec<usize>,
    pub role: PriorRole,
    /// Rows (1-based first index) defined deterministically and therefore left
    /// unset in initial values.
    pub fixed_rows: Vec<usize>,
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModel {
    pub text: String,
    pub monitored: Vec<MonitoredNode>,
    pub prior_roles: BTreeSet<PriorRole>,
    pub data_names: BTreeSet<String>,
    pub parameters: Vec<ParameterNode>,
}

impl CompiledModel {
    #[must_use]
    pub fn monitored_node(&self, name: &str) -> Option<&MonitoredNode> {
        self.monitored.iter().find(|node| node.name == name)
    }

    #[must_use]
    pub fn is_monitored(&self, name: &str) -> bool {
        self.monitored_node(name).is_some()
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterNode> {
        self.parameters.iter().find(|node| node.name == name)
    }
}

/// Options that add optional nodes without changing the model itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    /// Emit posterior-predictive replicate nodes.
    pub ppc: bool,
    /// Emit pointwise log-likelihood nodes.
    pub loglik: bool,
}

/// Compile a model configuration into sampler-ready model text.
///
/// # Errors
///
/// Returns `CompileError` when the dimensions cannot support the configuration,
/// such as an empty arm or a missing reference pattern.
pub fn compile(
    config: &ModelConfig,
    dims: &ModelDimensions,
    options: CompileOptions,
) -> Result<CompiledModel, CompileError> {
    if let Some(arm) = dims.arm_sizes.iter().position(|n| *n == 0) {
        return Err(CompileError::EmptyArm { arm: arm + 1 });
    }

    let mut writer = ModelWriter::new(config, dims, options);
    match config.family {
        ModelFamily::Selection { missing } => selection::compile(&mut writer, missing),
        ModelFamily::Pattern {
            missing,
            restriction,
        } => pattern::compile(&mut writer, missing, restriction)?,
        ModelFamily::Hurdle { .. } => hurdle::compile(&mut writer),
    }
    let model = writer.finish();

    debug!(
        family = %config.family.kind(),
        lines = model.text.lines().count(),
        monitored = model.monitored.len(),
        data = model.data_names.len(),
        "compiled model"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::Distribution;
    use crate::models::types::{MissingType, Restriction, StructuralType};

    fn dims(fixed: &[(SubModel, usize)]) -> ModelDimensions {
        ModelDimensions {
            arm_sizes: [75, 84],
            fixed: fixed.iter().copied().collect(),
            random: BTreeMap::new(),
            missing: [(Outcome::Effect, [10, 12]), (Outcome::Cost, [0, 5])]
                .into_iter()
                .collect(),
            patterns: Vec::new(),
        }
    }

    fn selection(missing: MissingType) -> ModelConfig {
        ModelConfig::new(
            Distribution::Normal,
            Distribution::Normal,
            ModelFamily::Selection { missing },
        )
    }

    fn names(model: &CompiledModel) -> Vec<&str> {
        model.monitored.iter().map(|node| node.name.as_str()).collect()
    }

    #[test]
    fn selection_mar_emits_outcome_and_missingness_models() {
        let model = compile(
            &selection(MissingType::Mar),
            &dims(&[]),
            CompileOptions::default(),
        )
        .expect("compiles");

        assert!(model.text.starts_with("model {\n"));
        assert!(model.text.contains("for (i in 1:N1) {"));
        assert!(model.text.contains("lp_e1[i] <- alpha0[1]"));
        assert!(model.text.contains("eff1[i] ~ dnorm(lp_e1[i], 1 / pow(s.e[1], 2))"));
        assert!(model.text.contains("lp_c2[i] <- beta0[2] + beta_f[2] * (eff2[i] - mu.e[2])"));
        assert!(model.text.contains("m_eff1[i] ~ dbern(p_me1[i])"));
        assert!(model.text.contains("mu.e[t] <- nu.e[t]"));
        assert!(!model.text.contains("delta.e"));

        assert_eq!(
            &names(&model)[..6],
            &["mu.e", "mu.c", "nu.e", "nu.c", "s.e", "s.c"]
        );
        assert!(model.is_monitored("rho"));
        assert!(model.is_monitored("eff1"));
        assert!(model.is_monitored("eff2"));
        assert!(!model.is_monitored("cost1"));
        assert!(model.is_monitored("cost2"));
        assert!(model.data_names.contains("prior.alpha0"));
        assert!(model.prior_roles.contains(&PriorRole::Dependence));
    }

    #[test]
    fn compilation_is_deterministic() {
        let config = selection(MissingType::Mnar);
        let dims = dims(&[(SubModel::Effect, 2), (SubModel::MissingCost, 1)]);
        let options = CompileOptions {
            ppc: true,
            loglik: true,
        };
        let first = compile(&config, &dims, options).expect("compiles");
        let second = compile(&config, &dims, options).expect("compiles");
        assert_eq!(first, second);
    }

    #[test]
    fn mnar_effect_adds_standardized_outcome_term() {
        let model = compile(
            &selection(MissingType::MnarEffect),
            &dims(&[]),
            CompileOptions::default(),
        )
        .expect("compiles");
        assert!(model
            .text
            .contains("delta.e[1] * (eff1[i] - e.centre[1]) / e.scale[1]"));
        assert!(!model.text.contains("delta.c"));
        assert!(model.is_monitored("delta.e"));
        assert!(model.prior_roles.contains(&PriorRole::Mnar(Outcome::Effect)));
        assert!(model.data_names.contains("e.scale"));
    }

    #[test]
    fn covariates_use_data_counts_and_arm_means() {
        let model = compile(
            &selection(MissingType::Mar),
            &dims(&[(SubModel::Effect, 2)]),
            CompileOptions::default(),
        )
        .expect("compiles");
        assert!(model.text.contains("inprod(X1_e[i, ], alpha[, 1])"));
        assert!(model.text.contains("for (k in 1:2) {"));
        assert!(model.text.contains("inprod(mean_cov_e[t, ], alpha[, t])"));
        let alpha = model.monitored_node("alpha").expect("alpha monitored");
        assert_eq!(alpha.dims, vec![2, 2]);
        assert_eq!(model.parameter("alpha").map(|p| p.dims.clone()), Some(vec![2, 2]));
    }

    #[test]
    fn independence_removes_dependence_nodes() {
        let config = selection(MissingType::Mar).with_independence(true);
        let model = compile(&config, &dims(&[]), CompileOptions::default()).expect("compiles");
        assert!(!model.text.contains("beta_f"));
        assert!(!model.is_monitored("rho"));
        assert!(!model.prior_roles.contains(&PriorRole::Dependence));
    }

    #[test]
    fn random_intercept_replaces_fixed_intercept() {
        let mut dims = dims(&[]);
        dims.random.insert(
            SubModel::Effect,
            RandomDims {
                intercept: true,
                slopes: 0,
                clusters: [4, 5],
            },
        );
        let model = compile(&selection(MissingType::Mar), &dims, CompileOptions::default())
            .expect("compiles");
        assert!(model.text.contains("lp_e1[i] <- a0_1[clus1_e[i]]"));
        assert!(model.text.contains("a0_2[j] ~ dnorm(mu.a0[2], tau.a0[2])"));
        assert!(model.text.contains("nu.e[t] <- mu.a0[t]"));
        assert!(!model.text.contains("alpha0["));
        assert_eq!(model.monitored_node("a0_2").map(|n| n.dims.clone()), Some(vec![5]));
        assert!(model.data_names.contains("n_clus1_e"));
    }

    fn pattern(missing: MissingType, restriction: Restriction) -> ModelConfig {
        ModelConfig::new(
            Distribution::Normal,
            Distribution::Gamma,
            ModelFamily::Pattern {
                missing,
                restriction,
            },
        )
    }

    #[test]
    fn pattern_intercepts_follow_realized_patterns() {
        let mut dims = dims(&[]);
        dims.patterns = vec![
            MissingPattern::Complete,
            MissingPattern::EffectMissing,
            MissingPattern::BothMissing,
        ];
        let model = compile(
            &pattern(MissingType::Mar, Restriction::CompleteCase),
            &dims,
            CompileOptions::default(),
        )
        .expect("compiles");

        assert!(model.text.contains("pi.p[1:3, t] ~ ddirch(dir.p[])"));
        assert!(model.text.contains("alpha0.p[1, t] ~ dnorm"));
        assert!(model.text.contains("alpha0.p[2, t] <- alpha0.p[1, t]\n"));
        assert!(model.text.contains("alpha0.p[3, t] <- alpha0.p[1, t]\n"));
        assert!(model.text.contains("beta0.p[2, t] ~ dnorm"));
        assert!(model.text.contains("beta0.p[3, t] <- beta0.p[1, t]\n"));
        assert_eq!(
            model.parameter("alpha0.p").map(|p| p.fixed_rows.clone()),
            Some(vec![2, 3])
        );
        assert_eq!(model.monitored_node("pi.p").map(|n| n.dims.clone()), Some(vec![3, 2]));
        assert!(!model.is_monitored("Delta.e"));
    }

    #[test]
    fn pattern_mnar_shifts_unidentified_intercepts() {
        let mut dims = dims(&[]);
        dims.patterns = vec![MissingPattern::Complete, MissingPattern::EffectMissing];
        let model = compile(
            &pattern(MissingType::Mnar, Restriction::CompleteCase),
            &dims,
            CompileOptions::default(),
        )
        .expect("compiles");
        assert!(model
            .text
            .contains("alpha0.p[2, t] <- alpha0.p[1, t] + Delta.e[t]"));
        assert!(model.is_monitored("Delta.e"));
        // Costs are observed in both patterns, so nothing borrows from them.
        assert!(!model.text.contains("Delta.c"));
    }

    #[test]
    fn available_case_prefers_single_outcome_pattern() {
        let mut dims = dims(&[]);
        dims.patterns = vec![
            MissingPattern::Complete,
            MissingPattern::EffectMissing,
            MissingPattern::CostMissing,
        ];
        let model = compile(
            &pattern(MissingType::Mar, Restriction::AvailableCase),
            &dims,
            CompileOptions::default(),
        )
        .expect("compiles");
        // Effects borrow from pattern 3 (only effects observed), costs from pattern 2.
        assert!(model.text.contains("alpha0.p[2, t] <- alpha0.p[3, t]"));
        assert!(model.text.contains("beta0.p[3, t] <- beta0.p[2, t]"));
    }

    #[test]
    fn complete_case_without_complete_records_fails() {
        let mut dims = dims(&[]);
        dims.patterns = vec![MissingPattern::EffectMissing, MissingPattern::CostMissing];
        let err = compile(
            &pattern(MissingType::Mar, Restriction::CompleteCase),
            &dims,
            CompileOptions::default(),
        )
        .expect_err("no reference pattern");
        assert_eq!(err, CompileError::MissingReferencePattern { restriction: "CC" });
    }

    #[test]
    fn hurdle_mixes_structural_values_for_one_outcome() {
        let config = ModelConfig::new(
            Distribution::Beta,
            Distribution::Gamma,
            ModelFamily::Hurdle {
                structural: StructuralType::Scar,
                se: Some(1.0),
                sc: None,
            },
        );
        let model = compile(
            &config,
            &dims(&[]),
            CompileOptions {
                ppc: true,
                loglik: true,
            },
        )
        .expect("compiles");

        assert!(model.text.contains("d_e1[i] ~ dbern(p_se1[i])"));
        assert!(model.text.contains("effc1[i] ~ dbeta("));
        assert!(model
            .text
            .contains("eff1[i] <- d_e1[i] * struct.e + (1 - d_e1[i]) * effc1[i]"));
        assert!(model
            .text
            .contains("mu.e[t] <- p.se[t] * struct.e + (1 - p.se[t]) * ilogit(nu.e[t])"));
        assert!(model.text.contains("cost1[i] ~ dgamma("));
        assert!(!model.text.contains("d_c1"));
        assert!(!model.text.contains("gamma0.c"));
        assert!(model.is_monitored("p.se"));
        assert!(model.is_monitored("loglik_se2"));
        assert!(model.is_monitored("rep_e1"));
        assert!(!model.data_names.contains("eff1"));
        assert!(model.data_names.contains("effc1"));
    }

    #[test]
    fn empty_arm_is_rejected() {
        let mut dims = dims(&[]);
        dims.arm_sizes = [10, 0];
        assert_eq!(
            compile(&selection(MissingType::Mar), &dims, CompileOptions::default()),
            Err(CompileError::EmptyArm { arm: 2 })
        );
    }
}
