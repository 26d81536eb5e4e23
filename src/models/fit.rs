//! Fit orchestration for the three model families.
//!
//! Each entry point validates the configuration, binds the data, compiles the
//! model text, draws initial values, hands everything to a [`Sampler`], and
//! packages the draws with their post-processing into an immutable
//! [`FitResult`]. Sampler failures propagate unchanged; convergence problems are
//! reported inside the result.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::inference::jags::DEFAULT_RNG;
use crate::inference::{
    ConvergenceReport, DataBindings, InferenceError, InitialValues, McmcConfig, MonitoredNode,
    PosteriorDraws, Sampler, SamplerError, SamplerRequest,
};
use crate::input::{ColumnNames, TrialData};

use super::binder::{self, BindingError, PreparedData, generate_inits, validate_inits};
use super::compiler::{self, CompileError, CompileOptions, CompiledModel};
use super::posterior::{
    self, EconomicEvaluation, EconomicOptions, Imputations, MeanOutcomes, PosteriorError,
};
use super::priors::{PriorError, PriorOverrides, PriorSet};
use super::registry::Distribution;
use super::types::{
    ConfigError, FamilyKind, Formulas, MissingType, ModelConfig, ModelFamily, Restriction,
    StructuralType,
};

/// Errors returned by the fit entry points.
#[derive(Debug, Error)]
pub enum FitError {
    #[error("invalid model configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid prior: {0}")]
    Prior(#[from] PriorError),
    #[error("data binding failed: {0}")]
    Binding(#[from] BindingError),
    #[error("model compilation failed: {0}")]
    Compile(#[from] CompileError),
    #[error("invalid MCMC schedule: {0}")]
    Schedule(#[from] InferenceError),
    #[error(transparent)]
    Sampler(#[from] SamplerError),
    #[error("posterior processing failed: {0}")]
    Posterior(#[from] PosteriorError),
    #[error("failed to write model text to {path}: {source}")]
    ModelFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Options shared by the fit entry points.
///
/// Family-specific fields are read only by the family that uses them: `missing`
/// by selection and pattern-mixture fits, `restriction` by pattern-mixture fits,
/// `structural`, `se` and `sc` by hurdle fits.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub dist_e: Distribution,
    pub dist_c: Distribution,
    pub missing: MissingType,
    pub restriction: Restriction,
    pub structural: StructuralType,
    /// Structural value of effects.
    pub se: Option<f64>,
    /// Structural value of costs.
    pub sc: Option<f64>,
    /// Contemporaneous independence between effects and costs.
    pub independent: bool,
    pub mcmc: McmcConfig,
    pub priors: PriorOverrides,
    /// One set per chain; generated from the data when absent.
    pub inits: Option<Vec<InitialValues>>,
    /// Monitor posterior-predictive replicates.
    pub ppc: bool,
    /// Monitor pointwise log-likelihood nodes for information criteria.
    pub model_diagnostics: bool,
    /// Where to save the compiled model text.
    pub model_file: Option<PathBuf>,
    pub columns: ColumnNames,
    pub economics: EconomicOptions,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            dist_e: Distribution::Normal,
            dist_c: Distribution::Normal,
            missing: MissingType::Mar,
            restriction: Restriction::CompleteCase,
            structural: StructuralType::Scar,
            se: None,
            sc: None,
            independent: false,
            mcmc: McmcConfig::default(),
            priors: PriorOverrides::new(),
            inits: None,
            ppc: false,
            model_diagnostics: false,
            model_file: None,
            columns: ColumnNames::default(),
            economics: EconomicOptions::default(),
        }
    }
}

impl FitOptions {
    #[must_use]
    pub fn with_distributions(mut self, dist_e: Distribution, dist_c: Distribution) -> Self {
        self.dist_e = dist_e;
        self.dist_c = dist_c;
        self
    }

    #[must_use]
    pub fn with_missing(mut self, missing: MissingType) -> Self {
        self.missing = missing;
        self
    }

    #[must_use]
    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }

    #[must_use]
    pub fn with_structural(mut self, structural: StructuralType) -> Self {
        self.structural = structural;
        self
    }

    #[must_use]
    pub fn with_structural_values(mut self, se: Option<f64>, sc: Option<f64>) -> Self {
        self.se = se;
        self.sc = sc;
        self
    }

    #[must_use]
    pub fn with_independence(mut self, independent: bool) -> Self {
        self.independent = independent;
        self
    }

    #[must_use]
    pub fn with_mcmc(mut self, mcmc: McmcConfig) -> Self {
        self.mcmc = mcmc;
        self
    }

    #[must_use]
    pub fn with_priors(mut self, priors: PriorOverrides) -> Self {
        self.priors = priors;
        self
    }

    #[must_use]
    pub fn with_inits(mut self, inits: Vec<InitialValues>) -> Self {
        self.inits = Some(inits);
        self
    }

    #[must_use]
    pub fn with_ppc(mut self, ppc: bool) -> Self {
        self.ppc = ppc;
        self
    }

    #[must_use]
    pub fn with_model_diagnostics(mut self, enabled: bool) -> Self {
        self.model_diagnostics = enabled;
        self
    }

    #[must_use]
    pub fn with_model_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_columns(mut self, columns: ColumnNames) -> Self {
        self.columns = columns;
        self
    }

    #[must_use]
    pub fn with_economics(mut self, economics: EconomicOptions) -> Self {
        self.economics = economics;
        self
    }
}

/// Everything produced by one fit.
#[derive(Debug, Clone)]
pub struct FitResult {
    pub config: ModelConfig,
    pub model: CompiledModel,
    pub prepared: PreparedData,
    /// Data exactly as passed to the sampler.
    pub data: DataBindings,
    pub priors: PriorSet,
    pub inits: Vec<InitialValues>,
    pub draws: PosteriorDraws,
    pub convergence: ConvergenceReport,
    pub means: MeanOutcomes,
    pub imputations: Imputations,
    pub economics: EconomicEvaluation,
    pub options: FitOptions,
}

impl FitResult {
    #[must_use]
    pub const fn family(&self) -> FamilyKind {
        self.config.family.kind()
    }

    #[must_use]
    pub fn model_text(&self) -> &str {
        &self.model.text
    }

    #[must_use]
    pub fn monitored(&self) -> &[MonitoredNode] {
        &self.model.monitored
    }
}

/// Fit a selection model: outcome regressions plus logistic models for the
/// probability that each outcome is missing.
///
/// # Errors
///
/// Returns `FitError` for invalid configuration or data, compilation failures,
/// sampler failures, or incomplete draws.
pub fn selection(
    data: &TrialData,
    formulas: &Formulas,
    options: &FitOptions,
    sampler: &dyn Sampler,
) -> Result<FitResult, FitError> {
    let family = ModelFamily::Selection {
        missing: options.missing,
    };
    fit(data, formulas, family, options, sampler)
}

/// Fit a pattern-mixture model over the realized missingness patterns.
///
/// # Errors
///
/// Returns `FitError` for invalid configuration or data, an unrealized
/// reference pattern, sampler failures, or incomplete draws.
pub fn pattern(
    data: &TrialData,
    formulas: &Formulas,
    options: &FitOptions,
    sampler: &dyn Sampler,
) -> Result<FitResult, FitError> {
    let family = ModelFamily::Pattern {
        missing: options.missing,
        restriction: options.restriction,
    };
    fit(data, formulas, family, options, sampler)
}

/// Fit a hurdle model for outcomes with a structural value (`se`, `sc`).
///
/// # Errors
///
/// Returns `FitError` when neither structural value is set, for invalid data,
/// sampler failures, or incomplete draws.
pub fn hurdle(
    data: &TrialData,
    formulas: &Formulas,
    options: &FitOptions,
    sampler: &dyn Sampler,
) -> Result<FitResult, FitError> {
    let family = ModelFamily::Hurdle {
        structural: options.structural,
        se: options.se,
        sc: options.sc,
    };
    fit(data, formulas, family, options, sampler)
}

/// Build the model configuration from the family, options, and formulas.
///
/// # Errors
///
/// Returns `ConfigError` for inadmissible distributions, invalid family options,
/// or formulas for sub-models the family does not include.
pub fn model_config(
    family: ModelFamily,
    formulas: &Formulas,
    options: &FitOptions,
) -> Result<ModelConfig, ConfigError> {
    let submodels = family.submodels();
    if let Some(submodel) = formulas.submodels().find(|sub| !submodels.contains(sub)) {
        return Err(ConfigError::UnusedSubModel {
            submodel,
            family: family.kind(),
        });
    }
    let config = formulas.random_terms().into_iter().fold(
        ModelConfig::new(options.dist_e, options.dist_c, family)
            .with_independence(options.independent),
        |config, (submodel, term)| config.with_random(submodel, term),
    );
    config.validate()?;
    Ok(config)
}

fn fit(
    data: &TrialData,
    formulas: &Formulas,
    family: ModelFamily,
    options: &FitOptions,
    sampler: &dyn Sampler,
) -> Result<FitResult, FitError> {
    options.mcmc.validate()?;
    options.economics.validate()?;
    let config = model_config(family, formulas, options)?;
    let priors = PriorSet::resolve(&config, &options.priors)?;
    info!(
        family = %config.family.kind(),
        dist_e = %config.dist_e,
        dist_c = %config.dist_c,
        "fitting model"
    );

    let prepared = binder::prepare(data, &options.columns, formulas, &config)?;
    let model = compiler::compile(
        &config,
        &prepared.dims,
        CompileOptions {
            ppc: options.ppc,
            loglik: options.model_diagnostics,
        },
    )?;
    debug!(
        bytes = model.text.len(),
        monitored = model.monitored.len(),
        "compiled model text"
    );
    if let Some(path) = &options.model_file {
        fs::write(path, &model.text).map_err(|source| FitError::ModelFile {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "saved model text");
    }

    let bindings = binder::finalize(&prepared, &model, &priors)?;
    debug!(
        names = ?bindings.names().collect::<Vec<_>>(),
        "bound sampler data"
    );
    let inits = match &options.inits {
        Some(user) => {
            validate_inits(user, &model, options.mcmc)?;
            user.iter()
                .enumerate()
                .map(|(chain, values)| {
                    if values.rng_name.is_some() {
                        values.clone()
                    } else {
                        values
                            .clone()
                            .with_rng(DEFAULT_RNG, options.mcmc.chain_seed(chain))
                    }
                })
                .collect()
        }
        None => generate_inits(
            &model,
            &prepared,
            &priors,
            |outcome| config.distribution(outcome),
            options.mcmc,
        ),
    };

    let request = SamplerRequest {
        model: &model.text,
        data: &bindings,
        inits: &inits,
        monitor: &model.monitored,
        schedule: options.mcmc,
    };
    info!(
        chains = options.mcmc.chains,
        iterations = options.mcmc.iterations,
        burn_in = options.mcmc.burn_in,
        "invoking sampler"
    );
    let output = sampler.sample(&request)?;
    output.ensure_complete(&request)?;

    let convergence = output.convergence.clone().map_or_else(
        || ConvergenceReport::from_draws(&output.draws),
        ConvergenceReport::from_summaries,
    );
    if !convergence.is_converged() {
        warn!(
            elements = convergence.warnings.len(),
            max_rhat = ?convergence.max_rhat,
            "some monitored elements have not converged"
        );
    }

    let draws = output.draws;
    let means = posterior::mean_outcomes(&config, &draws)?;
    let imputations = Imputations::extract(&prepared, &draws)?;
    let economics = posterior::evaluate(&means, &options.economics)?;
    debug!(
        draws = draws.total_draws(),
        imputed = imputations.len(),
        "post-processed posterior"
    );

    Ok(FitResult {
        config,
        model,
        prepared,
        data: bindings,
        priors,
        inits,
        draws,
        convergence,
        means,
        imputations,
        economics,
        options: options.clone(),
    })
}
