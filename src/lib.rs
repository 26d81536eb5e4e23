#![forbid(unsafe_code)]

//! # `missing_ce`
//!
//! Bayesian cost-effectiveness analysis of two-arm trials whose effectiveness and
//! cost outcomes are partially missing or carry a structural value (for example
//! zero costs or perfect health). Three model families are provided:
//!
//! - selection models, where missingness indicators depend on the outcomes under
//!   MNAR assumptions;
//! - pattern-mixture models over realized missingness patterns, identified through
//!   complete-case or available-case restrictions;
//! - hurdle models mixing a structural point mass with a continuous component.
//!
//! Each fit emits JAGS model text, binds data and per-chain initial values, runs a
//! [`Sampler`] (the bundled [`JagsSampler`] drives the `jags` executable), and
//! post-processes the draws into mean outcomes, imputations, and an economic
//! evaluation with ICER, expected incremental benefit, and acceptability curves.
//!
//! # Examples
//!
//! Compile a selection model without sampling it:
//!
//! ```
//! use missing_ce::models::{binder, compiler};
//! use missing_ce::{
//!     ColumnNames, Distribution, Formulas, MissingType, ModelConfig, ModelFamily, TrialData,
//! };
//!
//! let data = TrialData::new()
//!     .with_observed("t", &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0])
//!     .with_numeric("e", vec![Some(0.6), None, Some(0.7), Some(0.8), Some(0.9), None])
//!     .with_numeric("c", vec![Some(100.0), Some(120.0), None, Some(150.0), Some(90.0), Some(130.0)]);
//! let config = ModelConfig::new(
//!     Distribution::Normal,
//!     Distribution::Gamma,
//!     ModelFamily::Selection { missing: MissingType::Mar },
//! );
//!
//! let prepared = binder::prepare(&data, &ColumnNames::default(), &Formulas::new(), &config)
//!     .expect("binding");
//! let model = compiler::compile(&config, &prepared.dims, compiler::CompileOptions::default())
//!     .expect("compiled");
//! assert!(model.is_monitored("mu.e"));
//! assert!(model.text.contains("dgamma"));
//! ```

pub mod inference;
pub mod input;
pub mod models;
pub mod preprocess;
pub mod utils;

pub use inference::{
    ConvergenceReport, ConvergenceSummary, DataBindings, DataValue, DrawIndex, InferenceError,
    InitialValues, JagsSampler, McmcConfig, MonitoredNode, NodeSupport, PosteriorDraws, Sampler,
    SamplerError, SamplerOutput, SamplerRequest,
};
pub use input::{ColumnNames, Formula, FormulaError, InputError, RandomTerm, TrialData};
pub use preprocess::{OutcomeDiagnostics, outcome_diagnostics};

pub use models::diagnostics::{
    DiagnosticsError, GewekeScore, InformationCriterion, ParameterDiagnostics, PicMethod,
    PicScope, PredictiveCheck, autocorrelation_profile, information_criterion,
    parameter_diagnostics, posterior_predictive, trace,
};
pub use models::fit::{FitError, FitOptions, FitResult, hurdle, pattern, selection};
pub use models::posterior::{
    EconomicEvaluation, EconomicOptions, ImputationSummary, Imputations, ImputedValue,
    MeanOutcomes, PosteriorError, QuadrantShares,
};
pub use models::priors::{PriorError, PriorOverrides, PriorRole, PriorSet};
pub use models::registry::{Distribution, Link, Outcome, RegistryError, Support};
pub use models::report::{
    CoefficientRow, RandomView, coefficient_table, coefficients, convergence_table,
    imputation_table, information_criteria_table, summary_table,
};
pub use models::types::{
    ConfigError, FamilyKind, Formulas, MissingType, ModelConfig, ModelFamily, Restriction,
    StructuralType, SubModel,
};
