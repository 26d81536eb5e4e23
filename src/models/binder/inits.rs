//! Per-chain initial values: data-informed defaults and validation of user-supplied
//! values.

use std::collections::BTreeSet;

use faer::Mat;
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

use crate::inference::jags::DEFAULT_RNG;
use crate::inference::{DataValue, InitialValues, McmcConfig};
use crate::models::compiler::{CompiledModel, ParameterNode};
use crate::models::priors::{PriorRole, PriorSet, RandomPart};
use crate::models::registry::{Distribution, Link, Outcome};
use crate::models::types::SubModel;
use crate::utils::{clamp_probability, logit};

use super::{BindingError, PreparedData};

/// Link-scale starting value for an outcome intercept in arm `arm` (0-based).
fn outcome_location(
    prepared: &PreparedData,
    dist: Distribution,
    outcome: Outcome,
    arm: usize,
) -> f64 {
    let mean = prepared
        .diagnostics(outcome, arm)
        .map_or(f64::NAN, |d| d.observed_mean);
    if !mean.is_finite() {
        return 0.0;
    }
    match dist.link() {
        Link::Identity => mean,
        Link::Log if mean > 0.0 => mean.ln(),
        Link::Logit if mean > 0.0 && mean < 1.0 => logit(mean),
        Link::Log | Link::Logit => 0.0,
    }
}

/// Logit of the indicator rate modelled by `sub` in arm `arm`.
fn indicator_location(prepared: &PreparedData, sub: SubModel, arm: usize) -> f64 {
    let rate = prepared
        .diagnostics(sub.outcome(), arm)
        .map_or(0.5, |d| match sub {
            SubModel::MissingEffect | SubModel::MissingCost => d.missing_share,
            _ => d.structural_share,
        });
    logit(clamp_probability(rate))
}

fn location(
    prepared: &PreparedData,
    dist: &impl Fn(Outcome) -> Distribution,
    sub: SubModel,
    arm: usize,
) -> f64 {
    if sub.is_indicator() {
        indicator_location(prepared, sub, arm)
    } else {
        let outcome = sub.outcome();
        outcome_location(prepared, dist(outcome), outcome, arm)
    }
}

/// Keep `value` strictly inside the prior's support.
fn inside(value: f64, (lower, upper): (f64, f64)) -> f64 {
    if lower.is_finite() && upper.is_finite() {
        let margin = (upper - lower) * 0.01;
        value.clamp(lower + margin, upper - margin)
    } else if lower.is_finite() {
        value.max(lower + 1.0e-3)
    } else if upper.is_finite() {
        value.min(upper - 1.0e-3)
    } else {
        value
    }
}

fn dispersion_start(
    prepared: &PreparedData,
    dist: Distribution,
    outcome: Outcome,
    arm: usize,
    rng: &mut StdRng,
) -> f64 {
    match dist {
        Distribution::Beta => rng.random_range(0.2..0.5),
        Distribution::Weibull => rng.random_range(0.8..1.5),
        Distribution::NegativeBinomial => rng.random_range(1.0..5.0),
        _ => {
            let (mean, sd) = prepared
                .diagnostics(outcome, arm)
                .map_or((f64::NAN, f64::NAN), |d| (d.observed_mean, d.observed_sd));
            // Log-normal dispersion lives on the log scale.
            let spread = if dist == Distribution::LogNormal && mean > 0.0 {
                (1.0 + (sd / mean).powi(2)).ln().sqrt()
            } else {
                sd
            };
            let spread = if spread.is_finite() && spread > 0.0 {
                spread
            } else {
                1.0
            };
            spread * rng.random_range(0.8..1.2)
        }
    }
}

fn start_value(
    node: &ParameterNode,
    prepared: &PreparedData,
    priors: &PriorSet,
    dist: &impl Fn(Outcome) -> Distribution,
    arm: usize,
    rng: &mut StdRng,
) -> f64 {
    let bounds = priors
        .get(node.role)
        .map_or((f64::NEG_INFINITY, f64::INFINITY), |spec| spec.bounds());
    let jitter = |rng: &mut StdRng, width: f64| rng.random_range(-width..width);
    let value = match node.role {
        PriorRole::Intercept(sub) | PriorRole::RandomMean(sub, RandomPart::Intercept) => {
            location(prepared, dist, sub, arm) + jitter(rng, 0.1)
        }
        PriorRole::Coefficients(_)
        | PriorRole::Dependence
        | PriorRole::Mnar(_)
        | PriorRole::RandomMean(_, RandomPart::Slope) => jitter(rng, 0.05),
        PriorRole::Dispersion(outcome) => {
            dispersion_start(prepared, dist(outcome), outcome, arm, rng)
        }
        PriorRole::RandomSd(_, _) => rng.random_range(0.1..1.0),
    };
    inside(value, bounds)
}

fn node_value(
    node: &ParameterNode,
    prepared: &PreparedData,
    priors: &PriorSet,
    dist: &impl Fn(Outcome) -> Distribution,
    rng: &mut StdRng,
) -> DataValue {
    match node.dims.as_slice() {
        [arms] => {
            let values = (0..*arms)
                .map(|arm| start_value(node, prepared, priors, dist, arm, rng))
                .collect::<Vec<_>>();
            DataValue::observed(&values)
        }
        [rows, arms] if node.fixed_rows.is_empty() => {
            let mut matrix = Mat::zeros(*rows, *arms);
            for arm in 0..*arms {
                for row in 0..*rows {
                    matrix[(row, arm)] = start_value(node, prepared, priors, dist, arm, rng);
                }
            }
            DataValue::Matrix(matrix)
        }
        dims => {
            let (rows, arms) = match dims {
                [rows, arms] => (*rows, *arms),
                _ => (dims.iter().product(), 1),
            };
            let mut values = Vec::with_capacity(rows * arms);
            for arm in 0..arms {
                for row in 1..=rows {
                    values.push(if node.fixed_rows.contains(&row) {
                        None
                    } else {
                        Some(start_value(node, prepared, priors, dist, arm, rng))
                    });
                }
            }
            DataValue::Array {
                dims: dims.to_vec(),
                values,
            }
        }
    }
}

/// Data-informed initial values for every chain.
///
/// Chain `k` draws from a generator seeded with [`McmcConfig::chain_seed`], so the
/// values are reproducible for a fixed seed.
#[must_use]
pub fn generate_inits(
    model: &CompiledModel,
    prepared: &PreparedData,
    priors: &PriorSet,
    dist: impl Fn(Outcome) -> Distribution,
    mcmc: McmcConfig,
) -> Vec<InitialValues> {
    (0..mcmc.chains)
        .map(|chain| {
            let seed = mcmc.chain_seed(chain);
            let mut rng = StdRng::seed_from_u64(seed);
            let mut inits = InitialValues::new().with_rng(DEFAULT_RNG, seed);
            for node in &model.parameters {
                let value = node_value(node, prepared, priors, &dist, &mut rng);
                inits.values.insert(node.name.clone(), value);
            }
            inits
        })
        .collect()
}

/// Check user-supplied initial values against the compiled model.
///
/// Each chain must name exactly the model's root parameters with matching shapes.
///
/// # Errors
///
/// Returns `BindingError` describing the first mismatch.
pub fn validate_inits(
    inits: &[InitialValues],
    model: &CompiledModel,
    mcmc: McmcConfig,
) -> Result<(), BindingError> {
    if inits.len() != mcmc.chains {
        return Err(BindingError::InitCount {
            expected: mcmc.chains,
            found: inits.len(),
        });
    }

    let required = model
        .parameters
        .iter()
        .map(|node| node.name.as_str())
        .collect::<BTreeSet<_>>();
    for (chain, values) in inits.iter().enumerate() {
        let supplied = values.values.keys().map(String::as_str).collect::<BTreeSet<_>>();
        if supplied != required {
            return Err(BindingError::InitNames {
                chain: chain + 1,
                missing: required.difference(&supplied).map(ToString::to_string).collect(),
                unexpected: supplied.difference(&required).map(ToString::to_string).collect(),
            });
        }
        for node in &model.parameters {
            let found = values.values[&node.name].shape();
            if found != node.dims {
                return Err(BindingError::InitShape {
                    chain: chain + 1,
                    name: node.name.clone(),
                    expected: node.dims.clone(),
                    found,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ColumnNames, TrialData};
    use crate::models::binder::prepare;
    use crate::models::compiler::{CompileOptions, MissingPattern, compile};
    use crate::models::priors::PriorOverrides;
    use crate::models::types::{Formulas, MissingType, ModelConfig, ModelFamily, Restriction};

    fn trial() -> TrialData {
        TrialData::new()
            .with_observed("t", &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0])
            .with_numeric(
                "e",
                vec![Some(0.6), None, Some(0.9), Some(0.8), Some(0.7), Some(0.75)],
            )
            .with_numeric(
                "c",
                vec![Some(100.0), Some(80.0), Some(90.0), Some(150.0), None, Some(130.0)],
            )
    }

    fn setup(config: &ModelConfig) -> (CompiledModel, PreparedData, PriorSet) {
        let prepared =
            prepare(&trial(), &ColumnNames::default(), &Formulas::new(), config).expect("prepares");
        let model = compile(config, &prepared.dims, CompileOptions::default()).expect("compiles");
        let priors = PriorSet::resolve(config, &PriorOverrides::new()).expect("priors");
        (model, prepared, priors)
    }

    fn beta_gamma_selection() -> ModelConfig {
        ModelConfig::new(
            Distribution::Beta,
            Distribution::Gamma,
            ModelFamily::Selection {
                missing: MissingType::Mar,
            },
        )
    }

    #[test]
    fn generated_inits_cover_every_parameter_and_respect_priors() {
        let config = beta_gamma_selection();
        let (model, prepared, priors) = setup(&config);
        let mcmc = McmcConfig::default().with_chains(3);
        let inits = generate_inits(&model, &prepared, &priors, |o| config.distribution(o), mcmc);

        assert_eq!(inits.len(), 3);
        assert!(validate_inits(&inits, &model, mcmc).is_ok());
        for (chain, values) in inits.iter().enumerate() {
            assert_eq!(values.rng_name.as_deref(), Some(DEFAULT_RNG));
            assert_eq!(values.rng_seed, Some(mcmc.chain_seed(chain)));
            let Some(DataValue::Vector(dispersion)) = values.values.get("s.e") else {
                panic!("s.e should be a vector");
            };
            for s in dispersion.iter().flatten() {
                assert!(*s > 0.0 && *s < 1.0);
            }
        }
    }

    #[test]
    fn inits_are_reproducible_per_seed() {
        let config = beta_gamma_selection();
        let (model, prepared, priors) = setup(&config);
        let mcmc = McmcConfig::default();
        let render = |inits: &[InitialValues]| {
            inits
                .iter()
                .map(crate::inference::jags::render_inits)
                .collect::<Vec<_>>()
        };
        let first = generate_inits(&model, &prepared, &priors, |o| config.distribution(o), mcmc);
        let second = generate_inits(&model, &prepared, &priors, |o| config.distribution(o), mcmc);
        assert_eq!(render(&first), render(&second));
        assert_ne!(render(&first)[0], render(&first)[1]);
    }

    #[test]
    fn pattern_inits_leave_borrowed_intercepts_unset() {
        let config = ModelConfig::new(
            Distribution::Normal,
            Distribution::Normal,
            ModelFamily::Pattern {
                missing: MissingType::Mar,
                restriction: Restriction::CompleteCase,
            },
        );
        let (model, prepared, priors) = setup(&config);
        assert_eq!(
            prepared.dims.patterns,
            vec![
                MissingPattern::Complete,
                MissingPattern::EffectMissing,
                MissingPattern::CostMissing
            ]
        );
        let inits = generate_inits(
            &model,
            &prepared,
            &priors,
            |o| config.distribution(o),
            McmcConfig::default(),
        );
        let Some(DataValue::Array { dims, values }) = inits[0].values.get("alpha0.p") else {
            panic!("alpha0.p should be a partially set array");
        };
        assert_eq!(dims, &vec![3, 2]);
        // Pattern 2 has missing effects and borrows its intercept.
        assert!(values[0].is_some());
        assert!(values[1].is_none());
        assert!(values[2].is_some());
        assert!(values[4].is_none());
    }

    #[test]
    fn user_inits_must_match_names_and_shapes() {
        let config = beta_gamma_selection();
        let (model, _, _) = setup(&config);
        let mcmc = McmcConfig::default();

        let err = validate_inits(&[InitialValues::new()], &model, mcmc).expect_err("one chain");
        assert_eq!(err, BindingError::InitCount { expected: 2, found: 1 });

        let partial = InitialValues::new().with_vector("alpha0", &[0.0, 0.0]);
        let err = validate_inits(&[partial.clone(), partial], &model, mcmc).expect_err("names");
        assert!(matches!(err, BindingError::InitNames { chain: 1, .. }));
    }
}
