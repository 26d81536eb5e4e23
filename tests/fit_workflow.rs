mod common;

use approx::assert_relative_eq;
use common::{FailingSampler, StubSampler, trial_159};
use missing_ce::models::binder::BindingError;
use missing_ce::{
    ConfigError, Distribution, FitError, FitOptions, Formulas, InitialValues, InputError,
    McmcConfig, MissingType, Outcome, PriorOverrides, RandomView, RegistryError, Restriction, SamplerError,
    StructuralType, SubModel, TrialData, coefficients, hurdle, pattern, selection, summary_table,
};

fn schedule() -> McmcConfig {
    McmcConfig::default()
        .with_iterations(1_000)
        .with_burn_in(500)
}

#[test]
fn selection_mar_end_to_end() {
    let data = trial_159();
    let formulas = Formulas::new()
        .with(SubModel::Effect, "e ~ age")
        .expect("formula");
    let options = FitOptions::default().with_mcmc(schedule());
    let sampler = StubSampler::new();

    let result = selection(&data, &formulas, &options, &sampler).expect("fit");

    assert_eq!(sampler.calls.get(), 1);
    assert_eq!(result.prepared.arms.sizes(), [75, 84]);
    for element in ["mu.e[1]", "mu.e[2]", "mu.c[1]", "mu.c[2]"] {
        assert!(result.draws.contains(element), "{element}");
    }
    for element in result.draws.names() {
        assert!(result.convergence.get(element).is_some(), "{element}");
    }

    let rows = coefficients(&result, 0.95, RandomView::Fixed);
    assert!(rows.iter().any(|row| row.term == "age"));
    for row in &rows {
        assert!(row.summary.lower <= row.summary.mean, "{}", row.element);
        assert!(row.summary.mean <= row.summary.upper, "{}", row.element);
    }

    let missing_e = data
        .numeric("e")
        .expect("effects")
        .iter()
        .filter(|value| value.is_none())
        .count();
    assert_eq!(
        result.imputations.filter(Some(Outcome::Effect), None).count(),
        missing_e
    );
    assert_eq!(result.inits.len(), 2);
    assert!(result.inits.iter().all(|init| init.rng_name.is_some()));
    assert!(!summary_table(&result).to_string().is_empty());
}

#[test]
fn icer_is_summarized_per_draw() {
    let sampler = StubSampler::new();
    let options = FitOptions::default().with_mcmc(schedule());
    let result = selection(&trial_159(), &Formulas::new(), &options, &sampler).expect("fit");
    let economics = &result.economics;

    for (index, ratio) in economics.icer_draws.iter().enumerate() {
        let expected = economics.delta_c[index] / economics.delta_e[index];
        if ratio.is_finite() {
            assert_relative_eq!(*ratio, expected, max_relative = 1.0e-12);
        }
    }
    let ratio_of_means = economics.delta_c_summary.mean / economics.delta_e_summary.mean;
    assert!((economics.icer.mean - ratio_of_means).abs() > 1.0e-9);
    assert_eq!(economics.wtp.len(), economics.ceac.len());
}

#[test]
fn gamma_costs_with_a_zero_cost_fail_before_sampling() {
    let data = trial_159();
    let mut costs = data.numeric("c").expect("costs").to_vec();
    costs[4] = Some(0.0);
    let data = data.with_numeric("c", costs);
    let options = FitOptions::default()
        .with_distributions(Distribution::Normal, Distribution::Gamma)
        .with_mcmc(schedule());
    let sampler = StubSampler::new();

    let err = selection(&data, &Formulas::new(), &options, &sampler).expect_err("zero cost");
    assert!(matches!(
        err,
        FitError::Binding(BindingError::Registry(RegistryError::SupportViolation { .. }))
    ));
    assert_eq!(sampler.calls.get(), 0);
}

#[test]
fn clustering_variable_must_exist_before_sampling() {
    let data = trial_159();
    assert!(data.numeric("site").is_err());
    let formulas = Formulas::new()
        .with(SubModel::Effect, "e ~ age + (1 | site)")
        .expect("formula");
    let options = FitOptions::default().with_mcmc(schedule());
    let sampler = StubSampler::new();

    let err = selection(&data, &formulas, &options, &sampler).expect_err("no site column");

    match &err {
        FitError::Binding(BindingError::Input(InputError::MissingColumn(column))) => {
            assert_eq!(column, "site");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("site"));
    assert_eq!(sampler.calls.get(), 0);
}

#[test]
fn lognormal_effects_are_rejected() {
    let options = FitOptions::default().with_distributions(Distribution::LogNormal, Distribution::Gamma);
    let err = selection(&trial_159(), &Formulas::new(), &options, &StubSampler::new())
        .expect_err("lognormal effects");
    assert!(matches!(err, FitError::Config(ConfigError::Registry(_))));
}

#[test]
fn unknown_prior_names_are_rejected() {
    let options = FitOptions::default()
        .with_mcmc(schedule())
        .with_priors(PriorOverrides::new().set("alpha9", 0.0, 1.0));
    let sampler = StubSampler::new();
    let err = selection(&trial_159(), &Formulas::new(), &options, &sampler).expect_err("prior");
    assert!(matches!(err, FitError::Prior(_)));
    assert_eq!(sampler.calls.get(), 0);
}

#[test]
fn single_chain_schedules_are_rejected() {
    let options = FitOptions::default().with_mcmc(schedule().with_chains(1));
    let err = selection(&trial_159(), &Formulas::new(), &options, &StubSampler::new())
        .expect_err("one chain");
    assert!(matches!(err, FitError::Schedule(_)));
}

#[test]
fn sampler_failures_propagate_unchanged() {
    let options = FitOptions::default().with_mcmc(schedule());
    let err = selection(&trial_159(), &Formulas::new(), &options, &FailingSampler)
        .expect_err("sampler failure");
    match err {
        FitError::Sampler(SamplerError::Failed { output, .. }) => {
            assert!(output.contains("node inconsistent with parents"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn user_inits_must_cover_every_chain() {
    let options = FitOptions::default()
        .with_mcmc(schedule())
        .with_inits(vec![InitialValues::new()]);
    let err = selection(&trial_159(), &Formulas::new(), &options, &StubSampler::new())
        .expect_err("init count");
    assert!(matches!(
        err,
        FitError::Binding(BindingError::InitCount {
            expected: 2,
            found: 1
        })
    ));
}

#[test]
fn model_text_is_written_when_requested() {
    let path = std::env::temp_dir().join(format!("missing_ce_model_{}.txt", std::process::id()));
    let options = FitOptions::default()
        .with_mcmc(schedule())
        .with_model_file(&path);
    let result = selection(&trial_159(), &Formulas::new(), &options, &StubSampler::new())
        .expect("fit");
    let written = std::fs::read_to_string(&path).expect("model file");
    assert_eq!(written, result.model_text());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn hurdle_without_structural_costs_has_no_structural_cost_nodes() {
    let data = trial_159();
    let effects = data
        .numeric("e")
        .expect("effects")
        .iter()
        .enumerate()
        .map(|(i, value)| value.map(|v| if i % 4 == 0 { 1.0 } else { v }))
        .collect::<Vec<_>>();
    let data = data.with_numeric("e", effects);
    let options = FitOptions::default()
        .with_structural(StructuralType::Scar)
        .with_structural_values(Some(1.0), None)
        .with_mcmc(schedule());

    let result = hurdle(&data, &Formulas::new(), &options, &StubSampler::new()).expect("fit");

    assert!(result.model.is_monitored("p.se"));
    assert!(!result.model.is_monitored("p.sc"));
    assert!(!result.model.is_monitored("gamma0.c"));
    assert!(!result.model_text().contains("d_c1"));
    assert!(result.draws.names().iter().all(|name| !name.starts_with("p.sc")));
}

#[test]
fn hurdle_needs_a_structural_value() {
    let options = FitOptions::default().with_mcmc(schedule());
    let err = hurdle(&trial_159(), &Formulas::new(), &options, &StubSampler::new())
        .expect_err("no structural value");
    assert!(matches!(err, FitError::Config(ConfigError::NoStructuralValue)));
}

fn two_pattern_trial() -> TrialData {
    let n = 40;
    let arm = (0..n).map(|i| if i < 20 { 1.0 } else { 2.0 }).collect::<Vec<_>>();
    let observed = |i: usize| i % 4 != 3;
    let effects = (0..n)
        .map(|i| observed(i).then(|| 0.6 + 0.01 * f64::from(u8::try_from(i).unwrap_or(0))))
        .collect();
    let costs = (0..n)
        .map(|i| observed(i).then(|| 500.0 + 10.0 * f64::from(u8::try_from(i).unwrap_or(0))))
        .collect();
    TrialData::new()
        .with_observed("t", &arm)
        .with_numeric("e", effects)
        .with_numeric("c", costs)
}

#[test]
fn complete_case_substitutes_the_complete_pattern_intercept() {
    let options = FitOptions::default()
        .with_restriction(Restriction::CompleteCase)
        .with_mcmc(schedule());
    let result =
        pattern(&two_pattern_trial(), &Formulas::new(), &options, &StubSampler::new()).expect("fit");

    assert_eq!(result.prepared.dims.patterns.len(), 2);
    let text = result.model_text();
    assert!(text.contains("alpha0.p[2, t] <- alpha0.p[1, t]\n"));
    assert!(text.contains("beta0.p[2, t] <- beta0.p[1, t]\n"));
    assert!(!text.contains("Delta.e"));
    assert!(result.draws.contains("pi.p[2,1]"));
}

#[test]
fn pattern_count_matches_realized_combinations() {
    let data = trial_159();
    let effects = data.numeric("e").expect("effects");
    let costs = data.numeric("c").expect("costs");
    let realized = effects
        .iter()
        .zip(costs)
        .map(|(e, c)| (e.is_some(), c.is_some()))
        .collect::<std::collections::BTreeSet<_>>();

    let options = FitOptions::default()
        .with_missing(MissingType::Mnar)
        .with_mcmc(schedule());
    let result = pattern(&data, &Formulas::new(), &options, &StubSampler::new()).expect("fit");

    assert!(result.prepared.dims.patterns.len() <= 4);
    assert_eq!(result.prepared.dims.patterns.len(), realized.len());
    assert!(result.model.is_monitored("Delta.e"));
    assert!(result.model.is_monitored("Delta.c"));
    for mean in result.means.arm(Outcome::Effect, 0) {
        assert!(mean.is_finite());
    }
}
