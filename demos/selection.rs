//! Selection model under MNAR effects, fit with JAGS.
//!
//! Requires the `jags` executable on `PATH`. Set `RUST_LOG=missing_ce=debug` for
//! pipeline logs.

use missing_ce::{
    Distribution, FitOptions, Formulas, JagsSampler, McmcConfig, MissingType, PicMethod,
    PicScope, RandomView, SubModel, TrialData, coefficient_table, coefficients,
    information_criterion, selection,
};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let data = synthetic_trial(200, 7);
    let formulas = Formulas::new()
        .with(SubModel::Effect, "e ~ age")?
        .with(SubModel::Cost, "c ~ age")?
        .with(SubModel::MissingEffect, "me ~ age")?;
    let options = FitOptions::default()
        .with_distributions(Distribution::Beta, Distribution::Gamma)
        .with_missing(MissingType::MnarEffect)
        .with_model_diagnostics(true)
        .with_mcmc(McmcConfig::default().with_iterations(5_000).with_burn_in(2_500));

    let work_dir = std::env::temp_dir().join("missing_ce_selection");
    let sampler = JagsSampler::new(work_dir);
    let result = selection(&data, &formulas, &options, &sampler)?;

    println!("{result}");
    println!(
        "{}",
        coefficient_table(&coefficients(&result, 0.9, RandomView::Fixed))
    );
    let economics = &result.economics;
    println!(
        "P(cost-effective at 20000) = {:.3}",
        economics.probability_cost_effective(20_000.0)
    );
    let waic = information_criterion(&result, PicMethod::Waic, PicScope::Total)?;
    println!("WAIC {:.2} (p_eff {:.2})", waic.value(), waic.estimates.effective_parameters);
    Ok(())
}

fn synthetic_trial(n: usize, seed: u64) -> TrialData {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut arm = Vec::with_capacity(n);
    let mut age = Vec::with_capacity(n);
    let mut effects = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);
    for i in 0..n {
        let treated = i % 2 == 1;
        let a = 50.0 + 20.0 * (rng.random::<f64>() - 0.5);
        let e = 0.65 + if treated { 0.05 } else { 0.0 } - 0.002 * (a - 50.0)
            + 0.1 * (rng.random::<f64>() - 0.5);
        let c = 900.0 + if treated { 250.0 } else { 0.0 } + 300.0 * rng.random::<f64>();
        let missing_e = rng.random::<f64>() < 0.15 + 0.3 * (0.8 - e).max(0.0) * 3.0;
        let missing_c = rng.random::<f64>() < 0.2;
        arm.push(if treated { 2.0 } else { 1.0 });
        age.push(a);
        effects.push((!missing_e).then_some(e.clamp(0.01, 0.99)));
        costs.push((!missing_c).then_some(c));
    }
    TrialData::new()
        .with_observed("t", &arm)
        .with_observed("age", &age)
        .with_numeric("e", effects)
        .with_numeric("c", costs)
}
