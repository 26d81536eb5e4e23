//! Hurdle model for effects with a structural value of one (perfect health).
//!
//! Requires the `jags` executable on `PATH`.

use missing_ce::{
    Distribution, FitOptions, Formulas, JagsSampler, McmcConfig, Outcome, StructuralType,
    SubModel, TrialData, hurdle, posterior_predictive,
};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut rng = StdRng::seed_from_u64(3);
    let n = 150;
    let mut arm = Vec::with_capacity(n);
    let mut sex = Vec::with_capacity(n);
    let mut effects = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);
    for i in 0..n {
        let treated = i >= 70;
        let male = rng.random::<f64>() < 0.5;
        let perfect = rng.random::<f64>() < if male { 0.3 } else { 0.15 };
        let e = if perfect {
            1.0
        } else {
            0.6 + 0.3 * rng.random::<f64>()
        };
        let c = 500.0 + if treated { 200.0 } else { 0.0 } + 250.0 * rng.random::<f64>();
        arm.push(if treated { 2.0 } else { 1.0 });
        sex.push(Some(if male { "m" } else { "f" }.to_string()));
        effects.push((i % 6 != 0).then_some(e));
        costs.push((i % 8 != 3).then_some(c));
    }
    let data = TrialData::new()
        .with_observed("t", &arm)
        .with_factor("sex", sex)
        .with_numeric("e", effects)
        .with_numeric("c", costs);

    let formulas = Formulas::new().with(SubModel::StructuralEffect, "se ~ sex")?;
    let options = FitOptions::default()
        .with_distributions(Distribution::Beta, Distribution::Gamma)
        .with_structural(StructuralType::Sar)
        .with_structural_values(Some(1.0), None)
        .with_ppc(true)
        .with_mcmc(McmcConfig::default().with_iterations(4_000).with_burn_in(2_000));
    let sampler = JagsSampler::new(std::env::temp_dir().join("missing_ce_hurdle"));
    let result = hurdle(&data, &formulas, &options, &sampler)?;

    println!("{result}");
    for arm in 1..=2 {
        let check = posterior_predictive(&result, Outcome::Effect, arm, 20)?;
        println!(
            "arm {arm}: observed mean {:.3}, replicated {:.3} [{:.3}, {:.3}], p = {:.2}",
            check.observed_mean,
            check.replicated_mean.mean,
            check.replicated_mean.lower,
            check.replicated_mean.upper,
            check.p_mean
        );
    }
    Ok(())
}
