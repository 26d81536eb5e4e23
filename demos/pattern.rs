//! Pattern-mixture model with an available-case restriction and MNAR shifts.
//!
//! Requires the `jags` executable on `PATH`.

use missing_ce::{
    FitOptions, Formulas, JagsSampler, McmcConfig, MissingType, Outcome, Restriction, TrialData,
    imputation_table, pattern,
};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut rng = StdRng::seed_from_u64(11);
    let n = 160;
    let arm = (0..n).map(|i| if i < 80 { 1.0 } else { 2.0 }).collect::<Vec<_>>();
    let mut effects = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);
    for i in 0..n {
        let e = 0.7 + 0.2 * (rng.random::<f64>() - 0.5);
        let c = 1_000.0 + 400.0 * (rng.random::<f64>() - 0.5);
        effects.push((i % 4 != 1 && i % 9 != 0).then_some(e));
        costs.push((i % 5 != 2 && i % 9 != 0).then_some(c));
    }
    let data = TrialData::new()
        .with_observed("t", &arm)
        .with_numeric("e", effects)
        .with_numeric("c", costs);

    let options = FitOptions::default()
        .with_missing(MissingType::Mnar)
        .with_restriction(Restriction::AvailableCase)
        .with_mcmc(McmcConfig::default().with_iterations(4_000).with_burn_in(2_000));
    let sampler = JagsSampler::new(std::env::temp_dir().join("missing_ce_pattern"));
    let result = pattern(&data, &Formulas::new(), &options, &sampler)?;

    println!("{result}");
    println!(
        "{}",
        imputation_table(&result.imputations.summaries(Some(Outcome::Cost), Some(2), 0.95))
    );
    Ok(())
}
