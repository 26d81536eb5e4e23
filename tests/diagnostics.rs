mod common;

use common::{StubSampler, trial_159};
use missing_ce::{
    DiagnosticsError, FitOptions, FitResult, Formulas, McmcConfig, Outcome, PicMethod, PicScope,
    autocorrelation_profile, convergence_table, information_criteria_table,
    information_criterion, parameter_diagnostics, posterior_predictive, selection, trace,
};

fn fit(ppc: bool, loglik: bool) -> FitResult {
    let options = FitOptions::default()
        .with_mcmc(
            McmcConfig::default()
                .with_iterations(600)
                .with_burn_in(200),
        )
        .with_ppc(ppc)
        .with_model_diagnostics(loglik);
    selection(&trial_159(), &Formulas::new(), &options, &StubSampler::new()).expect("fit")
}

#[test]
fn parameter_diagnostics_filter_by_node() {
    let result = fit(false, false);
    let rows = parameter_diagnostics(&result, Some("mu.e"), 0.95).expect("mu.e");
    let elements = rows.iter().map(|row| row.element.as_str()).collect::<Vec<_>>();
    assert_eq!(elements, vec!["mu.e[1]", "mu.e[2]"]);
    for row in &rows {
        assert!(row.rhat.is_finite());
        assert!(row.ess > 0.0);
        assert_eq!(row.geweke.len(), 2);
    }
    assert!(!convergence_table(&rows).to_string().is_empty());

    let all = parameter_diagnostics(&result, None, 0.95).expect("all");
    assert_eq!(all.len(), result.draws.names().len());

    let err = parameter_diagnostics(&result, Some("zeta"), 0.95).expect_err("unknown");
    assert_eq!(err, DiagnosticsError::UnknownParameter("zeta".to_string()));
}

#[test]
fn traces_and_autocorrelations_are_per_chain() {
    let result = fit(false, false);
    let chains = trace(&result, "mu.c[2]").expect("trace");
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].len(), 400);

    let profile = autocorrelation_profile(&result, "mu.c[2]", 5).expect("acf");
    assert_eq!(profile.len(), 2);
    assert_eq!(profile[0].len(), 6);
    assert!((profile[0][0] - 1.0).abs() < 1.0e-12);
}

#[test]
fn predictive_checks_need_replicates() {
    let err = posterior_predictive(&fit(false, false), Outcome::Effect, 1, 10)
        .expect_err("no replicates");
    assert_eq!(err, DiagnosticsError::ReplicatesDisabled);

    let result = fit(true, false);
    let check = posterior_predictive(&result, Outcome::Cost, 2, 10).expect("ppc");
    let observed = result
        .prepared
        .outcome(Outcome::Cost, 1)
        .iter()
        .filter(|value| value.is_some())
        .count();
    assert_eq!(check.observed.len(), observed);
    assert_eq!(check.replicates.len(), 10);
    assert!(check.replicates.iter().all(|rep| rep.len() == observed));
    assert!((0.0..=1.0).contains(&check.p_mean));

    let err = posterior_predictive(&result, Outcome::Cost, 3, 10).expect_err("arm");
    assert_eq!(err, DiagnosticsError::InvalidArm(3));
}

#[test]
fn information_criteria_follow_scope() {
    let err = information_criterion(&fit(false, false), PicMethod::Waic, PicScope::Total)
        .expect_err("no loglik");
    assert_eq!(err, DiagnosticsError::LogLikelihoodDisabled);

    let result = fit(false, true);
    let total = information_criterion(&result, PicMethod::Waic, PicScope::Total).expect("total");
    let effects =
        information_criterion(&result, PicMethod::Waic, PicScope::Effects).expect("effects");
    let both = information_criterion(&result, PicMethod::Waic, PicScope::Both).expect("both");

    assert_eq!(total.observations, 159);
    let observed_e = (0..2)
        .map(|arm| {
            result
                .prepared
                .outcome(Outcome::Effect, arm)
                .iter()
                .filter(|value| value.is_some())
                .count()
        })
        .sum::<usize>();
    assert_eq!(effects.observations, observed_e);
    assert!(both.observations <= effects.observations);
    assert!(total.value().is_finite());

    let rows = [PicMethod::Waic, PicMethod::Looic, PicMethod::Dic]
        .into_iter()
        .map(|method| information_criterion(&result, method, PicScope::Costs).expect("costs"))
        .collect::<Vec<_>>();
    assert!(rows.iter().all(|row| row.estimates.pointwise.len() == row.observations));
    assert!(!information_criteria_table(&rows).to_string().is_empty());
}
