//! Hurdle models: a logistic model for the probability of a structural value and a
//! continuous model for everything else, mixed per individual.

use crate::inference::{MonitoredNode, NodeSupport};
use crate::models::registry::Outcome;
use crate::models::types::SubModel;

use super::fragments::{
    self, ModelWriter, arm_intercept, arm_mean_predictor, dependence_term, fixed_intercept_term,
    has_fixed_intercept, open_arm_loop, outcome_value, predictor,
};
use super::selection::outcome_submodel;

const fn structural_submodel(outcome: Outcome) -> SubModel {
    match outcome {
        Outcome::Effect => SubModel::StructuralEffect,
        Outcome::Cost => SubModel::StructuralCost,
    }
}

fn structural_outcomes(w: &ModelWriter<'_>) -> Vec<Outcome> {
    Outcome::BOTH
        .into_iter()
        .filter(|outcome| w.config.family.structural_value(*outcome).is_some())
        .collect()
}

pub(super) fn compile(w: &mut ModelWriter<'_>) {
    let structural = structural_outcomes(w);
    let submodels = w.config.family.submodels();

    for arm in 1..=2 {
        w.comment(&format!("arm {arm}"));
        open_arm_loop(w, arm);
        for outcome in Outcome::BOTH {
            if structural.contains(&outcome) {
                mixture_block(w, outcome, arm);
            } else {
                plain_block(w, outcome, arm);
            }
        }
        w.close();
        for sub in &submodels {
            fragments::random_effects(w, *sub, arm, false);
        }
        w.blank();
    }

    w.open("for (t in 1:2)");
    for outcome in Outcome::BOTH {
        let sub = outcome_submodel(outcome);
        let suffix = outcome.suffix();
        let intercept = arm_intercept(w, sub);
        let linear = arm_mean_predictor(w, sub, intercept);
        w.line(format!("nu.{suffix}[t] <- {linear}"));
        let continuous = w
            .distribution(outcome)
            .outcome_mean_text(&format!("nu.{suffix}[t]"), &format!("s.{suffix}[t]"));
        if structural.contains(&outcome) {
            let indicator = structural_submodel(outcome);
            fragments::indicator_arm_probability(w, indicator);
            let value = w.data(format!("struct.{suffix}"));
            let p = format!("p.{}[t]", indicator.symbol());
            w.line(format!(
                "mu.{suffix}[t] <- {p} * {value} + (1 - {p}) * {continuous}"
            ));
        } else {
            w.line(format!("mu.{suffix}[t] <- {continuous}"));
        }
    }
    w.blank();
    for sub in &submodels {
        let fixed = has_fixed_intercept(w, *sub);
        fragments::submodel_priors(w, *sub, fixed, true);
    }
    for outcome in Outcome::BOTH {
        fragments::dispersion_prior(w, outcome);
    }
    fragments::dependence_priors(w);
    w.close();

    monitor(w, &structural);
}

fn outcome_predictor(w: &mut ModelWriter<'_>, outcome: Outcome, arm: usize) -> String {
    let sub = outcome_submodel(outcome);
    let intercept = fixed_intercept_term(w, sub, arm);
    let linear = predictor(w, sub, arm, intercept);
    match dependence_term(w, outcome, arm) {
        Some(dependence) => format!("{linear} + {dependence}"),
        None => linear,
    }
}

fn plain_block(w: &mut ModelWriter<'_>, outcome: Outcome, arm: usize) {
    w.data(format!("{}{arm}", outcome.data_stem()));
    let y = outcome_value(outcome, arm);
    let linear = outcome_predictor(w, outcome, arm);
    let nodes = fragments::outcome_likelihood(w, outcome, arm, &linear, &y);
    if w.options.ppc {
        fragments::replicate(w, outcome, &nodes, &format!("rep_{}{arm}[i]", outcome.suffix()));
    }
    if w.options.loglik {
        fragments::loglik(w, outcome, arm, &nodes, &y);
    }
}

/// Structural indicator, continuous component, and their mixture `eff1[i]`.
fn mixture_block(w: &mut ModelWriter<'_>, outcome: Outcome, arm: usize) {
    let suffix = outcome.suffix();
    let sub = structural_submodel(outcome);
    let value = w.data(format!("struct.{suffix}"));
    let indicator = format!("{}[i]", w.data(format!("d_{suffix}{arm}")));
    fragments::indicator_likelihood(w, sub, arm, &indicator, None);

    let continuous = format!("{}[i]", w.data(format!("{}c{arm}", outcome.data_stem())));
    let linear = outcome_predictor(w, outcome, arm);
    let nodes = fragments::outcome_likelihood(w, outcome, arm, &linear, &continuous);
    w.line(format!(
        "{} <- {indicator} * {value} + (1 - {indicator}) * {continuous}",
        outcome_value(outcome, arm)
    ));

    if w.options.ppc {
        let draw = format!("rd_{suffix}{arm}[i]");
        let component = format!("rc_{suffix}{arm}[i]");
        w.line(format!("{draw} ~ dbern(p_{}{arm}[i])", sub.symbol()));
        fragments::replicate(w, outcome, &nodes, &component);
        w.line(format!(
            "rep_{suffix}{arm}[i] <- {draw} * {value} + (1 - {draw}) * {component}"
        ));
    }
    if w.options.loglik {
        fragments::loglik(w, outcome, arm, &nodes, &continuous);
    }
}

fn monitor(w: &mut ModelWriter<'_>, structural: &[Outcome]) {
    let supports = Outcome::BOTH.map(|outcome| {
        let dist = w.distribution(outcome);
        if structural.contains(&outcome) {
            (NodeSupport::Real, NodeSupport::Real)
        } else {
            (fragments::mean_support(dist), dist.support().node_support())
        }
    });

    fragments::monitor_means(w, supports[0].0, supports[1].0);
    for outcome in Outcome::BOTH {
        w.monitor(MonitoredNode::vector(
            format!("nu.{}", outcome.suffix()),
            2,
            NodeSupport::Real,
        ));
    }
    fragments::monitor_dispersion(w);
    for outcome in Outcome::BOTH {
        fragments::monitor_coefficients(w, outcome_submodel(outcome), true);
    }
    fragments::monitor_dependence(w);
    for outcome in Outcome::BOTH {
        fragments::monitor_random(w, outcome_submodel(outcome), true);
    }

    for outcome in structural {
        let sub = structural_submodel(*outcome);
        fragments::monitor_coefficients(w, sub, true);
        fragments::monitor_random(w, sub, true);
        w.monitor(MonitoredNode::vector(
            format!("p.{}", sub.symbol()),
            2,
            NodeSupport::UnitInterval,
        ));
    }

    fragments::monitor_imputations(w, Outcome::Effect, supports[0].1);
    fragments::monitor_imputations(w, Outcome::Cost, supports[1].1);

    let mut stems = vec!["e".to_string(), "c".to_string()];
    stems.extend(
        structural
            .iter()
            .map(|outcome| structural_submodel(*outcome).symbol().to_string()),
    );
    fragments::monitor_checks(w, [supports[0].1, supports[1].1], &stems);
}
