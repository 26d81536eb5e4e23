//! Selection models: outcome regressions plus logistic models for the probability
//! that each outcome is missing.

use crate::inference::{MonitoredNode, NodeSupport};
use crate::models::priors::PriorRole;
use crate::models::registry::Outcome;
use crate::models::types::{MissingType, SubModel};

use super::fragments::{
    self, ModelWriter, arm_intercept, arm_mean_predictor, dependence_term, fixed_intercept_term,
    has_fixed_intercept, open_arm_loop, outcome_value, predictor,
};

pub(super) const fn outcome_submodel(outcome: Outcome) -> SubModel {
    match outcome {
        Outcome::Effect => SubModel::Effect,
        Outcome::Cost => SubModel::Cost,
    }
}

const fn missing_submodel(outcome: Outcome) -> SubModel {
    match outcome {
        Outcome::Effect => SubModel::MissingEffect,
        Outcome::Cost => SubModel::MissingCost,
    }
}

const SUBMODELS: [SubModel; 4] = [
    SubModel::Effect,
    SubModel::Cost,
    SubModel::MissingEffect,
    SubModel::MissingCost,
];

pub(super) fn compile(w: &mut ModelWriter<'_>, missing: MissingType) {
    for arm in 1..=2 {
        w.comment(&format!("arm {arm}"));
        open_arm_loop(w, arm);
        for outcome in Outcome::BOTH {
            outcome_block(w, outcome, arm);
        }
        for outcome in Outcome::BOTH {
            missingness_block(w, outcome, arm, missing.is_mnar(outcome));
        }
        w.close();
        for sub in SUBMODELS {
            fragments::random_effects(w, sub, arm, false);
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
        let mean = w
            .distribution(outcome)
            .outcome_mean_text(&format!("nu.{suffix}[t]"), &format!("s.{suffix}[t]"));
        w.line(format!("mu.{suffix}[t] <- {mean}"));
    }
    for outcome in Outcome::BOTH {
        fragments::indicator_arm_probability(w, missing_submodel(outcome));
    }
    w.blank();
    for sub in SUBMODELS {
        let fixed = has_fixed_intercept(w, sub);
        fragments::submodel_priors(w, sub, fixed, true);
    }
    for outcome in Outcome::BOTH {
        fragments::dispersion_prior(w, outcome);
    }
    fragments::dependence_priors(w);
    for outcome in Outcome::BOTH.into_iter().filter(|o| missing.is_mnar(*o)) {
        let name = format!("delta.{}", outcome.suffix());
        w.prior(PriorRole::Mnar(outcome), &format!("{name}[t]"));
        w.parameter(&name, vec![2], PriorRole::Mnar(outcome));
    }
    w.close();

    monitor(w, missing);
}

fn outcome_block(w: &mut ModelWriter<'_>, outcome: Outcome, arm: usize) {
    let sub = outcome_submodel(outcome);
    w.data(format!("{}{arm}", outcome.data_stem()));
    let y = outcome_value(outcome, arm);
    let intercept = fixed_intercept_term(w, sub, arm);
    let mut linear = predictor(w, sub, arm, intercept);
    if let Some(dependence) = dependence_term(w, outcome, arm) {
        linear = format!("{linear} + {dependence}");
    }
    let nodes = fragments::outcome_likelihood(w, outcome, arm, &linear, &y);
    if w.options.ppc {
        fragments::replicate(w, outcome, &nodes, &format!("rep_{}{arm}[i]", outcome.suffix()));
    }
    if w.options.loglik {
        fragments::loglik(w, outcome, arm, &nodes, &y);
    }
}

fn missingness_block(w: &mut ModelWriter<'_>, outcome: Outcome, arm: usize, mnar: bool) {
    let suffix = outcome.suffix();
    let indicator = format!("{}[i]", w.data(format!("m_{}{arm}", outcome.data_stem())));
    let shift = mnar.then(|| {
        let centre = w.data(format!("{suffix}.centre"));
        let scale = w.data(format!("{suffix}.scale"));
        format!(
            "delta.{suffix}[{arm}] * ({} - {centre}[{arm}]) / {scale}[{arm}]",
            outcome_value(outcome, arm)
        )
    });
    fragments::indicator_likelihood(w, missing_submodel(outcome), arm, &indicator, shift);
}

fn monitor(w: &mut ModelWriter<'_>, missing: MissingType) {
    let dist_e = w.distribution(Outcome::Effect);
    let dist_c = w.distribution(Outcome::Cost);
    fragments::monitor_means(w, fragments::mean_support(dist_e), fragments::mean_support(dist_c));
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

    for outcome in Outcome::BOTH {
        let sub = missing_submodel(outcome);
        fragments::monitor_coefficients(w, sub, true);
        fragments::monitor_random(w, sub, true);
        if missing.is_mnar(outcome) {
            w.monitor(MonitoredNode::vector(
                format!("delta.{}", outcome.suffix()),
                2,
                NodeSupport::Real,
            ));
        }
        w.monitor(MonitoredNode::vector(
            format!("p.{}", sub.symbol()),
            2,
            NodeSupport::UnitInterval,
        ));
    }

    fragments::monitor_imputations(w, Outcome::Effect, dist_e.support().node_support());
    fragments::monitor_imputations(w, Outcome::Cost, dist_c.support().node_support());
    fragments::monitor_checks(
        w,
        [
            dist_e.support().node_support(),
            dist_c.support().node_support(),
        ],
        &["e", "c", "me", "mc"].map(str::to_string),
    );
}
