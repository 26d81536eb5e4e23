//! Pattern-mixture models: pattern-specific intercepts, Dirichlet mixture weights,
//! and identifying restrictions for the intercepts of unobserved outcomes.

use crate::inference::{MonitoredNode, NodeSupport};
use crate::models::priors::PriorRole;
use crate::models::registry::Outcome;
use crate::models::types::{MissingType, Restriction};

use super::fragments::{
    self, ModelWriter, arm_mean_predictor, dependence_term, open_arm_loop, outcome_value,
    predictor,
};
use super::selection::outcome_submodel;
use super::{CompileError, MissingPattern, ModelDimensions};

/// 1-based index of the pattern whose intercept unidentified patterns of `outcome`
/// borrow.
fn reference_pattern(
    dims: &ModelDimensions,
    restriction: Restriction,
    outcome: Outcome,
) -> Result<usize, CompileError> {
    let complete = dims.pattern_index(MissingPattern::Complete);
    let index = match restriction {
        Restriction::CompleteCase => complete,
        Restriction::AvailableCase => {
            let only_observed = match outcome {
                Outcome::Effect => MissingPattern::CostMissing,
                Outcome::Cost => MissingPattern::EffectMissing,
            };
            dims.pattern_index(only_observed).or(complete)
        }
    };
    index.ok_or(CompileError::MissingReferencePattern {
        restriction: restriction.label(),
    })
}

fn intercept_node(outcome: Outcome) -> String {
    format!("{}.p", outcome_submodel(outcome).intercept_name())
}

pub(super) fn compile(
    w: &mut ModelWriter<'_>,
    missing: MissingType,
    restriction: Restriction,
) -> Result<(), CompileError> {
    let patterns = w.dims.patterns.clone();
    if patterns.is_empty() {
        return Err(CompileError::NoPatterns);
    }
    let count = patterns.len();

    let mut references = [None, None];
    for (slot, outcome) in Outcome::BOTH.into_iter().enumerate() {
        if patterns.iter().any(|p| !p.observes(outcome)) {
            references[slot] = Some(reference_pattern(w.dims, restriction, outcome)?);
        }
    }

    for arm in 1..=2 {
        w.comment(&format!("arm {arm}"));
        open_arm_loop(w, arm);
        let d = w.data(format!("d{arm}"));
        w.line(format!("{d}[i] ~ dcat(pi.p[, {arm}])"));
        for outcome in Outcome::BOTH {
            w.data(format!("{}{arm}", outcome.data_stem()));
            let y = outcome_value(outcome, arm);
            let intercept = format!("{}[{d}[i], {arm}]", intercept_node(outcome));
            let mut linear = predictor(w, outcome_submodel(outcome), arm, Some(intercept));
            if let Some(dependence) = dependence_term(w, outcome, arm) {
                linear = format!("{linear} + {dependence}");
            }
            let nodes = fragments::outcome_likelihood(w, outcome, arm, &linear, &y);
            if w.options.ppc {
                fragments::replicate(
                    w,
                    outcome,
                    &nodes,
                    &format!("rep_{}{arm}[i]", outcome.suffix()),
                );
            }
            if w.options.loglik {
                fragments::loglik(w, outcome, arm, &nodes, &y);
            }
        }
        if w.options.loglik {
            w.line(format!(
                "loglik_p{arm}[i] <- logdensity.cat({d}[i], pi.p[, {arm}])"
            ));
        }
        w.close();
        for outcome in Outcome::BOTH {
            fragments::random_effects(w, outcome_submodel(outcome), arm, true);
        }
        w.blank();
    }

    w.open("for (t in 1:2)");
    if count > 1 {
        let weights = w.data("dir.p");
        w.line(format!("pi.p[1:{count}, t] ~ ddirch({weights}[])"));
    } else {
        w.line("pi.p[1, t] <- 1");
    }

    for (slot, outcome) in Outcome::BOTH.into_iter().enumerate() {
        let sub = outcome_submodel(outcome);
        let suffix = outcome.suffix();
        let node = intercept_node(outcome);
        let shifted = missing.is_mnar(outcome) && references[slot].is_some();

        let mut fixed_rows = Vec::new();
        for (index, pattern) in patterns.iter().enumerate() {
            let row = index + 1;
            match references[slot] {
                Some(reference) if !pattern.observes(outcome) => {
                    let shift = if shifted {
                        format!(" + Delta.{suffix}[t]")
                    } else {
                        String::new()
                    };
                    w.line(format!("{node}[{row}, t] <- {node}[{reference}, t]{shift}"));
                    fixed_rows.push(row);
                }
                _ => w.prior(PriorRole::Intercept(sub), &format!("{node}[{row}, t]")),
            }
        }
        w.parameter_with_fixed_rows(&node, vec![count, 2], PriorRole::Intercept(sub), fixed_rows);
        fragments::submodel_priors(w, sub, false, false);
        if shifted {
            let name = format!("Delta.{suffix}");
            w.prior(PriorRole::Mnar(outcome), &format!("{name}[t]"));
            w.parameter(&name, vec![2], PriorRole::Mnar(outcome));
        }

        w.open(format!("for (p in 1:{count})"));
        let linear = arm_mean_predictor(w, sub, Some(format!("{node}[p, t]")));
        w.line(format!("nu.{suffix}.p[p, t] <- {linear}"));
        let mean = w
            .distribution(outcome)
            .outcome_mean_text(&format!("nu.{suffix}.p[p, t]"), &format!("s.{suffix}[t]"));
        w.line(format!("mu.{suffix}.p[p, t] <- {mean}"));
        w.close();
        w.line(format!(
            "mu.{suffix}[t] <- inprod(pi.p[, t], mu.{suffix}.p[, t])"
        ));
    }

    for outcome in Outcome::BOTH {
        fragments::dispersion_prior(w, outcome);
    }
    fragments::dependence_priors(w);
    w.close();

    monitor(w, count, references);
    Ok(())
}

fn monitor(w: &mut ModelWriter<'_>, count: usize, references: [Option<usize>; 2]) {
    let dist_e = w.distribution(Outcome::Effect);
    let dist_c = w.distribution(Outcome::Cost);
    fragments::monitor_means(w, fragments::mean_support(dist_e), fragments::mean_support(dist_c));
    for outcome in Outcome::BOTH {
        w.monitor(MonitoredNode::matrix(
            format!("nu.{}.p", outcome.suffix()),
            count,
            2,
            NodeSupport::Real,
        ));
    }
    fragments::monitor_dispersion(w);
    for outcome in Outcome::BOTH {
        w.monitor(MonitoredNode::matrix(
            intercept_node(outcome),
            count,
            2,
            NodeSupport::Real,
        ));
        fragments::monitor_coefficients(w, outcome_submodel(outcome), false);
    }
    fragments::monitor_dependence(w);
    for outcome in Outcome::BOTH {
        fragments::monitor_random(w, outcome_submodel(outcome), false);
    }

    w.monitor(MonitoredNode::matrix("pi.p", count, 2, NodeSupport::Simplex));
    let mnar = w.config.family.missing_type();
    for (slot, outcome) in Outcome::BOTH.into_iter().enumerate() {
        if references[slot].is_some() && mnar.is_some_and(|m| m.is_mnar(outcome)) {
            w.monitor(MonitoredNode::vector(
                format!("Delta.{}", outcome.suffix()),
                2,
                NodeSupport::Real,
            ));
        }
    }

    fragments::monitor_imputations(w, Outcome::Effect, dist_e.support().node_support());
    fragments::monitor_imputations(w, Outcome::Cost, dist_c.support().node_support());
    fragments::monitor_checks(
        w,
        [
            dist_e.support().node_support(),
            dist_c.support().node_support(),
        ],
        &["e", "c", "p"].map(str::to_string),
    );
}
