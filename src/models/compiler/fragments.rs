//! Model-text building blocks shared by the three families.
//!
//! Node naming: per-arm data carry the arm number as a suffix (`eff1`, `X2_c`),
//! individual-level nodes are indexed by `i`, and arm-level parameters by `t`.

use std::collections::BTreeSet;

use crate::inference::{MonitoredNode, NodeSupport};
use crate::models::priors::{PriorRole, RandomPart};
use crate::models::registry::{Distribution, Link, Outcome};
use crate::models::types::{ModelConfig, SubModel};

use super::{CompileOptions, CompiledModel, ModelDimensions, ParameterNode};

const INDENT: &str = "  ";

/// Accumulates model text together with the names it references.
pub(super) struct ModelWriter<'a> {
    pub config: &'a ModelConfig,
    pub dims: &'a ModelDimensions,
    pub options: CompileOptions,
    lines: Vec<String>,
    depth: usize,
    monitored: Vec<MonitoredNode>,
    prior_roles: BTreeSet<PriorRole>,
    data_names: BTreeSet<String>,
    parameters: Vec<ParameterNode>,
}

impl<'a> ModelWriter<'a> {
    pub fn new(config: &'a ModelConfig, dims: &'a ModelDimensions, options: CompileOptions) -> Self {
        Self {
            config,
            dims,
            options,
            lines: Vec::new(),
            depth: 1,
            monitored: Vec::new(),
            prior_roles: BTreeSet::new(),
            data_names: BTreeSet::new(),
            parameters: Vec::new(),
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", INDENT.repeat(self.depth), text.as_ref()));
    }

    pub fn blank(&mut self) {
        if self.lines.last().is_some_and(|line| !line.is_empty()) {
            self.lines.push(String::new());
        }
    }

    pub fn comment(&mut self, text: &str) {
        self.line(format!("# {text}"));
    }

    /// Open a block such as `for (i in 1:N1) {`.
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(format!("{} {{", header.as_ref()));
        self.depth += 1;
    }

    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Record a data name and return it for use in text.
    pub fn data(&mut self, name: impl Into<String>) -> String {
        let name = name.into();
        self.data_names.insert(name.clone());
        name
    }

    /// Emit `node ~ <prior density>` for `role`.
    pub fn prior(&mut self, role: PriorRole, node: &str) {
        let data_name = self.data(role.data_name());
        let density = role.default_spec(self.config).density_text(&data_name);
        self.prior_roles.insert(role);
        self.line(format!("{node} ~ {density}"));
    }

    pub fn parameter(&mut self, name: &str, dims: Vec<usize>, role: PriorRole) {
        self.parameter_with_fixed_rows(name, dims, role, Vec::new());
    }

    pub fn parameter_with_fixed_rows(
        &mut self,
        name: &str,
        dims: Vec<usize>,
        role: PriorRole,
        fixed_rows: Vec<usize>,
    ) {
        if self.parameters.iter().any(|node| node.name == name) {
            return;
        }
        self.parameters.push(ParameterNode {
            name: name.to_string(),
            dims,
            role,
            fixed_rows,
        });
    }

    pub fn monitor(&mut self, node: MonitoredNode) {
        if !self.monitored.iter().any(|known| known.name == node.name) {
            self.monitored.push(node);
        }
    }

    pub fn distribution(&self, outcome: Outcome) -> Distribution {
        self.config.distribution(outcome)
    }

    pub fn finish(self) -> CompiledModel {
        let mut text = String::from("model {\n");
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("}\n");
        CompiledModel {
            text,
            monitored: self.monitored,
            prior_roles: self.prior_roles,
            data_names: self.data_names,
            parameters: self.parameters,
        }
    }
}

/// `for (i in 1:N1) {` for arm `arm` (1-based).
pub(super) fn open_arm_loop(w: &mut ModelWriter<'_>, arm: usize) {
    let n = w.data(format!("N{arm}"));
    w.open(format!("for (i in 1:{n})"));
}

pub(super) fn has_fixed_intercept(w: &ModelWriter<'_>, sub: SubModel) -> bool {
    w.dims.random_dims(sub).is_none_or(|random| !random.intercept)
}

fn has_random_intercept(w: &ModelWriter<'_>, sub: SubModel) -> bool {
    w.dims.random_dims(sub).is_some_and(|random| random.intercept)
}

fn random_slopes(w: &ModelWriter<'_>, sub: SubModel) -> usize {
    w.dims.random_dims(sub).map_or(0, |random| random.slopes)
}

/// Random-effect value node names for `sub` in `arm`: (`a0_1`, `a_1`).
pub(super) fn random_value_names(sub: SubModel, arm: usize) -> (String, String) {
    let symbol = sub.random_symbol();
    (format!("{symbol}0_{arm}"), format!("{symbol}_{arm}"))
}

/// Individual-level terms of `sub` in `arm`, intercept excluded.
pub(super) fn covariate_terms(w: &mut ModelWriter<'_>, sub: SubModel, arm: usize) -> Vec<String> {
    let symbol = sub.symbol();
    let mut terms = Vec::new();
    if w.dims.fixed_count(sub) > 0 {
        let x = w.data(format!("X{arm}_{symbol}"));
        terms.push(format!(
            "inprod({x}[i, ], {}[, {arm}])",
            sub.coefficient_name()
        ));
    }
    if w.dims.random_dims(sub).is_some() {
        let clus = w.data(format!("clus{arm}_{symbol}"));
        let (intercepts, slopes) = random_value_names(sub, arm);
        if has_random_intercept(w, sub) {
            terms.push(format!("{intercepts}[{clus}[i]]"));
        }
        if random_slopes(w, sub) > 0 {
            let z = w.data(format!("Z{arm}_{symbol}"));
            terms.push(format!("inprod({z}[i, ], {slopes}[{clus}[i], ])"));
        }
    }
    terms
}

/// Fixed intercept of `sub` for an individual in `arm`, when it has one.
pub(super) fn fixed_intercept_term(w: &ModelWriter<'_>, sub: SubModel, arm: usize) -> Option<String> {
    has_fixed_intercept(w, sub).then(|| format!("{}[{arm}]", sub.intercept_name()))
}

/// Full individual-level linear predictor.
pub(super) fn predictor(
    w: &mut ModelWriter<'_>,
    sub: SubModel,
    arm: usize,
    intercept: Option<String>,
) -> String {
    let mut terms = Vec::new();
    terms.extend(intercept);
    terms.extend(covariate_terms(w, sub, arm));
    join_terms(terms)
}

/// Arm-level linear predictor at the covariate means, written for index `t`.
pub(super) fn arm_mean_predictor(
    w: &mut ModelWriter<'_>,
    sub: SubModel,
    intercept: Option<String>,
) -> String {
    let symbol = sub.symbol();
    let mut terms = Vec::new();
    terms.extend(intercept);
    if w.dims.fixed_count(sub) > 0 {
        let means = w.data(format!("mean_cov_{symbol}"));
        terms.push(format!("inprod({means}[t, ], {}[, t])", sub.coefficient_name()));
    }
    if random_slopes(w, sub) > 0 {
        let means = w.data(format!("mean_z_{symbol}"));
        terms.push(format!(
            "inprod({means}[t, ], mu.{}[, t])",
            sub.random_symbol()
        ));
    }
    join_terms(terms)
}

/// Intercept at the arm level: the fixed intercept, or the random-intercept mean.
pub(super) fn arm_intercept(w: &ModelWriter<'_>, sub: SubModel) -> Option<String> {
    if has_fixed_intercept(w, sub) {
        Some(format!("{}[t]", sub.intercept_name()))
    } else {
        Some(format!("mu.{}0[t]", sub.random_symbol()))
    }
}

fn join_terms(terms: Vec<String>) -> String {
    if terms.is_empty() {
        "0".to_string()
    } else {
        terms.join(" + ")
    }
}

/// Priors of the regression coefficients and random-effect hyperparameters of
/// `sub`, written inside the `t` loop.
pub(super) fn submodel_priors(
    w: &mut ModelWriter<'_>,
    sub: SubModel,
    fixed_intercept: bool,
    random_intercept_mean: bool,
) {
    if fixed_intercept {
        let name = sub.intercept_name();
        w.prior(PriorRole::Intercept(sub), &format!("{name}[t]"));
        w.parameter(name, vec![2], PriorRole::Intercept(sub));
    }

    let fixed = w.dims.fixed_count(sub);
    if fixed > 0 {
        let name = sub.coefficient_name();
        w.open(format!("for (k in 1:{fixed})"));
        w.prior(PriorRole::Coefficients(sub), &format!("{name}[k, t]"));
        w.close();
        w.parameter(name, vec![fixed, 2], PriorRole::Coefficients(sub));
    }

    let symbol = sub.random_symbol();
    if has_random_intercept(w, sub) {
        let mean_role = PriorRole::RandomMean(sub, RandomPart::Intercept);
        let sd_role = PriorRole::RandomSd(sub, RandomPart::Intercept);
        if random_intercept_mean {
            w.prior(mean_role, &format!("mu.{symbol}0[t]"));
            w.parameter(&format!("mu.{symbol}0"), vec![2], mean_role);
        }
        w.prior(sd_role, &format!("s.{symbol}0[t]"));
        w.line(format!("tau.{symbol}0[t] <- 1 / pow(s.{symbol}0[t], 2)"));
        w.parameter(&format!("s.{symbol}0"), vec![2], sd_role);
    }

    let slopes = random_slopes(w, sub);
    if slopes > 0 {
        let mean_role = PriorRole::RandomMean(sub, RandomPart::Slope);
        let sd_role = PriorRole::RandomSd(sub, RandomPart::Slope);
        w.open(format!("for (k in 1:{slopes})"));
        w.prior(mean_role, &format!("mu.{symbol}[k, t]"));
        w.prior(sd_role, &format!("s.{symbol}[k, t]"));
        w.line(format!("tau.{symbol}[k, t] <- 1 / pow(s.{symbol}[k, t], 2)"));
        w.close();
        w.parameter(&format!("mu.{symbol}"), vec![slopes, 2], mean_role);
        w.parameter(&format!("s.{symbol}"), vec![slopes, 2], sd_role);
    }
}

/// Cluster-level random effects of `sub` in `arm`.
pub(super) fn random_effects(w: &mut ModelWriter<'_>, sub: SubModel, arm: usize, zero_mean: bool) {
    let Some(random) = w.dims.random_dims(sub).copied() else {
        return;
    };
    let symbol = sub.random_symbol();
    let (intercepts, slopes) = random_value_names(sub, arm);
    let clusters = w.data(format!("n_clus{arm}_{}", sub.symbol()));
    w.open(format!("for (j in 1:{clusters})"));
    if random.intercept {
        let mean = if zero_mean {
            "0".to_string()
        } else {
            format!("mu.{symbol}0[{arm}]")
        };
        w.line(format!("{intercepts}[j] ~ dnorm({mean}, tau.{symbol}0[{arm}])"));
    }
    if random.slopes > 0 {
        w.open(format!("for (k in 1:{})", random.slopes));
        w.line(format!(
            "{slopes}[j, k] ~ dnorm(mu.{symbol}[k, {arm}], tau.{symbol}[k, {arm}])"
        ));
        w.close();
    }
    w.close();
}

/// Node names of an outcome model for an individual in `arm`.
pub(super) struct OutcomeNodes {
    pub lp: String,
    pub mean: String,
    pub dispersion: String,
}

impl OutcomeNodes {
    pub fn new(dist: Distribution, outcome: Outcome, arm: usize) -> Self {
        let suffix = outcome.suffix();
        let lp = format!("lp_{suffix}{arm}[i]");
        let mean = if dist.needs_mean_node() {
            format!("m_{suffix}{arm}[i]")
        } else {
            lp.clone()
        };
        Self {
            lp,
            mean,
            dispersion: format!("s.{suffix}[{arm}]"),
        }
    }
}

/// Effect value of an individual in `arm` (`eff1[i]`).
pub(super) fn outcome_value(outcome: Outcome, arm: usize) -> String {
    format!("{}{arm}[i]", outcome.data_stem())
}

/// Dependence of costs on the centred effect of the same individual.
pub(super) fn dependence_term(w: &ModelWriter<'_>, outcome: Outcome, arm: usize) -> Option<String> {
    (outcome == Outcome::Cost && !w.config.independent).then(|| {
        format!(
            "beta_f[{arm}] * ({} - mu.e[{arm}])",
            outcome_value(Outcome::Effect, arm)
        )
    })
}

/// Linear predictor, mean node, and likelihood of `y` for an individual.
pub(super) fn outcome_likelihood(
    w: &mut ModelWriter<'_>,
    outcome: Outcome,
    arm: usize,
    linear: &str,
    y: &str,
) -> OutcomeNodes {
    let dist = w.distribution(outcome);
    let nodes = OutcomeNodes::new(dist, outcome, arm);
    w.line(format!("{} <- {linear}", nodes.lp));
    if dist.needs_mean_node() {
        w.line(format!(
            "{} <- {}",
            nodes.mean,
            dist.link().inverse_text(&nodes.lp)
        ));
    }
    w.line(dist.likelihood(y, &nodes.lp, &nodes.mean, &nodes.dispersion));
    nodes
}

/// Replicate draw of the outcome distribution, named `rep_e1[i]` unless `target`
/// overrides it.
pub(super) fn replicate(
    w: &mut ModelWriter<'_>,
    outcome: Outcome,
    nodes: &OutcomeNodes,
    target: &str,
) {
    let dist = w.distribution(outcome);
    w.line(dist.likelihood(target, &nodes.lp, &nodes.mean, &nodes.dispersion));
}

pub(super) fn loglik(
    w: &mut ModelWriter<'_>,
    outcome: Outcome,
    arm: usize,
    nodes: &OutcomeNodes,
    y: &str,
) {
    let dist = w.distribution(outcome);
    w.line(format!(
        "loglik_{}{arm}[i] <- {}",
        outcome.suffix(),
        dist.log_density(y, &nodes.lp, &nodes.mean, &nodes.dispersion)
    ));
}

/// Logistic indicator model: `p_me1[i] <- ilogit(...)` and `m_eff1[i] ~ dbern(...)`.
pub(super) fn indicator_likelihood(
    w: &mut ModelWriter<'_>,
    sub: SubModel,
    arm: usize,
    indicator: &str,
    extra: Option<String>,
) {
    let intercept = fixed_intercept_term(w, sub, arm);
    let mut linear = predictor(w, sub, arm, intercept);
    if let Some(extra) = extra {
        linear = format!("{linear} + {extra}");
    }
    let probability = format!("p_{}{arm}[i]", sub.symbol());
    w.line(format!("{probability} <- ilogit({linear})"));
    w.line(format!("{indicator} ~ dbern({probability})"));
    if w.options.loglik {
        w.line(format!(
            "loglik_{}{arm}[i] <- logdensity.bern({indicator}, {probability})",
            sub.symbol()
        ));
    }
}

/// Arm-level indicator probability `p.me[t]` at the covariate means.
pub(super) fn indicator_arm_probability(w: &mut ModelWriter<'_>, sub: SubModel) {
    let intercept = arm_intercept(w, sub);
    let linear = arm_mean_predictor(w, sub, intercept);
    w.line(format!("p.{}[t] <- ilogit({linear})", sub.symbol()));
}

pub(super) fn dispersion_prior(w: &mut ModelWriter<'_>, outcome: Outcome) {
    if w.distribution(outcome).has_dispersion() {
        let role = PriorRole::Dispersion(outcome);
        let name = format!("s.{}", outcome.suffix());
        w.prior(role, &format!("{name}[t]"));
        w.parameter(&name, vec![2], role);
    }
}

/// `beta_f[t]` prior and, for normal pairs, the implied correlation `rho[t]`.
pub(super) fn dependence_priors(w: &mut ModelWriter<'_>) {
    if w.config.independent {
        return;
    }
    w.prior(PriorRole::Dependence, "beta_f[t]");
    w.parameter("beta_f", vec![2], PriorRole::Dependence);
    if w.config.has_correlation() {
        w.line(
            "rho[t] <- beta_f[t] * s.e[t] / sqrt(pow(s.c[t], 2) + pow(beta_f[t] * s.e[t], 2))",
        );
    }
}

/// Support of the outcome-scale mean implied by the link.
pub(super) const fn mean_support(dist: Distribution) -> NodeSupport {
    match dist.link() {
        Link::Identity => NodeSupport::Real,
        Link::Log => NodeSupport::Positive,
        Link::Logit => NodeSupport::UnitInterval,
    }
}

pub(super) fn monitor_means(w: &mut ModelWriter<'_>, effect_support: NodeSupport, cost_support: NodeSupport) {
    w.monitor(MonitoredNode::vector("mu.e", 2, effect_support));
    w.monitor(MonitoredNode::vector("mu.c", 2, cost_support));
}

pub(super) fn monitor_dispersion(w: &mut ModelWriter<'_>) {
    for outcome in Outcome::BOTH {
        if w.distribution(outcome).has_dispersion() {
            w.monitor(MonitoredNode::vector(
                format!("s.{}", outcome.suffix()),
                2,
                NodeSupport::Positive,
            ));
        }
    }
}

/// Fixed intercepts and coefficients of `sub`.
pub(super) fn monitor_coefficients(w: &mut ModelWriter<'_>, sub: SubModel, intercept: bool) {
    if intercept && has_fixed_intercept(w, sub) {
        w.monitor(MonitoredNode::vector(sub.intercept_name(), 2, NodeSupport::Real));
    }
    let fixed = w.dims.fixed_count(sub);
    if fixed > 0 {
        w.monitor(MonitoredNode::matrix(
            sub.coefficient_name(),
            fixed,
            2,
            NodeSupport::Real,
        ));
    }
}

pub(super) fn monitor_dependence(w: &mut ModelWriter<'_>) {
    if w.config.independent {
        return;
    }
    w.monitor(MonitoredNode::vector("beta_f", 2, NodeSupport::Real));
    if w.config.has_correlation() {
        w.monitor(MonitoredNode::vector("rho", 2, NodeSupport::Real));
    }
}

/// Random-effect hyperparameters and cluster-level values of `sub`.
pub(super) fn monitor_random(w: &mut ModelWriter<'_>, sub: SubModel, intercept_mean: bool) {
    let Some(random) = w.dims.random_dims(sub).copied() else {
        return;
    };
    let symbol = sub.random_symbol();
    if random.intercept {
        if intercept_mean {
            w.monitor(MonitoredNode::vector(format!("mu.{symbol}0"), 2, NodeSupport::Real));
        }
        w.monitor(MonitoredNode::vector(format!("s.{symbol}0"), 2, NodeSupport::Positive));
    }
    if random.slopes > 0 {
        w.monitor(MonitoredNode::matrix(
            format!("mu.{symbol}"),
            random.slopes,
            2,
            NodeSupport::Real,
        ));
        w.monitor(MonitoredNode::matrix(
            format!("s.{symbol}"),
            random.slopes,
            2,
            NodeSupport::Positive,
        ));
    }
    for arm in 1..=2 {
        let (intercepts, slopes) = random_value_names(sub, arm);
        let clusters = random.clusters[arm - 1];
        if random.intercept {
            w.monitor(MonitoredNode::vector(intercepts, clusters, NodeSupport::Real));
        }
        if random.slopes > 0 {
            w.monitor(MonitoredNode::matrix(
                slopes,
                clusters,
                random.slopes,
                NodeSupport::Real,
            ));
        }
    }
}

/// Outcome arrays of arms with missing entries, for imputation summaries.
pub(super) fn monitor_imputations(w: &mut ModelWriter<'_>, outcome: Outcome, support: NodeSupport) {
    for arm in 1..=2 {
        if w.dims.missing_in_arm(outcome, arm - 1) > 0 {
            w.monitor(MonitoredNode::vector(
                format!("{}{arm}", outcome.data_stem()),
                w.dims.arm_sizes[arm - 1],
                support,
            ));
        }
    }
}

/// Per-arm individual vectors named `{stem}{arm}`, e.g. `rep_e1` or `loglik_me2`.
pub(super) fn monitor_per_arm(w: &mut ModelWriter<'_>, stem: &str, support: NodeSupport) {
    for arm in 1..=2 {
        w.monitor(MonitoredNode::vector(
            format!("{stem}{arm}"),
            w.dims.arm_sizes[arm - 1],
            support,
        ));
    }
}

/// Replicate and log-likelihood nodes requested by the compile options.
pub(super) fn monitor_checks(
    w: &mut ModelWriter<'_>,
    replicate_supports: [NodeSupport; 2],
    loglik_stems: &[String],
) {
    if w.options.ppc {
        for (outcome, support) in Outcome::BOTH.into_iter().zip(replicate_supports) {
            monitor_per_arm(w, &format!("rep_{}", outcome.suffix()), support);
        }
    }
    if w.options.loglik {
        for stem in loglik_stems {
            monitor_per_arm(w, &format!("loglik_{stem}"), NodeSupport::Real);
        }
    }
}
