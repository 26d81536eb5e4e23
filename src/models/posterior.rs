//! Posterior post-processing: per-draw arm means, imputed outcomes, and the
//! economic evaluation built on them.
//!
//! Every derived quantity is realized draw by draw and summarized last, so
//! incremental costs and effects keep their joint posterior structure.

use thiserror::Error;

use crate::inference::PosteriorDraws;
use crate::inference::draws::element_name;
use crate::utils::{IntervalSummary, mean, summarize_interval, usize_to_f64};

use super::binder::PreparedData;
use super::registry::{Distribution, Outcome};
use super::types::{ModelConfig, ModelFamily};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PosteriorError {
    #[error("posterior draws lack `{0}`")]
    MissingNode(String),
    #[error("willingness-to-pay grid is empty")]
    EmptyGrid,
    #[error("willingness-to-pay values must be finite and non-negative; found {0}")]
    InvalidThreshold(f64),
    #[error("interval probability must lie in (0, 1); found {0}")]
    InvalidProbability(f64),
}

fn node<'a>(draws: &'a PosteriorDraws, element: &str) -> Result<&'a [f64], PosteriorError> {
    draws
        .element(element)
        .ok_or_else(|| PosteriorError::MissingNode(element.to_string()))
}

/// Per-draw outcome-scale means of both arms.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanOutcomes {
    pub effects: [Vec<f64>; 2],
    pub costs: [Vec<f64>; 2],
}

impl MeanOutcomes {
    /// Draws of the mean of `outcome` in arm `arm` (0-based).
    #[must_use]
    pub fn arm(&self, outcome: Outcome, arm: usize) -> &[f64] {
        match outcome {
            Outcome::Effect => &self.effects[arm],
            Outcome::Cost => &self.costs[arm],
        }
    }

    /// Per-draw difference arm 2 minus arm 1.
    #[must_use]
    pub fn difference(&self, outcome: Outcome) -> Vec<f64> {
        self.arm(outcome, 1)
            .iter()
            .zip(self.arm(outcome, 0))
            .map(|(second, first)| second - first)
            .collect()
    }

    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.effects[0].len()
    }
}

/// Outcome-scale mean draws for one outcome and arm (1-based).
fn arm_mean_draws(
    config: &ModelConfig,
    draws: &PosteriorDraws,
    outcome: Outcome,
    arm: usize,
) -> Result<Vec<f64>, PosteriorError> {
    let dist = config.distribution(outcome);
    let suffix = outcome.suffix();
    let dispersion = if matches!(dist, Distribution::LogNormal) {
        Some(node(draws, &element_name(&format!("s.{suffix}"), &[arm]))?)
    } else {
        None
    };
    let continuous = |linear: f64, draw: usize| {
        dist.outcome_mean(linear, dispersion.map(|s| s[draw]))
    };

    match config.family {
        ModelFamily::Pattern { .. } => {
            let weights = draws.elements_of("pi.p").len() / 2;
            let components = (1..=weights)
                .map(|pattern| {
                    Ok((
                        node(draws, &element_name("pi.p", &[pattern, arm]))?,
                        node(
                            draws,
                            &element_name(&format!("nu.{suffix}.p"), &[pattern, arm]),
                        )?,
                    ))
                })
                .collect::<Result<Vec<_>, PosteriorError>>()?;
            if components.is_empty() {
                return Err(PosteriorError::MissingNode("pi.p".to_string()));
            }
            Ok((0..draws.total_draws())
                .map(|draw| {
                    components
                        .iter()
                        .map(|(weight, linear)| weight[draw] * continuous(linear[draw], draw))
                        .sum()
                })
                .collect())
        }
        family => {
            let linear = node(draws, &element_name(&format!("nu.{suffix}"), &[arm]))?;
            let structural = match family.structural_value(outcome) {
                Some(value) => {
                    let symbol = format!("p.s{suffix}");
                    Some((value, node(draws, &element_name(&symbol, &[arm]))?))
                }
                None => None,
            };
            Ok((0..draws.total_draws())
                .map(|draw| {
                    let mean = continuous(linear[draw], draw);
                    match structural {
                        Some((value, p)) => p[draw].mul_add(value - mean, mean),
                        None => mean,
                    }
                })
                .collect())
        }
    }
}

/// Realize the per-arm mean effects and costs at every draw.
///
/// Means are rebuilt from link-scale draws through the distribution registry:
/// hurdle outcomes mix with the structural probability, and pattern-mixture
/// outcomes weight per-pattern means by `pi.p` at the same draw.
///
/// # Errors
///
/// Returns `PosteriorError::MissingNode` when a required node was not monitored.
pub fn mean_outcomes(
    config: &ModelConfig,
    draws: &PosteriorDraws,
) -> Result<MeanOutcomes, PosteriorError> {
    let per_arm = |outcome| -> Result<[Vec<f64>; 2], PosteriorError> {
        Ok([
            arm_mean_draws(config, draws, outcome, 1)?,
            arm_mean_draws(config, draws, outcome, 2)?,
        ])
    };
    Ok(MeanOutcomes {
        effects: per_arm(Outcome::Effect)?,
        costs: per_arm(Outcome::Cost)?,
    })
}

/// Draws of one missing outcome value.
#[derive(Debug, Clone, PartialEq)]
pub struct ImputedValue {
    pub outcome: Outcome,
    /// 1-based arm.
    pub arm: usize,
    /// 1-based position within the arm, as indexed in the model text.
    pub position: usize,
    /// 0-based row of the record in the trial data.
    pub record: usize,
    pub draws: Vec<f64>,
}

/// Posterior summary of one imputed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImputationSummary {
    pub outcome: Outcome,
    pub arm: usize,
    pub record: usize,
    pub summary: IntervalSummary,
}

/// Imputed-value draws for every missing outcome entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Imputations {
    values: Vec<ImputedValue>,
}

impl Imputations {
    /// Collect draws of every missing entry from the monitored outcome arrays.
    ///
    /// # Errors
    ///
    /// Returns `PosteriorError::MissingNode` when an outcome array with missing
    /// entries was not monitored.
    pub fn extract(
        prepared: &PreparedData,
        draws: &PosteriorDraws,
    ) -> Result<Self, PosteriorError> {
        let mut values = Vec::new();
        for outcome in Outcome::BOTH {
            for arm in 0..2 {
                let stem = format!("{}{}", outcome.data_stem(), arm + 1);
                for (index, value) in prepared.outcome(outcome, arm).iter().enumerate() {
                    if value.is_some() {
                        continue;
                    }
                    let element = element_name(&stem, &[index + 1]);
                    values.push(ImputedValue {
                        outcome,
                        arm: arm + 1,
                        position: index + 1,
                        record: prepared.arms.rows[arm][index],
                        draws: node(draws, &element)?.to_vec(),
                    });
                }
            }
        }
        Ok(Self { values })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImputedValue> {
        self.values.iter()
    }

    /// Imputed values filtered by outcome and 1-based arm.
    pub fn filter(
        &self,
        outcome: Option<Outcome>,
        arm: Option<usize>,
    ) -> impl Iterator<Item = &ImputedValue> {
        self.values.iter().filter(move |value| {
            outcome.is_none_or(|o| o == value.outcome) && arm.is_none_or(|a| a == value.arm)
        })
    }

    #[must_use]
    pub fn summaries(
        &self,
        outcome: Option<Outcome>,
        arm: Option<usize>,
        prob: f64,
    ) -> Vec<ImputationSummary> {
        self.filter(outcome, arm)
            .map(|value| ImputationSummary {
                outcome: value.outcome,
                arm: value.arm,
                record: value.record,
                summary: summarize_interval(&value.draws, prob),
            })
            .collect()
    }

    /// Outcome values of one arm (0-based) with missing entries replaced by their
    /// posterior mean.
    #[must_use]
    pub fn completed(&self, prepared: &PreparedData, outcome: Outcome, arm: usize) -> Vec<f64> {
        let mut filled = prepared
            .outcome(outcome, arm)
            .iter()
            .map(|value| value.unwrap_or(f64::NAN))
            .collect::<Vec<_>>();
        for value in self.filter(Some(outcome), Some(arm + 1)) {
            if let Some(slot) = filled.get_mut(value.position - 1) {
                *slot = mean(&value.draws);
            }
        }
        filled
    }
}

/// Settings for the economic evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicOptions {
    /// Willingness-to-pay thresholds, per unit of effect.
    pub wtp: Vec<f64>,
    /// Mass of the reported credible intervals.
    pub prob: f64,
}

impl Default for EconomicOptions {
    fn default() -> Self {
        Self {
            wtp: Self::grid(50_000.0, 501),
            prob: 0.95,
        }
    }
}

impl EconomicOptions {
    /// `points` equally spaced thresholds from 0 to `max`.
    #[must_use]
    pub fn grid(max: f64, points: usize) -> Vec<f64> {
        match points {
            0 => Vec::new(),
            1 => vec![0.0],
            _ => {
                let step = max / usize_to_f64(points - 1);
                (0..points).map(|i| usize_to_f64(i) * step).collect()
            }
        }
    }

    #[must_use]
    pub fn with_wtp(mut self, wtp: Vec<f64>) -> Self {
        self.wtp = wtp;
        self
    }

    #[must_use]
    pub const fn with_prob(mut self, prob: f64) -> Self {
        self.prob = prob;
        self
    }

    /// # Errors
    ///
    /// Returns `PosteriorError` for an empty or invalid grid or interval mass.
    pub fn validate(&self) -> Result<(), PosteriorError> {
        if self.wtp.is_empty() {
            return Err(PosteriorError::EmptyGrid);
        }
        if let Some(bad) = self.wtp.iter().find(|k| !k.is_finite() || **k < 0.0) {
            return Err(PosteriorError::InvalidThreshold(*bad));
        }
        if !(self.prob > 0.0 && self.prob < 1.0) {
            return Err(PosteriorError::InvalidProbability(self.prob));
        }
        Ok(())
    }
}

/// One draw on the cost-effectiveness plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanePoint {
    pub delta_e: f64,
    pub delta_c: f64,
}

/// Share of draws in each quadrant of the cost-effectiveness plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadrantShares {
    /// More effective and more costly.
    pub north_east: f64,
    /// Less effective and more costly.
    pub north_west: f64,
    /// More effective and less costly.
    pub south_east: f64,
    /// Less effective and less costly.
    pub south_west: f64,
}

/// Incremental analysis of arm 2 against arm 1.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomicEvaluation {
    pub mean_effects: [IntervalSummary; 2],
    pub mean_costs: [IntervalSummary; 2],
    pub delta_e: Vec<f64>,
    pub delta_c: Vec<f64>,
    pub delta_e_summary: IntervalSummary,
    pub delta_c_summary: IntervalSummary,
    /// `delta_c / delta_e` per draw.
    pub icer_draws: Vec<f64>,
    /// Summary of the finite ICER draws.
    pub icer: IntervalSummary,
    /// Draws with zero incremental effect, where the ratio is undefined.
    pub icer_undefined: usize,
    pub wtp: Vec<f64>,
    /// Expected incremental benefit at each threshold.
    pub eib: Vec<f64>,
    /// Probability that arm 2 is cost-effective at each threshold.
    pub ceac: Vec<f64>,
}

impl EconomicEvaluation {
    pub fn plane(&self) -> impl Iterator<Item = PlanePoint> + '_ {
        self.delta_e
            .iter()
            .zip(&self.delta_c)
            .map(|(delta_e, delta_c)| PlanePoint {
                delta_e: *delta_e,
                delta_c: *delta_c,
            })
    }

    #[must_use]
    pub fn quadrants(&self) -> QuadrantShares {
        let total = usize_to_f64(self.delta_e.len().max(1));
        let share = |test: fn(&PlanePoint) -> bool| {
            usize_to_f64(self.plane().filter(|point| test(point)).count()) / total
        };
        QuadrantShares {
            north_east: share(|p| p.delta_e > 0.0 && p.delta_c > 0.0),
            north_west: share(|p| p.delta_e <= 0.0 && p.delta_c > 0.0),
            south_east: share(|p| p.delta_e > 0.0 && p.delta_c <= 0.0),
            south_west: share(|p| p.delta_e <= 0.0 && p.delta_c <= 0.0),
        }
    }

    /// Posterior probability that arm 2 is cost-effective at threshold `k`.
    #[must_use]
    pub fn probability_cost_effective(&self, k: f64) -> f64 {
        probability_cost_effective(&self.delta_e, &self.delta_c, k)
    }

    #[must_use]
    pub fn expected_incremental_benefit(&self, k: f64) -> f64 {
        expected_incremental_benefit(&self.delta_e, &self.delta_c, k)
    }

    /// Lowest threshold on the grid where the acceptability curve reaches `level`.
    #[must_use]
    pub fn threshold_for(&self, level: f64) -> Option<f64> {
        self.wtp
            .iter()
            .zip(&self.ceac)
            .find(|(_, p)| **p >= level)
            .map(|(k, _)| *k)
    }

    /// First grid threshold at which expected incremental benefit turns positive.
    #[must_use]
    pub fn break_even(&self) -> Option<f64> {
        self.wtp
            .iter()
            .zip(&self.eib)
            .find(|(_, eib)| **eib > 0.0)
            .map(|(k, _)| *k)
    }
}

fn incremental_benefit(delta_e: f64, delta_c: f64, k: f64) -> f64 {
    k.mul_add(delta_e, -delta_c)
}

fn probability_cost_effective(delta_e: &[f64], delta_c: &[f64], k: f64) -> f64 {
    if delta_e.is_empty() {
        return f64::NAN;
    }
    let positive = delta_e
        .iter()
        .zip(delta_c)
        .filter(|(e, c)| incremental_benefit(**e, **c, k) > 0.0)
        .count();
    usize_to_f64(positive) / usize_to_f64(delta_e.len())
}

fn expected_incremental_benefit(delta_e: &[f64], delta_c: &[f64], k: f64) -> f64 {
    let benefits = delta_e
        .iter()
        .zip(delta_c)
        .map(|(e, c)| incremental_benefit(*e, *c, k))
        .collect::<Vec<_>>();
    mean(&benefits)
}

/// Incremental costs, effects and ICER of arm 2 over arm 1, with the
/// acceptability curve and expected incremental benefit over the threshold grid.
///
/// # Errors
///
/// Returns `PosteriorError` for invalid options.
pub fn evaluate(
    means: &MeanOutcomes,
    options: &EconomicOptions,
) -> Result<EconomicEvaluation, PosteriorError> {
    options.validate()?;
    let prob = options.prob;
    let delta_e = means.difference(Outcome::Effect);
    let delta_c = means.difference(Outcome::Cost);

    let icer_draws = delta_e
        .iter()
        .zip(&delta_c)
        .map(|(e, c)| c / e)
        .collect::<Vec<_>>();
    let finite = icer_draws
        .iter()
        .copied()
        .filter(|ratio| ratio.is_finite())
        .collect::<Vec<_>>();

    let ceac = options
        .wtp
        .iter()
        .map(|k| probability_cost_effective(&delta_e, &delta_c, *k))
        .collect();
    let eib = options
        .wtp
        .iter()
        .map(|k| expected_incremental_benefit(&delta_e, &delta_c, *k))
        .collect();

    Ok(EconomicEvaluation {
        mean_effects: [0, 1].map(|arm| summarize_interval(&means.effects[arm], prob)),
        mean_costs: [0, 1].map(|arm| summarize_interval(&means.costs[arm], prob)),
        delta_e_summary: summarize_interval(&delta_e, prob),
        delta_c_summary: summarize_interval(&delta_c, prob),
        icer: summarize_interval(&finite, prob),
        icer_undefined: icer_draws.len() - finite.len(),
        icer_draws,
        delta_e,
        delta_c,
        wtp: options.wtp.clone(),
        eib,
        ceac,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::{MissingType, Restriction, StructuralType};
    use approx::assert_relative_eq;

    fn arena(elements: &[(&str, Vec<f64>)]) -> PosteriorDraws {
        let per_chain = elements.first().map_or(0, |(_, values)| values.len());
        let mut draws = PosteriorDraws::new(1, per_chain);
        for (name, values) in elements {
            draws
                .push_element(*name, std::slice::from_ref(values))
                .expect("consistent arena");
        }
        draws
    }

    fn means(effects: [Vec<f64>; 2], costs: [Vec<f64>; 2]) -> MeanOutcomes {
        MeanOutcomes { effects, costs }
    }

    #[test]
    fn selection_means_invert_the_link() {
        let config = ModelConfig::new(
            Distribution::Beta,
            Distribution::Gamma,
            ModelFamily::Selection {
                missing: MissingType::Mar,
            },
        );
        let draws = arena(&[
            ("nu.e[1]", vec![0.0, 1.0]),
            ("nu.e[2]", vec![0.5, -0.5]),
            ("nu.c[1]", vec![6.0, 6.5]),
            ("nu.c[2]", vec![7.0, 7.5]),
        ]);
        let means = mean_outcomes(&config, &draws).expect("means");
        assert_relative_eq!(means.effects[0][0], 0.5);
        assert_relative_eq!(means.costs[1][1], 7.5f64.exp(), epsilon = 1.0e-9);
        for value in &means.effects[1] {
            assert!(*value > 0.0 && *value < 1.0);
        }
    }

    #[test]
    fn lognormal_means_use_the_dispersion_draw() {
        let config = ModelConfig::new(
            Distribution::Normal,
            Distribution::LogNormal,
            ModelFamily::Selection {
                missing: MissingType::Mar,
            },
        );
        let draws = arena(&[
            ("nu.e[1]", vec![0.1]),
            ("nu.e[2]", vec![0.2]),
            ("nu.c[1]", vec![5.0]),
            ("nu.c[2]", vec![5.0]),
            ("s.c[1]", vec![0.5]),
            ("s.c[2]", vec![1.0]),
        ]);
        let means = mean_outcomes(&config, &draws).expect("means");
        assert_relative_eq!(means.costs[0][0], (5.0f64 + 0.125).exp(), epsilon = 1.0e-9);
        assert_relative_eq!(means.costs[1][0], (5.0f64 + 0.5).exp(), epsilon = 1.0e-9);
    }

    #[test]
    fn hurdle_means_mix_with_structural_probability() {
        let config = ModelConfig::new(
            Distribution::Normal,
            Distribution::Gamma,
            ModelFamily::Hurdle {
                structural: StructuralType::Scar,
                se: Some(1.0),
                sc: None,
            },
        );
        let draws = arena(&[
            ("nu.e[1]", vec![0.6]),
            ("nu.e[2]", vec![0.8]),
            ("nu.c[1]", vec![0.0]),
            ("nu.c[2]", vec![0.0]),
            ("p.se[1]", vec![0.25]),
            ("p.se[2]", vec![0.5]),
        ]);
        let means = mean_outcomes(&config, &draws).expect("means");
        assert_relative_eq!(means.effects[0][0], 0.7, epsilon = 1.0e-12);
        assert_relative_eq!(means.effects[1][0], 0.9, epsilon = 1.0e-12);
        assert_relative_eq!(means.costs[0][0], 1.0, epsilon = 1.0e-12);
    }

    #[test]
    fn pattern_means_weight_components_at_the_same_draw() {
        let config = ModelConfig::new(
            Distribution::Normal,
            Distribution::Normal,
            ModelFamily::Pattern {
                missing: MissingType::Mar,
                restriction: Restriction::CompleteCase,
            },
        );
        let draws = arena(&[
            ("pi.p[1,1]", vec![0.2, 0.9]),
            ("pi.p[2,1]", vec![0.8, 0.1]),
            ("pi.p[1,2]", vec![0.5, 0.5]),
            ("pi.p[2,2]", vec![0.5, 0.5]),
            ("nu.e.p[1,1]", vec![1.0, 1.0]),
            ("nu.e.p[2,1]", vec![2.0, 2.0]),
            ("nu.e.p[1,2]", vec![0.0, 0.0]),
            ("nu.e.p[2,2]", vec![4.0, 4.0]),
            ("nu.c.p[1,1]", vec![10.0, 10.0]),
            ("nu.c.p[2,1]", vec![10.0, 10.0]),
            ("nu.c.p[1,2]", vec![10.0, 10.0]),
            ("nu.c.p[2,2]", vec![20.0, 20.0]),
        ]);
        let means = mean_outcomes(&config, &draws).expect("means");
        assert_relative_eq!(means.effects[0][0], 1.8, epsilon = 1.0e-12);
        assert_relative_eq!(means.effects[0][1], 1.1, epsilon = 1.0e-12);
        assert_relative_eq!(means.effects[1][0], 2.0, epsilon = 1.0e-12);
        assert_relative_eq!(means.costs[1][1], 15.0, epsilon = 1.0e-12);
    }

    #[test]
    fn missing_nodes_are_reported_by_name() {
        let config = ModelConfig::new(
            Distribution::Normal,
            Distribution::Normal,
            ModelFamily::Selection {
                missing: MissingType::Mar,
            },
        );
        let draws = arena(&[("nu.e[1]", vec![0.0])]);
        let err = mean_outcomes(&config, &draws).expect_err("incomplete draws");
        assert_eq!(err, PosteriorError::MissingNode("nu.e[2]".to_string()));
    }

    #[test]
    fn icer_is_summarized_per_draw() {
        let means = means(
            [vec![0.0, 0.0], vec![1.0, 4.0]],
            [vec![0.0, 0.0], vec![10.0, 4.0]],
        );
        let evaluation = evaluate(&means, &EconomicOptions::default()).expect("evaluation");
        assert_eq!(evaluation.icer_draws, vec![10.0, 1.0]);
        assert_relative_eq!(evaluation.icer.mean, 5.5);
        let ratio_of_means = 7.0 / 2.5;
        assert!((evaluation.icer.mean - ratio_of_means).abs() > 1.0);
    }

    #[test]
    fn zero_incremental_effect_leaves_ratio_undefined() {
        let means = means([vec![1.0, 1.0], vec![1.0, 2.0]], [vec![0.0, 0.0], vec![5.0, 5.0]]);
        let evaluation = evaluate(&means, &EconomicOptions::default()).expect("evaluation");
        assert_eq!(evaluation.icer_undefined, 1);
        assert_relative_eq!(evaluation.icer.mean, 5.0);
    }

    #[test]
    fn acceptability_curve_counts_positive_net_benefit() {
        let means = means(
            [vec![0.0; 4], vec![0.1, 0.1, -0.1, 0.2]],
            [vec![0.0; 4], vec![150.0, 300.0, -50.0, 100.0]],
        );
        let options = EconomicOptions::default().with_wtp(vec![0.0, 1_000.0, 2_000.0]);
        let evaluation = evaluate(&means, &options).expect("evaluation");
        assert_relative_eq!(evaluation.ceac[0], 0.25);
        assert_relative_eq!(evaluation.ceac[1], 0.25);
        assert_relative_eq!(evaluation.ceac[2], 0.5);
        assert_relative_eq!(evaluation.eib[0], -137.5, epsilon = 1.0e-9);
        assert_relative_eq!(evaluation.eib[2], 25.0, epsilon = 1.0e-9);
        assert_eq!(evaluation.threshold_for(0.5), Some(2_000.0));
        assert_eq!(evaluation.break_even(), Some(2_000.0));
    }

    #[test]
    fn quadrant_shares_sum_to_one() {
        let means = means(
            [vec![0.0; 4], vec![0.1, -0.1, 0.1, -0.1]],
            [vec![0.0; 4], vec![1.0, 1.0, -1.0, -1.0]],
        );
        let evaluation = evaluate(&means, &EconomicOptions::default()).expect("evaluation");
        let shares = evaluation.quadrants();
        assert_relative_eq!(shares.north_east, 0.25);
        assert_relative_eq!(
            shares.north_east + shares.north_west + shares.south_east + shares.south_west,
            1.0
        );
    }

    #[test]
    fn default_grid_spans_zero_to_fifty_thousand() {
        let options = EconomicOptions::default();
        assert_eq!(options.wtp.len(), 501);
        assert_relative_eq!(options.wtp[1], 100.0);
        assert_relative_eq!(options.wtp[500], 50_000.0);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let means = means([vec![0.0], vec![0.0]], [vec![0.0], vec![0.0]]);
        let empty = EconomicOptions::default().with_wtp(Vec::new());
        assert_eq!(evaluate(&means, &empty), Err(PosteriorError::EmptyGrid));
        let negative = EconomicOptions::default().with_wtp(vec![-1.0]);
        assert_eq!(
            evaluate(&means, &negative),
            Err(PosteriorError::InvalidThreshold(-1.0))
        );
        let prob = EconomicOptions::default().with_prob(1.0);
        assert_eq!(
            evaluate(&means, &prob),
            Err(PosteriorError::InvalidProbability(1.0))
        );
    }
}
