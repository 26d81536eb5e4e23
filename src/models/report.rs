/////////////////////////////////////////////////////////////////////////////////////////////\
//
// Coefficient extraction and tabular summaries of fitted models.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Reports
//!
//! Coefficient extraction with a selectable credible level, plus `comfy_table`
//! renderings of the economic summary, coefficients, convergence, imputations, and
//! information criteria.

use std::fmt;

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED,
};

use crate::inference::draws::element_name;
use crate::inference::RHAT_WARNING_THRESHOLD;
use crate::utils::{IntervalSummary, summarize_interval};

use super::compiler::MissingPattern;
use super::diagnostics::{InformationCriterion, ParameterDiagnostics};
use super::fit::FitResult;
use super::posterior::ImputationSummary;
use super::types::SubModel;

/// Default credible level of coefficient intervals.
pub const DEFAULT_PROB: f64 = 0.95;

/// Which regression terms [`coefficients`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RandomView {
    /// Intercepts and covariate coefficients shared by every cluster.
    #[default]
    Fixed,
    /// Random-effect hyperparameters and cluster-level values.
    Random,
}

/// Posterior summary of one regression term in one arm.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    pub submodel: SubModel,
    /// 1-based arm.
    pub arm: usize,
    /// Covariate, pattern, or cluster label.
    pub term: String,
    /// Monitored element the summary is computed from.
    pub element: String,
    pub summary: IntervalSummary,
}

struct RowSink<'a> {
    result: &'a FitResult,
    prob: f64,
    rows: Vec<CoefficientRow>,
}

impl RowSink<'_> {
    fn push(&mut self, submodel: SubModel, arm: usize, term: String, element: String) {
        if let Some(draws) = self.result.draws.element(&element) {
            self.rows.push(CoefficientRow {
                submodel,
                arm,
                term,
                element,
                summary: summarize_interval(draws, self.prob),
            });
        }
    }
}

fn pattern_label(pattern: MissingPattern) -> &'static str {
    match pattern {
        MissingPattern::Complete => "pattern 1 (complete)",
        MissingPattern::EffectMissing => "pattern 2 (e missing)",
        MissingPattern::CostMissing => "pattern 3 (c missing)",
        MissingPattern::BothMissing => "pattern 4 (both missing)",
    }
}

fn fixed_rows(sink: &mut RowSink<'_>, sub: SubModel) {
    let result = sink.result;
    let design = result.prepared.design(sub);
    let random_intercept = design
        .and_then(|d| d.random.as_ref())
        .is_some_and(|random| random.intercept);
    let pattern_node = format!("{}.p", sub.intercept_name());
    for arm in 1..=2 {
        if result.model.is_monitored(&pattern_node) {
            for (index, pattern) in result.prepared.dims.patterns.iter().enumerate() {
                sink.push(
                    sub,
                    arm,
                    format!("(Intercept) {}", pattern_label(*pattern)),
                    element_name(&pattern_node, &[index + 1, arm]),
                );
            }
        } else if random_intercept {
            let node = format!("mu.{}0", sub.random_symbol());
            sink.push(sub, arm, "(Intercept)".to_string(), element_name(&node, &[arm]));
        } else {
            sink.push(
                sub,
                arm,
                "(Intercept)".to_string(),
                element_name(sub.intercept_name(), &[arm]),
            );
        }
        if let Some(design) = design {
            for (index, name) in design.fixed_names.iter().enumerate() {
                sink.push(
                    sub,
                    arm,
                    name.clone(),
                    element_name(sub.coefficient_name(), &[index + 1, arm]),
                );
            }
        }
    }
}

fn random_rows(sink: &mut RowSink<'_>, sub: SubModel) {
    let Some(random) = sink
        .result
        .prepared
        .design(sub)
        .and_then(|d| d.random.clone())
    else {
        return;
    };
    let symbol = sub.random_symbol();
    for arm in 1..=2 {
        if random.intercept {
            sink.push(
                sub,
                arm,
                format!("sd (Intercept) | {}", random.group),
                element_name(&format!("s.{symbol}0"), &[arm]),
            );
        }
        for (slope, name) in random.slope_names.iter().enumerate() {
            sink.push(
                sub,
                arm,
                format!("mean {name} | {}", random.group),
                element_name(&format!("mu.{symbol}"), &[slope + 1, arm]),
            );
            sink.push(
                sub,
                arm,
                format!("sd {name} | {}", random.group),
                element_name(&format!("s.{symbol}"), &[slope + 1, arm]),
            );
        }
        for (cluster, label) in random.cluster_labels[arm - 1].iter().enumerate() {
            if random.intercept {
                sink.push(
                    sub,
                    arm,
                    format!("(Intercept) {}={label}", random.group),
                    element_name(&format!("{symbol}0_{arm}"), &[cluster + 1]),
                );
            }
            for (slope, name) in random.slope_names.iter().enumerate() {
                sink.push(
                    sub,
                    arm,
                    format!("{name} {}={label}", random.group),
                    element_name(&format!("{symbol}_{arm}"), &[cluster + 1, slope + 1]),
                );
            }
        }
    }
}

/// Posterior summaries of the regression terms of every sub-model in the fit.
///
/// Rows follow the sub-model order of the family, then arm, then term. Terms
/// whose nodes were not monitored are skipped.
#[must_use]
pub fn coefficients(result: &FitResult, prob: f64, view: RandomView) -> Vec<CoefficientRow> {
    let mut sink = RowSink {
        result,
        prob,
        rows: Vec::new(),
    };
    for sub in result.config.family.submodels() {
        match view {
            RandomView::Fixed => fixed_rows(&mut sink, sub),
            RandomView::Random => random_rows(&mut sink, sub),
        }
    }
    sink.rows
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}

fn number(value: f64, precision: usize) -> Cell {
    Cell::new(format!("{value:.precision$}"))
}

fn interval_cells(summary: &IntervalSummary, precision: usize) -> Vec<Cell> {
    vec![
        number(summary.mean, precision),
        number(summary.std_dev, precision),
        number(summary.lower, precision),
        number(summary.median, precision),
        number(summary.upper, precision),
    ]
}

/// Per-arm means, increments, and the ICER.
#[must_use]
pub fn summary_table(result: &FitResult) -> Table {
    let economics = &result.economics;
    let mut table = make_table(&["quantity", "mean", "sd", "lower", "median", "upper"]);
    let labels = &result.prepared.arms.labels;
    for (arm, label) in labels.iter().enumerate() {
        let mut row = vec![Cell::new(format!("mean e ({label})"))];
        row.extend(interval_cells(&economics.mean_effects[arm], 3));
        table.add_row(row);
    }
    for (arm, label) in labels.iter().enumerate() {
        let mut row = vec![Cell::new(format!("mean c ({label})"))];
        row.extend(interval_cells(&economics.mean_costs[arm], 2));
        table.add_row(row);
    }
    let mut delta_e = vec![Cell::new("delta e")];
    delta_e.extend(interval_cells(&economics.delta_e_summary, 3));
    table.add_row(delta_e);
    let mut delta_c = vec![Cell::new("delta c")];
    delta_c.extend(interval_cells(&economics.delta_c_summary, 2));
    table.add_row(delta_c);
    let mut icer = vec![Cell::new("ICER")];
    icer.extend(interval_cells(&economics.icer, 2));
    table.add_row(icer);
    table
}

/// Coefficient rows with their credible intervals.
#[must_use]
pub fn coefficient_table(rows: &[CoefficientRow]) -> Table {
    let mut table = make_table(&[
        "model", "arm", "term", "mean", "sd", "lower", "median", "upper",
    ]);
    for row in rows {
        let mut cells = vec![
            Cell::new(row.submodel.symbol()),
            Cell::new(row.arm),
            Cell::new(&row.term),
        ];
        cells.extend(interval_cells(&row.summary, 4));
        table.add_row(cells);
    }
    table
}

fn rhat_cell(rhat: f64) -> Cell {
    let cell = number(rhat, 3);
    if rhat.is_nan() || rhat > RHAT_WARNING_THRESHOLD {
        cell.fg(Color::Red).add_attribute(Attribute::Bold)
    } else {
        cell
    }
}

/// Per-element diagnostics; R-hat values above the warning threshold are
/// highlighted.
#[must_use]
pub fn convergence_table(rows: &[ParameterDiagnostics]) -> Table {
    let mut table = make_table(&["element", "mean", "lower", "upper", "rhat", "ess", "lag 1"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.element),
            number(row.summary.mean, 4),
            number(row.summary.lower, 4),
            number(row.summary.upper, 4),
            rhat_cell(row.rhat),
            number(row.ess, 0),
            number(row.lag_one, 3),
        ]);
    }
    table
}

#[must_use]
pub fn imputation_table(rows: &[ImputationSummary]) -> Table {
    let mut table = make_table(&[
        "outcome", "arm", "record", "mean", "sd", "lower", "median", "upper",
    ]);
    for row in rows {
        let mut cells = vec![
            Cell::new(row.outcome),
            Cell::new(row.arm),
            Cell::new(row.record),
        ];
        cells.extend(interval_cells(&row.summary, 3));
        table.add_row(cells);
    }
    table
}

/// Information criteria side by side; the smallest value is highlighted.
#[must_use]
pub fn information_criteria_table(rows: &[InformationCriterion]) -> Table {
    let mut table = make_table(&[
        "criterion", "scope", "value", "p_eff", "elpd", "se", "high k",
    ]);
    let best = rows
        .iter()
        .map(InformationCriterion::value)
        .fold(f64::INFINITY, f64::min);
    for row in rows {
        let value = row.value();
        let value_cell = if (value - best).abs() < 1e-12 {
            number(value, 2)
                .fg(Color::Green)
                .add_attribute(Attribute::Bold)
        } else {
            number(value, 2)
        };
        table.add_row(vec![
            Cell::new(row.method),
            Cell::new(row.scope),
            value_cell,
            number(row.estimates.effective_parameters, 2),
            number(row.estimates.elpd, 2),
            number(row.estimates.std_error, 2),
            Cell::new(row.high_pareto_k()),
        ]);
    }
    table
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} model: effects {}, costs {}",
            self.family(),
            self.config.dist_e,
            self.config.dist_c
        )?;
        writeln!(
            f,
            "{} chains x {} draws; {} imputed values",
            self.draws.chain_count(),
            self.draws.draws_per_chain(),
            self.imputations.len()
        )?;
        writeln!(f, "{}", summary_table(self))?;
        writeln!(
            f,
            "{}",
            coefficient_table(&coefficients(self, DEFAULT_PROB, RandomView::Fixed))
        )?;
        if !self.convergence.is_converged() {
            writeln!(
                f,
                "warning: {} elements with R-hat above {RHAT_WARNING_THRESHOLD}",
                self.convergence.warnings.len()
            )?;
        }
        Ok(())
    }
}
