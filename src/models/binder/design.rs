//! Design matrices: covariate expansion, per-arm splits, covariate means, and
//! cluster relabelling for random effects.

use faer::Mat;

use crate::input::{ArmSplit, Column, Formula, TrialData};
use crate::utils::{column_means, select_rows};

use super::BindingError;

/// Covariate columns over all rows, after expanding factors into indicators.
#[derive(Debug, Clone)]
pub struct ExpandedTerms {
    pub names: Vec<String>,
    pub matrix: Mat<f64>,
}

/// Expand `terms` into numeric columns.
///
/// Numeric columns enter as they are. Factor columns contribute one indicator per
/// level except the first in sorted order, named `{column}{level}`.
///
/// # Errors
///
/// Returns `BindingError` for absent or partially observed covariates.
pub fn expand_terms(data: &TrialData, terms: &[&str]) -> Result<ExpandedTerms, BindingError> {
    let rows = data.n_rows();
    let mut names = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    for term in terms {
        let column = data.observed_column(term)?;
        match column {
            Column::Numeric(values) => {
                names.push((*term).to_string());
                columns.push(values.iter().map(|v| v.unwrap_or(f64::NAN)).collect());
            }
            Column::Factor(_) => {
                for level in column.levels().into_iter().skip(1) {
                    let indicator = (0..rows)
                        .map(|row| {
                            if column.label(row).as_deref() == Some(level.as_str()) {
                                1.0
                            } else {
                                0.0
                            }
                        })
                        .collect();
                    names.push(format!("{term}{level}"));
                    columns.push(indicator);
                }
            }
        }
    }

    let matrix = Mat::from_fn(rows, columns.len(), |row, col| columns[col][row]);
    Ok(ExpandedTerms { names, matrix })
}

/// Random-effects design of one sub-model.
#[derive(Debug, Clone)]
pub struct RandomDesign {
    pub group: String,
    pub intercept: bool,
    pub slope_names: Vec<String>,
    /// Slope covariates per arm.
    pub slopes: [Mat<f64>; 2],
    /// Arm-by-slope covariate means.
    pub slope_means: Mat<f64>,
    /// 1-based cluster index of every record, per arm.
    pub clusters: [Vec<usize>; 2],
    /// Group label of each cluster index, per arm.
    pub cluster_labels: [Vec<String>; 2],
}

/// Fixed and random design of one sub-model.
#[derive(Debug, Clone)]
pub struct SubModelDesign {
    pub fixed_names: Vec<String>,
    /// Fixed covariates per arm, intercept excluded.
    pub fixed: [Mat<f64>; 2],
    /// Arm-by-covariate means.
    pub fixed_means: Mat<f64>,
    pub random: Option<RandomDesign>,
}

impl SubModelDesign {
    #[must_use]
    pub fn fixed_count(&self) -> usize {
        self.fixed_names.len()
    }
}

fn split_by_arm(matrix: &Mat<f64>, arms: &ArmSplit) -> ([Mat<f64>; 2], Mat<f64>) {
    let split = [
        select_rows(matrix, &arms.rows[0]),
        select_rows(matrix, &arms.rows[1]),
    ];
    let means_by_arm = [column_means(&split[0]), column_means(&split[1])];
    let means = Mat::from_fn(2, matrix.ncols(), |arm, col| means_by_arm[arm][col]);
    (split, means)
}

/// Relabel group membership to consecutive 1-based indices within each arm.
fn relabel_clusters(
    data: &TrialData,
    group: &str,
    arms: &ArmSplit,
) -> Result<([Vec<usize>; 2], [Vec<String>; 2]), BindingError> {
    let column = data.observed_column(group)?;
    let mut clusters = [Vec::new(), Vec::new()];
    let mut labels = [Vec::new(), Vec::new()];

    for arm in 0..2 {
        let mut arm_labels = arms.rows[arm]
            .iter()
            .filter_map(|row| column.label(*row))
            .collect::<Vec<_>>();
        arm_labels.sort();
        arm_labels.dedup();

        clusters[arm] = arms.rows[arm]
            .iter()
            .map(|row| {
                let label = column.label(*row).unwrap_or_default();
                arm_labels
                    .binary_search(&label)
                    .map(|index| index + 1)
                    .map_err(|_| BindingError::Cluster(group.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        labels[arm] = arm_labels;
    }
    Ok((clusters, labels))
}

/// Build the design of one sub-model.
///
/// With `intercept_only` the formula's covariates and random effects are ignored.
///
/// # Errors
///
/// Returns `BindingError` when covariates or grouping columns are unusable.
pub fn build_design(
    data: &TrialData,
    arms: &ArmSplit,
    formula: &Formula,
    intercept_only: bool,
) -> Result<SubModelDesign, BindingError> {
    let fixed_terms = if intercept_only {
        Vec::new()
    } else {
        formula.fixed_terms()
    };
    let expanded = expand_terms(data, &fixed_terms)?;
    let (fixed, fixed_means) = split_by_arm(&expanded.matrix, arms);

    let random = match (&formula.random, intercept_only) {
        (Some(term), false) => {
            let slope_terms = term.slopes.iter().map(String::as_str).collect::<Vec<_>>();
            let slopes = expand_terms(data, &slope_terms)?;
            let (slope_split, slope_means) = split_by_arm(&slopes.matrix, arms);
            let (clusters, cluster_labels) = relabel_clusters(data, &term.group, arms)?;
            Some(RandomDesign {
                group: term.group.clone(),
                intercept: term.intercept,
                slope_names: slopes.names,
                slopes: slope_split,
                slope_means,
                clusters,
                cluster_labels,
            })
        }
        _ => None,
    };

    Ok(SubModelDesign {
        fixed_names: expanded.names,
        fixed,
        fixed_means,
        random,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn trial() -> TrialData {
        TrialData::new()
            .with_observed("t", &[1.0, 1.0, 1.0, 2.0, 2.0])
            .with_observed("age", &[30.0, 40.0, 50.0, 60.0, 70.0])
            .with_factor(
                "site",
                ["b", "a", "c", "a", "a"]
                    .into_iter()
                    .map(|s| Some(s.to_string()))
                    .collect(),
            )
    }

    #[test]
    fn factors_expand_to_indicators_dropping_first_level() {
        let data = trial();
        let expanded = expand_terms(&data, &["age", "site"]).expect("expands");
        assert_eq!(expanded.names, vec!["age", "siteb", "sitec"]);
        assert_relative_eq!(expanded.matrix[(0, 1)], 1.0);
        assert_relative_eq!(expanded.matrix[(1, 1)], 0.0);
        assert_relative_eq!(expanded.matrix[(2, 2)], 1.0);
    }

    #[test]
    fn partially_observed_covariates_are_rejected() {
        let data = trial().with_numeric("bmi", vec![Some(1.0), None, Some(2.0), Some(3.0), None]);
        let err = expand_terms(&data, &["bmi"]).expect_err("missing covariate");
        assert!(err.to_string().contains("bmi"));
    }

    #[test]
    fn design_splits_by_arm_with_means() {
        let data = trial();
        let arms = data.arms("t").expect("two arms");
        let formula = Formula::parse("e ~ age").expect("formula");
        let design = build_design(&data, &arms, &formula, false).expect("design");
        assert_eq!(design.fixed_count(), 1);
        assert_eq!(design.fixed[0].nrows(), 3);
        assert_eq!(design.fixed[1].nrows(), 2);
        assert_relative_eq!(design.fixed_means[(0, 0)], 40.0);
        assert_relative_eq!(design.fixed_means[(1, 0)], 65.0);
    }

    #[test]
    fn clusters_are_relabelled_within_each_arm() {
        let data = trial();
        let arms = data.arms("t").expect("two arms");
        let formula = Formula::parse("e ~ (1 | site)").expect("formula");
        let design = build_design(&data, &arms, &formula, false).expect("design");
        let random = design.random.expect("random block");
        assert_eq!(random.clusters[0], vec![2, 1, 3]);
        assert_eq!(random.clusters[1], vec![1, 1]);
        assert_eq!(random.cluster_labels[1], vec!["a".to_string()]);
    }

    #[test]
    fn intercept_only_ignores_formula_terms() {
        let data = trial();
        let arms = data.arms("t").expect("two arms");
        let formula = Formula::parse("se ~ age + (1 | site)").expect("formula");
        let design = build_design(&data, &arms, &formula, true).expect("design");
        assert_eq!(design.fixed_count(), 0);
        assert!(design.random.is_none());
    }
}
