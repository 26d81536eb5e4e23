//! # Trial data
//!
//! Column-oriented container for two-arm trial records with partially observed
//! effectiveness and cost outcomes, plus the formula parser used to select
//! covariates and clustering variables from it.
//!
//! # Examples
//!
//! ```
//! use missing_ce::TrialData;
//!
//! let data = TrialData::new()
//!     .with_observed("t", &[1.0, 1.0, 2.0, 2.0])
//!     .with_numeric("e", vec![Some(0.7), None, Some(0.8), Some(0.9)])
//!     .with_numeric("c", vec![Some(120.0), Some(80.0), None, Some(150.0)]);
//!
//! assert!(data.validate().is_ok());
//! let arms = data.arms("t").unwrap();
//! assert_eq!(arms.len(0), 2);
//! ```
//!
//! ```
//! use missing_ce::TrialData;
//!
//! let data = TrialData::new()
//!     .with_observed("t", &[1.0, 2.0, 3.0])
//!     .with_observed("e", &[0.1, 0.2, 0.3]);
//!
//! assert!(data.arms("t").is_err());
//! ```

use std::collections::BTreeMap;

use thiserror::Error;

pub mod formula;

pub use formula::{Formula, FormulaError, RandomTerm};

/// Errors returned when validating trial data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("trial data must contain at least one row")]
    Empty,
    #[error("column `{column}` has {len} rows; expected {rows}")]
    LengthMismatch {
        column: String,
        len: usize,
        rows: usize,
    },
    #[error("column `{0}` not found")]
    MissingColumn(String),
    #[error("column `{0}` must be numeric")]
    NotNumeric(String),
    #[error("column `{0}` contains non-finite values")]
    NonFinite(String),
    #[error("arm column `{column}` must have exactly two distinct values; found {found}")]
    ArmCardinality { column: String, found: usize },
    #[error("arm column `{column}` has {count} missing entries")]
    MissingArm { column: String, count: usize },
    #[error("covariate `{column}` has {count} missing entries; covariates must be fully observed")]
    MissingCovariate { column: String, count: usize },
    #[error("indicator column `{column}` must contain only 0, 1 or missing values")]
    InvalidIndicator { column: String },
}

/// One named column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Factor(Vec<Option<String>>),
}

impl Column {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Factor(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn missing_count(&self) -> usize {
        match self {
            Self::Numeric(values) => values.iter().filter(|value| value.is_none()).count(),
            Self::Factor(values) => values.iter().filter(|value| value.is_none()).count(),
        }
    }

    /// Label of row `row`, `None` when missing.
    #[must_use]
    pub fn label(&self, row: usize) -> Option<String> {
        match self {
            Self::Numeric(values) => values.get(row).copied().flatten().map(|v| format!("{v}")),
            Self::Factor(values) => values.get(row).cloned().flatten(),
        }
    }

    /// Distinct observed labels, sorted (numerically for numeric columns).
    #[must_use]
    pub fn levels(&self) -> Vec<String> {
        match self {
            Self::Numeric(values) => {
                let mut observed = values.iter().copied().flatten().collect::<Vec<_>>();
                observed.sort_by(f64::total_cmp);
                observed.dedup();
                observed.into_iter().map(|v| format!("{v}")).collect()
            }
            Self::Factor(values) => {
                let mut observed = values.iter().flatten().cloned().collect::<Vec<_>>();
                observed.sort();
                observed.dedup();
                observed
            }
        }
    }
}

/// Default column names for the arm, outcomes, and structural-indicator overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnNames {
    pub arm: String,
    pub effect: String,
    pub cost: String,
    pub structural_effect: String,
    pub structural_cost: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            arm: "t".to_string(),
            effect: "e".to_string(),
            cost: "c".to_string(),
            structural_effect: "d_e".to_string(),
            structural_cost: "d_c".to_string(),
        }
    }
}

/// Rows of each arm; arm 1 holds the smaller arm label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmSplit {
    pub labels: [String; 2],
    pub rows: [Vec<usize>; 2],
}

impl ArmSplit {
    /// Number of records in arm `arm` (0-based).
    #[must_use]
    pub fn len(&self, arm: usize) -> usize {
        self.rows[arm].len()
    }

    #[must_use]
    pub fn sizes(&self) -> [usize; 2] {
        [self.rows[0].len(), self.rows[1].len()]
    }

    /// Values of `column` for rows of `arm`.
    #[must_use]
    pub fn select<T: Clone>(&self, arm: usize, column: &[T]) -> Vec<T> {
        self.rows[arm].iter().map(|row| column[*row].clone()).collect()
    }
}

/// Column-oriented trial records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialData {
    columns: BTreeMap<String, Column>,
}

impl TrialData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a numeric column where `None` marks a missing value.
    #[must_use]
    pub fn with_numeric(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        self.columns.insert(name.into(), Column::Numeric(values));
        self
    }

    /// Add a fully observed numeric column.
    #[must_use]
    pub fn with_observed(self, name: impl Into<String>, values: &[f64]) -> Self {
        self.with_numeric(name, values.iter().copied().map(Some).collect())
    }

    #[must_use]
    pub fn with_factor(mut self, name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        self.columns.insert(name.into(), Column::Factor(values));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, column: Column) {
        self.columns.insert(name.into(), column);
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.columns.values().next().map_or(0, Column::len)
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Numeric values of `name`.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the column is absent or not numeric.
    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>], InputError> {
        match self.columns.get(name) {
            Some(Column::Numeric(values)) => Ok(values),
            Some(Column::Factor(_)) => Err(InputError::NotNumeric(name.to_string())),
            None => Err(InputError::MissingColumn(name.to_string())),
        }
    }

    /// Column `name`, which must exist and be fully observed.
    ///
    /// # Errors
    ///
    /// Returns `InputError::MissingCovariate` naming the column and its missing count.
    pub fn observed_column(&self, name: &str) -> Result<&Column, InputError> {
        let column = self
            .columns
            .get(name)
            .ok_or_else(|| InputError::MissingColumn(name.to_string()))?;
        let count = column.missing_count();
        if count > 0 {
            return Err(InputError::MissingCovariate {
                column: name.to_string(),
                count,
            });
        }
        Ok(column)
    }

    /// Optional 0/1 indicator column; absent columns yield `None`.
    ///
    /// # Errors
    ///
    /// Returns `InputError` when the column exists but holds other values.
    pub fn indicator(&self, name: &str) -> Result<Option<&[Option<f64>]>, InputError> {
        if !self.has_column(name) {
            return Ok(None);
        }
        let values = self.numeric(name)?;
        if values
            .iter()
            .flatten()
            .any(|value| *value != 0.0 && *value != 1.0)
        {
            return Err(InputError::InvalidIndicator {
                column: name.to_string(),
            });
        }
        Ok(Some(values))
    }

    /// Validate row counts and numeric finiteness.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if columns disagree in length or hold non-finite values.
    pub fn validate(&self) -> Result<(), InputError> {
        let rows = self.n_rows();
        if rows == 0 {
            return Err(InputError::Empty);
        }
        for (name, column) in &self.columns {
            if column.len() != rows {
                return Err(InputError::LengthMismatch {
                    column: name.clone(),
                    len: column.len(),
                    rows,
                });
            }
            if let Column::Numeric(values) = column
                && values.iter().flatten().any(|value| !value.is_finite())
            {
                return Err(InputError::NonFinite(name.clone()));
            }
        }
        Ok(())
    }

    /// Split rows by the two arm labels.
    ///
    /// # Errors
    ///
    /// Returns `InputError` if the arm column is missing, partially observed, or does
    /// not have exactly two distinct values.
    pub fn arms(&self, column: &str) -> Result<ArmSplit, InputError> {
        let arm = self
            .columns
            .get(column)
            .ok_or_else(|| InputError::MissingColumn(column.to_string()))?;
        let count = arm.missing_count();
        if count > 0 {
            return Err(InputError::MissingArm {
                column: column.to_string(),
                count,
            });
        }

        let levels = arm.levels();
        let [first, second] = levels.as_slice() else {
            return Err(InputError::ArmCardinality {
                column: column.to_string(),
                found: levels.len(),
            });
        };

        let mut rows = [Vec::new(), Vec::new()];
        for row in 0..arm.len() {
            let slot = usize::from(arm.label(row).as_deref() == Some(second.as_str()));
            rows[slot].push(row);
        }

        Ok(ArmSplit {
            labels: [first.clone(), second.clone()],
            rows,
        })
    }
}
