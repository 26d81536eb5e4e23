//! The boundary between compiled models and an external MCMC engine.

use std::collections::BTreeMap;
use std::path::PathBuf;

use faer::Mat;
use thiserror::Error;

use super::convergence::ConvergenceSummary;
use super::draws::{PosteriorDraws, element_name};
use super::{InferenceError, McmcConfig};

/// Errors raised while driving an external sampler.
///
/// Sampler diagnostics are carried verbatim; nothing is retried.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("failed to prepare sampler files in {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("sampler exited with {status}:\n{output}")]
    Failed { status: String, output: String },
    #[error("malformed sampler output: {0}")]
    MalformedOutput(String),
    #[error("sampler output has no draws for monitored element `{0}`")]
    MissingElement(String),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Admissible values of a monitored node, used to check and simulate draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSupport {
    Real,
    Positive,
    NonNegative,
    /// Open unit interval.
    UnitInterval,
    /// Columns of a matrix node each sum to one.
    Simplex,
    Binary,
    Count,
}

impl NodeSupport {
    #[must_use]
    pub fn contains(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self {
            Self::Real => true,
            Self::Positive => value > 0.0,
            Self::NonNegative => value >= 0.0,
            Self::UnitInterval => value > 0.0 && value < 1.0,
            Self::Simplex => (0.0..=1.0).contains(&value),
            Self::Binary => value == 0.0 || value == 1.0,
            Self::Count => value >= 0.0 && value.fract() == 0.0,
        }
    }
}

/// A node the sampler must record, with its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredNode {
    pub name: String,
    /// Empty for scalars.
    pub dims: Vec<usize>,
    pub support: NodeSupport,
}

impl MonitoredNode {
    #[must_use]
    pub fn scalar(name: impl Into<String>, support: NodeSupport) -> Self {
        Self {
            name: name.into(),
            dims: Vec::new(),
            support,
        }
    }

    #[must_use]
    pub fn vector(name: impl Into<String>, len: usize, support: NodeSupport) -> Self {
        Self {
            name: name.into(),
            dims: vec![len],
            support,
        }
    }

    #[must_use]
    pub fn matrix(name: impl Into<String>, rows: usize, cols: usize, support: NodeSupport) -> Self {
        Self {
            name: name.into(),
            dims: vec![rows, cols],
            support,
        }
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Element names with the first index varying fastest.
    #[must_use]
    pub fn element_names(&self) -> Vec<String> {
        if self.dims.is_empty() {
            return vec![self.name.clone()];
        }
        let total = self.element_count();
        let mut names = Vec::with_capacity(total);
        let mut indices = vec![1; self.dims.len()];
        for _ in 0..total {
            names.push(element_name(&self.name, &indices));
            for (position, dim) in self.dims.iter().enumerate() {
                if indices[position] < *dim {
                    indices[position] += 1;
                    break;
                }
                indices[position] = 1;
            }
        }
        names
    }
}

/// A value passed to the sampler as data or as an initial value.
#[derive(Debug, Clone)]
pub enum DataValue {
    Scalar(f64),
    /// `None` entries are unknown to the sampler (`NA`).
    Vector(Vec<Option<f64>>),
    Matrix(Mat<f64>),
    /// Column-major array whose `None` entries are left to the sampler.
    Array {
        dims: Vec<usize>,
        values: Vec<Option<f64>>,
    },
}

impl DataValue {
    #[must_use]
    pub fn observed(values: &[f64]) -> Self {
        Self::Vector(values.iter().copied().map(Some).collect())
    }

    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Scalar(_) => Vec::new(),
            Self::Vector(values) => vec![values.len()],
            Self::Matrix(matrix) => vec![matrix.nrows(), matrix.ncols()],
            Self::Array { dims, .. } => dims.clone(),
        }
    }
}

/// Named data passed to the sampler, in a stable order.
#[derive(Debug, Clone, Default)]
pub struct DataBindings {
    entries: BTreeMap<String, DataValue>,
}

impl DataBindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: DataValue) {
        self.entries.insert(name.into(), value);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep only the entries whose names satisfy `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|name, _| keep(name));
    }
}

/// Starting values for one chain.
#[derive(Debug, Clone, Default)]
pub struct InitialValues {
    pub values: BTreeMap<String, DataValue>,
    pub rng_name: Option<String>,
    pub rng_seed: Option<u64>,
}

impl InitialValues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_scalar(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), DataValue::Scalar(value));
        self
    }

    #[must_use]
    pub fn with_vector(mut self, name: impl Into<String>, values: &[f64]) -> Self {
        self.values.insert(name.into(), DataValue::observed(values));
        self
    }

    #[must_use]
    pub fn with_matrix(mut self, name: impl Into<String>, values: Mat<f64>) -> Self {
        self.values.insert(name.into(), DataValue::Matrix(values));
        self
    }

    #[must_use]
    pub fn with_rng(mut self, name: impl Into<String>, seed: u64) -> Self {
        self.rng_name = Some(name.into());
        self.rng_seed = Some(seed);
        self
    }
}

/// Everything a sampler needs for one run.
#[derive(Debug, Clone, Copy)]
pub struct SamplerRequest<'a> {
    pub model: &'a str,
    pub data: &'a DataBindings,
    pub inits: &'a [InitialValues],
    pub monitor: &'a [MonitoredNode],
    pub schedule: McmcConfig,
}

impl SamplerRequest<'_> {
    /// Every element name the output must contain.
    #[must_use]
    pub fn expected_elements(&self) -> Vec<String> {
        self.monitor
            .iter()
            .flat_map(MonitoredNode::element_names)
            .collect()
    }
}

/// Draws returned by a sampler.
#[derive(Debug, Clone)]
pub struct SamplerOutput {
    pub draws: PosteriorDraws,
    /// Convergence summaries computed by the sampler, when it provides them.
    pub convergence: Option<BTreeMap<String, ConvergenceSummary>>,
}

impl SamplerOutput {
    /// # Errors
    ///
    /// Returns `SamplerError::MissingElement` for the first monitored element absent
    /// from the draws.
    pub fn ensure_complete(&self, request: &SamplerRequest<'_>) -> Result<(), SamplerError> {
        match request
            .expected_elements()
            .into_iter()
            .find(|name| !self.draws.contains(name))
        {
            Some(name) => Err(SamplerError::MissingElement(name)),
            None => Ok(()),
        }
    }
}

/// An MCMC engine able to run a compiled model.
pub trait Sampler {
    /// Run every chain and return the retained draws of all monitored nodes.
    ///
    /// # Errors
    ///
    /// Returns `SamplerError` when the engine cannot be run or its output is
    /// unusable.
    fn sample(&self, request: &SamplerRequest<'_>) -> Result<SamplerOutput, SamplerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_names_iterate_first_index_fastest() {
        let node = MonitoredNode::matrix("alpha", 2, 2, NodeSupport::Real);
        assert_eq!(
            node.element_names(),
            vec!["alpha[1,1]", "alpha[2,1]", "alpha[1,2]", "alpha[2,2]"]
        );
        let scalar = MonitoredNode::scalar("rho", NodeSupport::Real);
        assert_eq!(scalar.element_names(), vec!["rho"]);
    }

    #[test]
    fn support_checks_match_node_domain() {
        assert!(NodeSupport::UnitInterval.contains(0.3));
        assert!(!NodeSupport::UnitInterval.contains(1.0));
        assert!(NodeSupport::Count.contains(3.0));
        assert!(!NodeSupport::Count.contains(2.5));
        assert!(!NodeSupport::Positive.contains(0.0));
        assert!(!NodeSupport::Real.contains(f64::NAN));
    }

    #[test]
    fn data_values_report_shapes() {
        assert!(DataValue::Scalar(1.0).shape().is_empty());
        assert_eq!(DataValue::observed(&[1.0, 2.0]).shape(), vec![2]);
        let matrix = Mat::from_fn(3, 2, |_, _| 0.0);
        assert_eq!(DataValue::Matrix(matrix).shape(), vec![3, 2]);
    }

    #[test]
    fn output_completeness_names_missing_element() {
        let monitor = vec![MonitoredNode::vector("mu.e", 2, NodeSupport::Real)];
        let data = DataBindings::new();
        let request = SamplerRequest {
            model: "model {}",
            data: &data,
            inits: &[],
            monitor: &monitor,
            schedule: McmcConfig::default(),
        };
        let mut draws = PosteriorDraws::new(1, 1);
        draws.push_element("mu.e[1]", &[vec![0.0]]).unwrap();
        let output = SamplerOutput {
            draws,
            convergence: None,
        };
        let err = output.ensure_complete(&request).unwrap_err();
        assert!(matches!(err, SamplerError::MissingElement(name) if name == "mu.e[2]"));
    }
}
