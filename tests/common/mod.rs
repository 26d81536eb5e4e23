#![allow(dead_code)]

use std::cell::Cell;

use missing_ce::{
    DataValue, MonitoredNode, NodeSupport, PosteriorDraws, Sampler, SamplerError, SamplerOutput,
    SamplerRequest, TrialData,
};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

/// Deterministic stand-in for an MCMC engine.
///
/// Every monitored element gets seeded draws inside its support. Vector nodes
/// that shadow a bound data vector repeat the observed entries, so imputation
/// arrays behave like sampler output.
pub struct StubSampler {
    pub calls: Cell<usize>,
}

impl StubSampler {
    pub fn new() -> Self {
        Self {
            calls: Cell::new(0),
        }
    }
}

fn draw(rng: &mut StdRng, name: &str, support: NodeSupport) -> f64 {
    let u = rng.random::<f64>();
    if name.starts_with("loglik") {
        return -0.5 - u;
    }
    match support {
        NodeSupport::Real => 0.4 * (u - 0.5) + 0.1,
        NodeSupport::Positive => 0.5 + u,
        NodeSupport::NonNegative => u,
        NodeSupport::UnitInterval | NodeSupport::Simplex => 0.1 + 0.8 * u,
        NodeSupport::Binary => f64::from(u8::from(u < 0.5)),
        NodeSupport::Count => (3.0 * u).floor(),
    }
}

fn node_draws(
    node: &MonitoredNode,
    request: &SamplerRequest<'_>,
    rng: &mut StdRng,
) -> Vec<(String, Vec<Vec<f64>>)> {
    let chains = request.schedule.chains;
    let per_chain = request.schedule.retained_draws();
    let names = node.element_names();
    let observed = match request.data.get(&node.name) {
        Some(DataValue::Vector(values)) => Some(values.clone()),
        _ => None,
    };

    let mut columns = names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let fixed = observed.as_ref().and_then(|values| values[index]);
            let series = (0..chains)
                .map(|_| {
                    (0..per_chain)
                        .map(|_| fixed.unwrap_or_else(|| draw(rng, name, node.support)))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>();
            (name.clone(), series)
        })
        .collect::<Vec<_>>();

    if node.support == NodeSupport::Simplex && node.dims.len() == 2 {
        let rows = node.dims[0];
        for col in 0..node.dims[1] {
            for chain in 0..chains {
                for step in 0..per_chain {
                    let block = &mut columns[col * rows..(col + 1) * rows];
                    let total = block
                        .iter()
                        .map(|(_, series)| series[chain][step])
                        .sum::<f64>();
                    for (_, series) in block.iter_mut() {
                        series[chain][step] /= total;
                    }
                }
            }
        }
    }
    columns
}

impl Sampler for StubSampler {
    fn sample(&self, request: &SamplerRequest<'_>) -> Result<SamplerOutput, SamplerError> {
        self.calls.set(self.calls.get() + 1);
        let mut rng = StdRng::seed_from_u64(request.schedule.seed);
        let mut draws =
            PosteriorDraws::new(request.schedule.chains, request.schedule.retained_draws());
        for node in request.monitor {
            for (name, series) in node_draws(node, request, &mut rng) {
                draws.push_element(name, &series)?;
            }
        }
        Ok(SamplerOutput {
            draws,
            convergence: None,
        })
    }
}

/// Sampler that always fails, for error propagation.
pub struct FailingSampler;

impl Sampler for FailingSampler {
    fn sample(&self, _request: &SamplerRequest<'_>) -> Result<SamplerOutput, SamplerError> {
        Err(SamplerError::Failed {
            status: "exit status: 1".to_string(),
            output: "RUNTIME ERROR: node inconsistent with parents".to_string(),
        })
    }
}

/// 159 records in arms of 75 and 84 with roughly a third of each outcome missing.
pub fn trial_159() -> TrialData {
    let mut rng = StdRng::seed_from_u64(2024);
    let n = 159;
    let arm = (0..n).map(|i| if i < 75 { 1.0 } else { 2.0 }).collect::<Vec<_>>();
    let age = (0..n)
        .map(|_| 40.0 + 30.0 * rng.random::<f64>())
        .collect::<Vec<_>>();
    let mut effects = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);
    for i in 0..n {
        let shift = if i < 75 { 0.0 } else { 0.05 };
        let e = 0.7 + shift + 0.1 * (rng.random::<f64>() - 0.5);
        let c = 800.0 + 200.0 * rng.random::<f64>() + if i < 75 { 0.0 } else { 150.0 };
        effects.push((i % 3 != 0).then_some(e));
        costs.push((i % 5 != 1 && i % 7 != 2).then_some(c));
    }
    TrialData::new()
        .with_observed("t", &arm)
        .with_observed("age", &age)
        .with_numeric("e", effects)
        .with_numeric("c", costs)
}
