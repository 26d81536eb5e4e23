//! Sampler boundary, MCMC schedule, and posterior draw storage.
//!
//! The crate never runs MCMC numerics itself. A [`Sampler`] receives the compiled
//! model text, bound data, and per-chain initial values, and hands back a
//! [`PosteriorDraws`] arena keyed by monitored element name.

pub mod convergence;
pub mod draws;
pub mod jags;
pub mod sampler;

pub use convergence::{
    ConvergenceReport, ConvergenceSummary, RHAT_WARNING_THRESHOLD, autocorrelation,
    effective_sample_size, split_rhat,
};
pub use draws::{DrawIndex, PosteriorDraws};
pub use jags::JagsSampler;
pub use sampler::{
    DataBindings, DataValue, InitialValues, MonitoredNode, NodeSupport, Sampler, SamplerError,
    SamplerOutput, SamplerRequest,
};

use thiserror::Error;

/// Errors for MCMC schedules and draw storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("iterations must be positive")]
    InvalidIterations,
    #[error("burn-in ({burn_in}) must be smaller than iterations ({iterations})")]
    InvalidBurnIn { burn_in: usize, iterations: usize },
    #[error("thinning interval must be positive")]
    InvalidThinning,
    #[error("at least {min} chains are required; found {found}")]
    InvalidChainCount { min: usize, found: usize },
    #[error("node `{name}` has {found} draws in chain {chain}; expected {expected}")]
    DrawLengthMismatch {
        name: String,
        chain: usize,
        expected: usize,
        found: usize,
    },
    #[error("node `{name}` was supplied for {found} chains; expected {expected}")]
    ChainCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("node `{0}` is already stored")]
    DuplicateNode(String),
}

/// MCMC schedule shared by every sampler backend.
///
/// `iterations` counts every iteration per chain, burn-in included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct McmcConfig {
    pub iterations: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub chains: usize,
    pub seed: u64,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            iterations: 2_000,
            burn_in: 1_000,
            thin: 1,
            chains: 2,
            seed: 42,
        }
    }
}

impl McmcConfig {
    pub const MIN_CHAINS: usize = 2;

    /// # Errors
    ///
    /// Returns `InferenceError` if schedule values are invalid.
    pub const fn validate(self) -> Result<(), InferenceError> {
        if self.iterations == 0 {
            return Err(InferenceError::InvalidIterations);
        }
        if self.burn_in >= self.iterations {
            return Err(InferenceError::InvalidBurnIn {
                burn_in: self.burn_in,
                iterations: self.iterations,
            });
        }
        if self.thin == 0 {
            return Err(InferenceError::InvalidThinning);
        }
        if self.chains < Self::MIN_CHAINS {
            return Err(InferenceError::InvalidChainCount {
                min: Self::MIN_CHAINS,
                found: self.chains,
            });
        }
        Ok(())
    }

    /// Number of retained draws per chain implied by this configuration.
    ///
    /// The first post-burn-in iteration is always recorded, then every `thin`-th
    /// one after it, so a partial final stride still yields a draw.
    #[must_use]
    pub const fn retained_draws(self) -> usize {
        self.sampling_iterations().div_ceil(self.thin)
    }

    /// Iterations run after burn-in, before thinning.
    #[must_use]
    pub const fn sampling_iterations(self) -> usize {
        self.iterations - self.burn_in
    }

    /// Seed for one chain's initial values and sampler stream.
    #[must_use]
    pub fn chain_seed(self, chain: usize) -> u64 {
        let stride = u64::try_from(chain).unwrap_or(u64::MAX).wrapping_mul(1_000);
        self.seed.wrapping_add(stride)
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_burn_in(mut self, burn_in: usize) -> Self {
        self.burn_in = burn_in;
        self
    }

    #[must_use]
    pub const fn with_thin(mut self, thin: usize) -> Self {
        self.thin = thin;
        self
    }

    #[must_use]
    pub const fn with_chains(mut self, chains: usize) -> Self {
        self.chains = chains;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
