//! # Models
//!
//! Bayesian cost-effectiveness models for trial data with missing outcomes:
//! selection, pattern-mixture, and hurdle families. Each fit compiles JAGS model
//! text, binds the data, runs a [`crate::inference::Sampler`], and post-processes
//! the draws into mean outcomes, imputations, and an economic evaluation.

pub mod binder;
pub mod compiler;
pub mod diagnostics;
pub mod fit;
pub mod posterior;
pub mod priors;
pub mod registry;
pub mod report;
pub mod types;
