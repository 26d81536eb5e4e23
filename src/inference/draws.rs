//! Posterior draw arena.
//!
//! Draws are stored once, element by element, chain-major. Every derived quantity is
//! computed per [`DrawIndex`] so joint posterior structure is never broken by
//! summarizing early.

use std::collections::BTreeMap;

use super::InferenceError;

/// Position of one retained draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DrawIndex {
    pub chain: usize,
    pub iteration: usize,
}

/// Retained posterior draws for every monitored element.
#[derive(Debug, Clone)]
pub struct PosteriorDraws {
    chains: usize,
    draws_per_chain: usize,
    names: Vec<String>,
    index: BTreeMap<String, usize>,
    values: Vec<f64>,
}

impl PosteriorDraws {
    #[must_use]
    pub const fn new(chains: usize, draws_per_chain: usize) -> Self {
        Self {
            chains,
            draws_per_chain,
            names: Vec::new(),
            index: BTreeMap::new(),
            values: Vec::new(),
        }
    }

    /// Store one element's draws, one vector per chain.
    ///
    /// # Errors
    ///
    /// Returns `InferenceError` when the chain count or any chain length disagrees
    /// with the arena shape, or the element is already stored.
    pub fn push_element(
        &mut self,
        name: impl Into<String>,
        per_chain: &[Vec<f64>],
    ) -> Result<(), InferenceError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(InferenceError::DuplicateNode(name));
        }
        if per_chain.len() != self.chains {
            return Err(InferenceError::ChainCountMismatch {
                name,
                expected: self.chains,
                found: per_chain.len(),
            });
        }
        for (chain, values) in per_chain.iter().enumerate() {
            if values.len() != self.draws_per_chain {
                return Err(InferenceError::DrawLengthMismatch {
                    name,
                    chain: chain + 1,
                    expected: self.draws_per_chain,
                    found: values.len(),
                });
            }
        }

        self.index.insert(name.clone(), self.names.len());
        self.names.push(name);
        for values in per_chain {
            self.values.extend_from_slice(values);
        }
        Ok(())
    }

    #[must_use]
    pub const fn chain_count(&self) -> usize {
        self.chains
    }

    #[must_use]
    pub const fn draws_per_chain(&self) -> usize {
        self.draws_per_chain
    }

    /// Total retained draws pooled over chains.
    #[must_use]
    pub const fn total_draws(&self) -> usize {
        self.chains * self.draws_per_chain
    }

    /// Element names in insertion order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn contains(&self, element: &str) -> bool {
        self.index.contains_key(element)
    }

    /// Pooled draws of one element, chain-major.
    #[must_use]
    pub fn element(&self, element: &str) -> Option<&[f64]> {
        let position = *self.index.get(element)?;
        let width = self.total_draws();
        Some(&self.values[position * width..(position + 1) * width])
    }

    /// Draws of one element within one chain (0-based).
    #[must_use]
    pub fn chain(&self, element: &str, chain: usize) -> Option<&[f64]> {
        if chain >= self.chains {
            return None;
        }
        let pooled = self.element(element)?;
        Some(&pooled[chain * self.draws_per_chain..(chain + 1) * self.draws_per_chain])
    }

    /// Per-chain slices of one element.
    #[must_use]
    pub fn chains_of(&self, element: &str) -> Option<Vec<&[f64]>> {
        (0..self.chains)
            .map(|chain| self.chain(element, chain))
            .collect()
    }

    #[must_use]
    pub fn value(&self, element: &str, draw: DrawIndex) -> Option<f64> {
        self.chain(element, draw.chain)?.get(draw.iteration).copied()
    }

    /// Flat position of a draw within pooled sequences.
    #[must_use]
    pub const fn flat(&self, draw: DrawIndex) -> usize {
        draw.chain * self.draws_per_chain + draw.iteration
    }

    /// Every draw index, chain-major.
    pub fn draw_indices(&self) -> impl Iterator<Item = DrawIndex> + '_ {
        (0..self.chains).flat_map(move |chain| {
            (0..self.draws_per_chain).map(move |iteration| DrawIndex { chain, iteration })
        })
    }

    /// Element names belonging to node `node` (`node` itself or `node[...]`).
    #[must_use]
    pub fn elements_of(&self, node: &str) -> Vec<&str> {
        self.names
            .iter()
            .filter(|name| {
                name.as_str() == node
                    || name
                        .strip_prefix(node)
                        .is_some_and(|rest| rest.starts_with('['))
            })
            .map(String::as_str)
            .collect()
    }
}

/// Element name for a node at 1-based `indices`, e.g. `alpha[2,1]`.
#[must_use]
pub fn element_name(node: &str, indices: &[usize]) -> String {
    if indices.is_empty() {
        return node.to_string();
    }
    let joined = indices
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{node}[{joined}]")
}
