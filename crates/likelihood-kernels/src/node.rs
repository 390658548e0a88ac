// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Read-only views of a node's conditional likelihoods.

use crate::{KernelError, Layout};

/// What a kernel reads for one node: either a dense partials buffer or a
/// compact tip state buffer.
///
/// Compact states expand on the fly. A definite state `k < states` is a
/// one-hot vector; the sentinel `states` is the all-ones vector ("no
/// information").
#[derive(Debug, Clone, Copy)]
pub enum NodeData<'a> {
    /// Dense `states × patterns × categories` values.
    Partials(&'a [f64]),
    /// One state per pattern, shared by all categories.
    States(&'a [u32]),
}

impl<'a> NodeData<'a> {
    pub(crate) fn check(&self, what: &'static str, layout: &Layout) -> Result<(), KernelError> {
        match self {
            Self::Partials(p) => layout.check_partials(what, p),
            Self::States(s) => layout.check_patterns(what, s.len()),
        }
    }

    /// Transition-weighted sum `Σ_j row[j] · x[c, p, j]` over the
    /// node's states for one ancestral row.
    #[inline]
    pub fn weighted_sum(&self, layout: &Layout, row: &[f64], category: usize, pattern: usize) -> f64 {
        match self {
            Self::Partials(p) => {
                let off = layout.site_offset(category, pattern);
                row.iter()
                    .zip(&p[off..off + layout.states()])
                    .map(|(m, x)| m * x)
                    .sum()
            }
            Self::States(s) => {
                let state = s[pattern] as usize;
                if state < layout.states() {
                    row[state]
                } else {
                    row.iter().sum()
                }
            }
        }
    }

    /// `x[c, p, s]`.
    #[inline]
    pub fn value(&self, layout: &Layout, category: usize, pattern: usize, state: usize) -> f64 {
        match self {
            Self::Partials(p) => p[layout.site_offset(category, pattern) + state],
            Self::States(s) => {
                let observed = s[pattern] as usize;
                if observed >= layout.states() || observed == state {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}
