// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Buffer layout descriptors.
//!
//! Every partials buffer is a flat, category-major array:
//!
//! ```text
//! offset(c, p, s) = (c * patterns + p) * states + s
//! ```
//!
//! so one `(category, pattern)` site occupies `states` contiguous values.
//! Transition matrices are stored one `states × states` block per category,
//! rows indexed by the ancestral state:
//!
//! ```text
//! offset(c, i, j) = (c * states + i) * states + j
//! ```

use crate::KernelError;
use std::fmt;

/// The dimensions shared by every buffer of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Layout {
    states: usize,
    patterns: usize,
    categories: usize,
}

impl Layout {
    /// Creates a layout.
    ///
    /// # Examples
    /// ```
    /// use likelihood_kernels::Layout;
    /// let l = Layout::new(4, 10, 2);
    /// assert_eq!(l.partials_len(), 80);
    /// assert_eq!(l.matrix_len(), 32);
    /// ```
    pub fn new(states: usize, patterns: usize, categories: usize) -> Self {
        Self {
            states,
            patterns,
            categories,
        }
    }

    /// Number of Markov chain states.
    pub fn states(&self) -> usize {
        self.states
    }

    /// Number of site patterns.
    pub fn patterns(&self) -> usize {
        self.patterns
    }

    /// Number of rate categories.
    pub fn categories(&self) -> usize {
        self.categories
    }

    /// Number of `(category, pattern)` sites.
    pub fn sites(&self) -> usize {
        self.categories * self.patterns
    }

    /// Length of one partials buffer.
    pub fn partials_len(&self) -> usize {
        self.sites() * self.states
    }

    /// Length of one category's slice of a partials buffer.
    pub fn category_partials_len(&self) -> usize {
        self.patterns * self.states
    }

    /// Length of one `states × states` block.
    pub fn square_len(&self) -> usize {
        self.states * self.states
    }

    /// Length of one transition-matrix buffer (all categories).
    pub fn matrix_len(&self) -> usize {
        self.categories * self.square_len()
    }

    /// Offset of the first state of site `(c, p)` in a partials buffer.
    #[inline]
    pub fn site_offset(&self, category: usize, pattern: usize) -> usize {
        (category * self.patterns + pattern) * self.states
    }

    /// Offset of row `i` of category `c` in a matrix buffer.
    #[inline]
    pub fn row_offset(&self, category: usize, row: usize) -> usize {
        (category * self.states + row) * self.states
    }

    /// Splits a site index (as produced by chunking a partials buffer by
    /// `states`) into `(category, pattern)`.
    #[inline]
    pub fn site(&self, index: usize) -> (usize, usize) {
        (index / self.patterns, index % self.patterns)
    }

    pub(crate) fn check_partials(&self, what: &'static str, data: &[f64]) -> Result<(), KernelError> {
        KernelError::check(what, self.partials_len(), data.len())
    }

    pub(crate) fn check_matrix(&self, what: &'static str, data: &[f64]) -> Result<(), KernelError> {
        KernelError::check(what, self.matrix_len(), data.len())
    }

    pub(crate) fn check_patterns(&self, what: &'static str, len: usize) -> Result<(), KernelError> {
        KernelError::check(what, self.patterns, len)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} states × {} patterns × {} categories",
            self.states, self.patterns, self.categories
        )
    }
}
