// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fixed capacities of one instance.

use crate::{BufferKind, StoreError};
use likelihood_kernels::Layout;
use std::mem::size_of;

/// Buffer counts and problem dimensions, fixed at instance creation.
///
/// The first `tip_count` partials indices are tip slots; any of them may be
/// bound to one of the `compact_buffer_count` compact state buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    pub tip_count: usize,
    pub partials_buffer_count: usize,
    pub compact_buffer_count: usize,
    pub state_count: usize,
    pub pattern_count: usize,
    pub eigen_buffer_count: usize,
    pub matrix_buffer_count: usize,
    pub category_count: usize,
}

impl Dimensions {
    /// Dimensions with a single rate category.
    pub fn new(
        tip_count: usize,
        partials_buffer_count: usize,
        compact_buffer_count: usize,
        state_count: usize,
        pattern_count: usize,
        eigen_buffer_count: usize,
        matrix_buffer_count: usize,
    ) -> Self {
        Self {
            tip_count,
            partials_buffer_count,
            compact_buffer_count,
            state_count,
            pattern_count,
            eigen_buffer_count,
            matrix_buffer_count,
            category_count: 1,
        }
    }

    /// Sets the number of rate categories.
    pub fn with_categories(mut self, category_count: usize) -> Self {
        self.category_count = category_count;
        self
    }

    /// The kernel layout these dimensions describe.
    pub fn layout(&self) -> Layout {
        Layout::new(self.state_count, self.pattern_count, self.category_count)
    }

    /// Number of buffers of `kind`.
    pub fn count(&self, kind: BufferKind) -> usize {
        match kind {
            BufferKind::Partials => self.partials_buffer_count,
            BufferKind::Tip => self.tip_count,
            BufferKind::Compact => self.compact_buffer_count,
            BufferKind::Eigen => self.eigen_buffer_count,
            BufferKind::Matrix => self.matrix_buffer_count,
        }
    }

    /// Converts a signed caller index into a buffer index of `kind`.
    ///
    /// # Errors
    /// [`StoreError::InvalidIndex`] unless `0 <= index < count(kind)`;
    /// negative indices included.
    pub fn resolve(&self, kind: BufferKind, index: i64) -> Result<usize, StoreError> {
        let count = self.count(kind);
        usize::try_from(index)
            .ok()
            .filter(|&i| i < count)
            .ok_or(StoreError::InvalidIndex { kind, index, count })
    }

    /// Rejects dimensions no instance can be built from.
    pub fn validate(&self) -> Result<(), StoreError> {
        let fail = |msg: String| Err(StoreError::InvalidDimensions(msg));
        if self.state_count < 2 {
            return fail(format!("state_count must be at least 2, got {}", self.state_count));
        }
        if self.pattern_count == 0 {
            return fail("pattern_count must be at least 1".into());
        }
        if self.category_count == 0 {
            return fail("category_count must be at least 1".into());
        }
        if self.partials_buffer_count == 0 {
            return fail("partials_buffer_count must be at least 1".into());
        }
        if self.tip_count > self.partials_buffer_count {
            return fail(format!(
                "tip_count {} exceeds partials_buffer_count {}",
                self.tip_count, self.partials_buffer_count
            ));
        }
        if self.compact_buffer_count > self.tip_count {
            return fail(format!(
                "compact_buffer_count {} exceeds tip_count {}",
                self.compact_buffer_count, self.tip_count
            ));
        }
        Ok(())
    }

    /// Bytes needed for every buffer at these dimensions, or `None` on
    /// overflow.
    pub fn footprint_bytes(&self) -> Option<usize> {
        let f = size_of::<f64>();
        let s = self.state_count;
        let p = self.pattern_count;
        let c = self.category_count;

        let partials_len = s.checked_mul(p)?.checked_mul(c)?;
        // Each partials buffer carries one log-scale factor per pattern.
        let partials = self.partials_buffer_count.checked_mul(partials_len.checked_add(p)?)?;
        let compact = self
            .compact_buffer_count
            .checked_mul(p)?
            .checked_mul(size_of::<u32>())?;
        let eigen = self
            .eigen_buffer_count
            .checked_mul(s.checked_mul(s)?.checked_mul(2)?.checked_add(s)?)?;
        let matrices = self.matrix_buffer_count.checked_mul(s.checked_mul(s)?.checked_mul(c)?)?;
        let model = c.checked_mul(2)?.checked_add(p)?;

        partials
            .checked_add(eigen)?
            .checked_add(matrices)?
            .checked_add(model)?
            .checked_mul(f)?
            .checked_add(compact)
    }
}
